//! Bounded queue + single consumer for offloading slow side effects.
//!
//! The pattern: a hot path (a frame callback, a broadcast loop) must not
//! block on disk or other slow work, so it enqueues items into a bounded
//! channel drained by exactly one consumer task. Overflow and shutdown are
//! explicit: `submit` reports `Full`/`Closed` rather than silently losing
//! data, and `close` drains everything already accepted before returning.
//!
//! The consumer is started once, at construction. There is deliberately no
//! lazy start-on-first-submit: a check-then-act flag races under concurrent
//! first calls and can start two consumers.

use std::future::Future;
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Errors from [`AsyncSink::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The queue is at capacity; the item was not accepted.
    #[error("sink queue is full")]
    Full,

    /// The sink has been closed; no further items are accepted.
    #[error("sink is closed")]
    Closed,
}

/// Bounded producer/consumer queue with a single consumer task.
pub struct AsyncSink<T> {
    /// `None` once closed; taking the sender is what stops intake.
    tx: Mutex<Option<mpsc::Sender<T>>>,

    /// Consumer join handle, consumed by `close`.
    consumer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> AsyncSink<T> {
    /// Creates the sink and starts its consumer task.
    ///
    /// `handler` runs once per item, in submission order. Must be called
    /// from within a tokio runtime.
    pub fn spawn<F, Fut>(capacity: usize, mut handler: F) -> Self
    where
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));

        let consumer = tokio::spawn(async move {
            // recv() yields queued items even after all senders drop, so a
            // close drains naturally before this loop ends.
            while let Some(item) = rx.recv().await {
                handler(item).await;
            }
        });

        Self {
            tx: Mutex::new(Some(tx)),
            consumer: tokio::sync::Mutex::new(Some(consumer)),
        }
    }

    /// Non-blocking enqueue.
    pub fn submit(&self, item: T) -> Result<(), SinkError> {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match guard.as_ref() {
            None => Err(SinkError::Closed),
            Some(tx) => tx.try_send(item).map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SinkError::Full,
                mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
            }),
        }
    }

    /// Whether the sink still accepts items.
    pub fn is_open(&self) -> bool {
        match self.tx.lock() {
            Ok(guard) => guard.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Stops intake, waits for the queue to drain, and joins the consumer.
    ///
    /// Idempotent; `submit` after `close` returns [`SinkError::Closed`].
    pub async fn close(&self) {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(tx);

        if let Some(handle) = self.consumer.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "sink consumer task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_all_submissions_consumed_before_close_returns() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let sink = AsyncSink::spawn(16, move |_: u32| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        for i in 0..10u32 {
            sink.submit(i).expect("submit");
        }
        sink.close().await;

        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_submit_after_close_fails_cleanly() {
        let sink = AsyncSink::spawn(4, |_: u32| async {});
        assert!(sink.is_open());

        sink.close().await;

        assert!(!sink.is_open());
        assert_eq!(sink.submit(1), Err(SinkError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let sink = AsyncSink::spawn(4, |_: u32| async {});
        sink.close().await;
        sink.close().await;
        assert_eq!(sink.submit(1), Err(SinkError::Closed));
    }

    #[tokio::test]
    async fn test_full_queue_is_explicit() {
        // current-thread runtime: the consumer cannot run between submits,
        // so capacity 2 means the third submit must report Full
        let sink = AsyncSink::spawn(2, |_: u32| async {});

        assert_eq!(sink.submit(1), Ok(()));
        assert_eq!(sink.submit(2), Ok(()));
        assert_eq!(sink.submit(3), Err(SinkError::Full));

        sink.close().await;
    }

    #[tokio::test]
    async fn test_items_consumed_in_submission_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let sunk = Arc::clone(&order);
        let sink = AsyncSink::spawn(8, move |n: u32| {
            let sunk = Arc::clone(&sunk);
            async move {
                match sunk.lock() {
                    Ok(mut v) => v.push(n),
                    Err(p) => p.into_inner().push(n),
                }
            }
        });

        for n in [3u32, 1, 4, 1, 5] {
            sink.submit(n).expect("submit");
        }
        sink.close().await;

        let seen = match order.lock() {
            Ok(v) => v.clone(),
            Err(p) => p.into_inner().clone(),
        };
        assert_eq!(seen, vec![3, 1, 4, 1, 5]);
    }
}
