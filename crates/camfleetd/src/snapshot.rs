//! Periodic frame snapshots, written off the frame-delivery path.
//!
//! The frame callback runs inside each worker's pump task and must stay
//! cheap: it samples every Nth frame (the pump's per-worker sequence number
//! makes the check stateless) and enqueues a write job into an
//! [`AsyncSink`]. The single consumer creates `<root>/<device_ip>/` and
//! writes `<sequence>.jpg`. A full queue drops the frame and says so: a
//! lost snapshot beats a stalled stream.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use camfleet_core::SnapshotConfig;

use crate::frames::{FrameCallback, FrameMeta};
use crate::sink::{AsyncSink, SinkError};

struct SnapshotJob {
    path: PathBuf,
    frame: Bytes,
}

/// Writes sampled frames to disk through a bounded queue.
pub struct SnapshotWriter {
    sink: AsyncSink<SnapshotJob>,
    root: PathBuf,
    every_n: u64,
    dropped: AtomicU64,
}

impl SnapshotWriter {
    /// Creates the writer and starts its consumer. Must be called from
    /// within a tokio runtime.
    pub fn spawn(config: &SnapshotConfig) -> Arc<Self> {
        let sink = AsyncSink::spawn(config.queue_capacity, write_snapshot);

        Arc::new(Self {
            sink,
            root: config.directory.clone(),
            every_n: config.every_n_frames.max(1),
            dropped: AtomicU64::new(0),
        })
    }

    /// The frame callback to hand to the worker supervisor.
    pub fn callback(self: &Arc<Self>) -> FrameCallback {
        let writer = Arc::clone(self);
        Arc::new(move |frame, meta| writer.on_frame(frame, meta))
    }

    /// Frames dropped because the write queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stops intake and waits for every accepted job to hit disk.
    pub async fn close(&self) {
        self.sink.close().await;

        let dropped = self.dropped();
        if dropped > 0 {
            info!(dropped, "Snapshot writer closed with dropped frames");
        }
    }

    fn on_frame(&self, frame: Bytes, meta: FrameMeta) {
        if meta.sequence % self.every_n != 0 {
            return;
        }

        let path = self
            .root
            .join(&meta.device_ip)
            .join(format!("{}.jpg", meta.sequence));

        match self.sink.submit(SnapshotJob { path, frame }) {
            Ok(()) => {}
            Err(SinkError::Full) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    device_ip = %meta.device_ip,
                    sequence = meta.sequence,
                    dropped_total = total,
                    "Snapshot queue full, frame dropped"
                );
            }
            Err(SinkError::Closed) => {
                // late frames during shutdown; nothing to do
                debug!(device_ip = %meta.device_ip, "Snapshot sink closed, frame ignored");
            }
        }
    }
}

async fn write_snapshot(job: SnapshotJob) {
    if let Some(parent) = job.path.parent() {
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %job.path.display(), error = %err, "Failed to create snapshot directory");
            return;
        }
    }

    match tokio::fs::write(&job.path, &job.frame).await {
        Ok(()) => trace!(path = %job.path.display(), bytes = job.frame.len(), "Snapshot written"),
        Err(err) => warn!(path = %job.path.display(), error = %err, "Failed to write snapshot"),
    }
}
