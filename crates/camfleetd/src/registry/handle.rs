//! Client interface for the registry actor.
//!
//! `RegistryHandle` is cheap to clone and shared by every session, the
//! sweeper, the reporter, and the server. All methods communicate with the
//! actor over channels; read-style methods degrade to empty results if the
//! actor is gone (shutdown), while mutating methods surface
//! `RegistryError::ChannelClosed` so callers can wind down.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use camfleet_core::DeviceView;

use super::commands::{DeviceRecord, RegistryCommand, RegistryError};
use crate::supervisor::WorkerHandle;

/// Handle for interacting with the registry actor.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub(super) fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Inserts (or replaces) the record for a connection key.
    ///
    /// Returns the displaced worker handle if a record was still present;
    /// the caller must stop it. Callers following the stop-then-start
    /// contract will always get `None` back.
    pub async fn add(
        &self,
        key: SocketAddr,
        record: DeviceRecord,
    ) -> Result<Option<WorkerHandle>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Add {
                key,
                record: Box::new(record),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Refreshes a device's heartbeat. `Ok(false)` means the key is unknown
    /// (the caller logs and carries on).
    pub async fn update_heartbeat(&self, key: SocketAddr) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::UpdateHeartbeat {
                key,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Snapshot read of one record. `None` if unknown or if the actor is
    /// gone.
    pub async fn get(&self, key: SocketAddr) -> Option<DeviceView> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Get {
                key,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Atomically detaches and returns the record for a key. The caller
    /// owns the record's worker from here and must stop it.
    pub async fn remove(&self, key: SocketAddr) -> Result<Option<DeviceRecord>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Remove {
                key,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        let record = rx.await.map_err(|_| RegistryError::ChannelClosed)?;
        Ok(record.map(|boxed| *boxed))
    }

    /// Keys whose last heartbeat is older than `timeout`. Empty if the
    /// actor is gone.
    pub async fn list_stale(&self, timeout: Duration) -> Vec<SocketAddr> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ListStale {
                timeout,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Point-in-time copy of every record. Empty if the actor is gone.
    pub async fn snapshot(&self) -> Vec<DeviceView> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Detaches every record (shutdown path). The caller owns all returned
    /// workers. Empty if the actor is gone.
    pub async fn drain(&self) -> Vec<(SocketAddr, DeviceRecord)> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Drain { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await
            .unwrap_or_default()
            .into_iter()
            .map(|(key, boxed)| (key, *boxed))
            .collect()
    }

    /// Whether the actor is still running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_handle() -> RegistryHandle {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        RegistryHandle::new(tx)
    }

    fn key() -> SocketAddr {
        "10.0.0.1:40000".parse().expect("socket addr")
    }

    #[tokio::test]
    async fn test_mutations_error_when_actor_gone() {
        let handle = closed_handle();

        assert!(matches!(
            handle.update_heartbeat(key()).await,
            Err(RegistryError::ChannelClosed)
        ));
        assert!(matches!(
            handle.remove(key()).await,
            Err(RegistryError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_reads_degrade_when_actor_gone() {
        let handle = closed_handle();

        assert!(handle.get(key()).await.is_none());
        assert!(handle.snapshot().await.is_empty());
        assert!(handle.list_stale(Duration::from_secs(1)).await.is_empty());
        assert!(handle.drain().await.is_empty());
        assert!(!handle.is_connected());
    }
}
