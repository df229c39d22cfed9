//! Registry commands, records, and errors.
//!
//! This module defines the message types for communicating with the
//! `RegistryActor`: the command enum (each carrying a oneshot response
//! channel), the record type the actor owns, and the error type handles
//! surface when the actor is gone.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use camfleet_core::{CameraMac, DeviceView, StreamEndpoint};

use crate::supervisor::WorkerHandle;

/// One registered camera. Owned exclusively by the registry actor; the only
/// way a record leaves the actor is `Remove`/`Drain`, which transfer the
/// worker handle to the caller for teardown.
#[derive(Debug)]
pub struct DeviceRecord {
    /// Device-reported MAC; immutable after registration.
    pub mac: CameraMac,

    /// Stream endpoint; a re-registration installs a whole new record.
    pub endpoint: StreamEndpoint,

    /// Wall-clock registration time, for reporting.
    pub registered_at: DateTime<Utc>,

    /// Monotonic timestamp of the last accepted heartbeat or registration.
    pub last_heartbeat: Instant,

    /// The device's live worker.
    pub worker: WorkerHandle,
}

impl DeviceRecord {
    /// A fresh record; `last_heartbeat` starts now, so registration itself
    /// counts as a heartbeat.
    pub fn new(mac: CameraMac, endpoint: StreamEndpoint, worker: WorkerHandle) -> Self {
        Self {
            mac,
            endpoint,
            registered_at: Utc::now(),
            last_heartbeat: Instant::now(),
            worker,
        }
    }

    /// Snapshot copy for enumeration; never exposes the worker handle.
    pub(super) fn view(&self, peer: SocketAddr, now: Instant) -> DeviceView {
        DeviceView {
            peer,
            mac: self.mac.clone(),
            endpoint: self.endpoint.clone(),
            registered_at: self.registered_at,
            heartbeat_age: now.saturating_duration_since(self.last_heartbeat),
            worker_pid: self.worker.pid(),
        }
    }
}

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for its response; the actor
/// processes commands strictly in order, which is what makes registry
/// operations linearizable.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert (or replace) the record for a connection key.
    ///
    /// Callers stop-then-add, so a displaced record is unexpected, but if
    /// one exists its worker handle is returned rather than dropped, so the
    /// caller can stop it and no process is ever orphaned.
    Add {
        key: SocketAddr,
        record: Box<DeviceRecord>,
        respond_to: oneshot::Sender<Option<WorkerHandle>>,
    },

    /// Refresh `last_heartbeat`; responds with whether the key was known.
    UpdateHeartbeat {
        key: SocketAddr,
        respond_to: oneshot::Sender<bool>,
    },

    /// Snapshot read of one record.
    Get {
        key: SocketAddr,
        respond_to: oneshot::Sender<Option<DeviceView>>,
    },

    /// Atomically detach and return a record. The caller stops the worker
    /// outside the actor so command processing never blocks on teardown.
    Remove {
        key: SocketAddr,
        respond_to: oneshot::Sender<Option<Box<DeviceRecord>>>,
    },

    /// Keys whose last heartbeat is older than `timeout`. Read-only.
    ListStale {
        timeout: Duration,
        respond_to: oneshot::Sender<Vec<SocketAddr>>,
    },

    /// Point-in-time copy of every record.
    Snapshot {
        respond_to: oneshot::Sender<Vec<DeviceView>>,
    },

    /// Detach every record (shutdown path).
    Drain {
        respond_to: oneshot::Sender<Vec<(SocketAddr, Box<DeviceRecord>)>>,
    },
}

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The actor has shut down and its command channel is closed.
    #[error("registry channel closed")]
    ChannelClosed,
}
