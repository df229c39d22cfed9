//! Registry actor - owns all device state and processes commands.
//!
//! The actor is the single owner of the connection-key → record map. It
//! receives commands over an mpsc channel and processes them sequentially
//! in one task: that sequencing is the linearization point for every
//! registry operation, so no reader ever observes a record mid-update and
//! no lock is shared with the rest of the daemon.
//!
//! The actor performs no I/O. Worker teardown always happens on the caller
//! side, with the handle the actor gives back.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use camfleet_core::DeviceView;

use super::commands::{DeviceRecord, RegistryCommand};
use crate::supervisor::WorkerHandle;

/// The registry actor - owns all device records.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    devices: HashMap<SocketAddr, Box<DeviceRecord>>,
}

impl RegistryActor {
    pub(super) fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            devices: HashMap::new(),
        }
    }

    /// Runs the actor loop until every handle is dropped.
    pub async fn run(mut self) {
        info!("Device registry starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(devices = self.devices.len(), "Device registry stopped");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        // Responses ignore send errors: the caller may have dropped the
        // receiver (e.g. a session torn down mid-request).
        match cmd {
            RegistryCommand::Add {
                key,
                record,
                respond_to,
            } => {
                let displaced = self.handle_add(key, record);
                let _ = respond_to.send(displaced);
            }
            RegistryCommand::UpdateHeartbeat { key, respond_to } => {
                let _ = respond_to.send(self.handle_update_heartbeat(key));
            }
            RegistryCommand::Get { key, respond_to } => {
                let now = Instant::now();
                let view = self.devices.get(&key).map(|record| record.view(key, now));
                let _ = respond_to.send(view);
            }
            RegistryCommand::Remove { key, respond_to } => {
                let record = self.devices.remove(&key);
                if let Some(record) = &record {
                    info!(
                        peer = %key,
                        mac = %record.mac,
                        remaining = self.devices.len(),
                        "Device removed"
                    );
                }
                let _ = respond_to.send(record);
            }
            RegistryCommand::ListStale {
                timeout,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_list_stale(timeout));
            }
            RegistryCommand::Snapshot { respond_to } => {
                let now = Instant::now();
                let views: Vec<DeviceView> = self
                    .devices
                    .iter()
                    .map(|(key, record)| record.view(*key, now))
                    .collect();
                let _ = respond_to.send(views);
            }
            RegistryCommand::Drain { respond_to } => {
                let drained: Vec<_> = self.devices.drain().collect();
                if !drained.is_empty() {
                    info!(devices = drained.len(), "Registry drained");
                }
                let _ = respond_to.send(drained);
            }
        }
    }

    fn handle_add(
        &mut self,
        key: SocketAddr,
        record: Box<DeviceRecord>,
    ) -> Option<WorkerHandle> {
        info!(
            peer = %key,
            mac = %record.mac,
            stream = %record.endpoint.rtsp_url(),
            total_devices = self.devices.len() + usize::from(!self.devices.contains_key(&key)),
            "Device registered"
        );

        let displaced = self.devices.insert(key, record);
        displaced.map(|old| {
            // Sessions stop-then-add, so this path means an invariant slip
            // somewhere; hand the worker back so it still gets stopped.
            warn!(peer = %key, mac = %old.mac, "Add displaced a live record");
            old.worker
        })
    }

    fn handle_update_heartbeat(&mut self, key: SocketAddr) -> bool {
        match self.devices.get_mut(&key) {
            Some(record) => {
                record.last_heartbeat = Instant::now();
                debug!(peer = %key, mac = %record.mac, "Heartbeat");
                true
            }
            None => false,
        }
    }

    fn handle_list_stale(&self, timeout: Duration) -> Vec<SocketAddr> {
        let now = Instant::now();
        self.devices
            .iter()
            .filter(|(_, record)| {
                now.saturating_duration_since(record.last_heartbeat) > timeout
            })
            .map(|(key, _)| *key)
            .collect()
    }
}
