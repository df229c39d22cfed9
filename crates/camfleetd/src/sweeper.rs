//! Heartbeat expiry sweep.
//!
//! A device that stops heartbeating never says goodbye; the sweeper is what
//! notices. Every tick it asks the registry for stale keys, detaches each
//! record, and stops its worker. Detach-then-stop keeps worker teardown
//! (which can take up to the stop timeout) out of the registry actor.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use camfleet_core::HeartbeatConfig;

use crate::registry::RegistryHandle;
use crate::supervisor::WorkerSupervisor;

/// Spawns the sweep task. Uses cooperative shutdown via CancellationToken;
/// cancellation interrupts the wait between sweeps immediately.
pub fn spawn_sweeper_task(
    registry: RegistryHandle,
    supervisor: Arc<WorkerSupervisor>,
    config: HeartbeatConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(config.sweep_interval());
        let timeout = config.timeout();

        info!(
            timeout_secs = config.timeout_secs,
            interval_secs = config.sweep_interval_secs,
            "Heartbeat sweeper started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Heartbeat sweeper shutting down");
                    break;
                }

                _ = tick.tick() => {
                    sweep_once(&registry, &supervisor, timeout).await;
                }
            }
        }
    })
}

/// One pass over the registry: evict everything stale.
pub async fn sweep_once(
    registry: &RegistryHandle,
    supervisor: &WorkerSupervisor,
    timeout: Duration,
) {
    let stale = registry.list_stale(timeout).await;
    if stale.is_empty() {
        return;
    }

    debug!(count = stale.len(), "Sweep found stale devices");

    for key in stale {
        match registry.remove(key).await {
            Ok(Some(record)) => {
                warn!(
                    peer = %key,
                    mac = %record.mac,
                    timeout_secs = timeout.as_secs(),
                    "Device heartbeat timed out, evicting"
                );
                supervisor.stop(record.worker).await;
            }
            // The owning session disconnected between list and remove.
            Ok(None) => {}
            // Registry gone: shutdown is already underway.
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{spawn_registry, DeviceRecord};
    use camfleet_core::{CameraMac, StreamEndpoint, WorkerConfig};
    use std::net::SocketAddr;

    fn test_supervisor() -> WorkerSupervisor {
        WorkerSupervisor::new(
            WorkerConfig {
                program: "sleep".to_string(),
                args: vec!["30".to_string()],
                stop_timeout_secs: 1,
            },
            None,
        )
    }

    fn pid_exists(pid: u32) -> bool {
        std::path::Path::new(&format!("/proc/{pid}")).exists()
    }

    #[tokio::test]
    async fn test_sweep_evicts_silent_device_and_stops_worker() {
        let supervisor = test_supervisor();
        let registry = spawn_registry();
        let key: SocketAddr = "10.1.1.1:50100".parse().expect("addr");

        let mac = CameraMac::new("AA:BB:CC:DD:EE:01");
        let endpoint = StreamEndpoint::new("192.168.1.10", 554);
        let worker = supervisor.start(&mac, &endpoint).expect("spawn worker");
        let pid = worker.pid().expect("pid");
        registry
            .add(key, DeviceRecord::new(mac, endpoint, worker))
            .await
            .expect("add");

        // not yet stale
        sweep_once(&registry, &supervisor, Duration::from_secs(60)).await;
        assert_eq!(registry.snapshot().await.len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        sweep_once(&registry, &supervisor, Duration::from_millis(20)).await;

        assert!(registry.snapshot().await.is_empty());
        assert!(!pid_exists(pid));
    }

    #[tokio::test]
    async fn test_sweep_keeps_heartbeating_device() {
        let supervisor = test_supervisor();
        let registry = spawn_registry();
        let key: SocketAddr = "10.1.1.1:50101".parse().expect("addr");

        let mac = CameraMac::new("AA:BB:CC:DD:EE:02");
        let endpoint = StreamEndpoint::new("192.168.1.11", 554);
        let worker = supervisor.start(&mac, &endpoint).expect("spawn worker");
        registry
            .add(key, DeviceRecord::new(mac, endpoint, worker))
            .await
            .expect("add");

        tokio::time::sleep(Duration::from_millis(60)).await;
        registry.update_heartbeat(key).await.expect("heartbeat");
        sweep_once(&registry, &supervisor, Duration::from_millis(50)).await;

        assert_eq!(registry.snapshot().await.len(), 1);

        for (_, record) in registry.drain().await {
            supervisor.stop(record.worker).await;
        }
    }
}
