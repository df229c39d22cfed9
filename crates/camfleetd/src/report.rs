//! Periodic fleet status report.
//!
//! Logs one line per connected camera at a configurable interval so an
//! operator tailing the daemon log can see the fleet at a glance.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::RegistryHandle;

/// Spawns the report task. Callers skip spawning when reporting is
/// disabled (`ReportConfig::interval()` returned `None`).
pub fn spawn_report_task(
    registry: RegistryHandle,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break;
                }

                _ = tick.tick() => {
                    report_once(&registry).await;
                }
            }
        }
    })
}

async fn report_once(registry: &RegistryHandle) {
    let devices = registry.snapshot().await;

    if devices.is_empty() {
        info!("No cameras connected");
        return;
    }

    for view in &devices {
        info!(
            peer = %view.peer,
            mac = %view.mac,
            stream = %view.endpoint.rtsp_url(),
            worker_pid = ?view.worker_pid,
            heartbeat_age_secs = view.heartbeat_age.as_secs(),
            registered_at = %view.registered_at.format("%Y-%m-%d %H:%M:%S"),
            "Camera"
        );
    }

    info!(count = devices.len(), "Fleet status");
}
