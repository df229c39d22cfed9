//! Best-effort mDNS advertisement of the listening socket.
//!
//! Cameras find the coordinator by browsing for the advertised service.
//! Advertisement is delegated to `avahi-publish-service`, supervised as a
//! child process for as long as the daemon runs; killing it withdraws the
//! record. A machine without avahi logs a warning and runs unannounced;
//! devices with a configured server address are unaffected.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use camfleet_core::AnnounceConfig;

/// A published service registration, withdrawn on [`Announcer::withdraw`].
pub struct Announcer {
    child: Option<Child>,
}

impl Announcer {
    /// Publishes the service. Never fails the daemon: launch errors degrade
    /// to a warning and a no-op announcer.
    pub fn publish(config: &AnnounceConfig, port: u16) -> Self {
        if !config.enabled {
            return Self { child: None };
        }

        let result = Command::new("avahi-publish-service")
            .arg(&config.service_name)
            .arg(&config.service_type)
            .arg(port.to_string())
            .arg("info=camfleet coordinator")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match result {
            Ok(child) => {
                info!(
                    service = %config.service_name,
                    service_type = %config.service_type,
                    port,
                    "mDNS service published"
                );
                Self { child: Some(child) }
            }
            Err(err) => {
                warn!(error = %err, "mDNS advertisement unavailable, continuing without");
                Self { child: None }
            }
        }
    }

    /// An announcer that publishes nothing.
    pub fn disabled() -> Self {
        Self { child: None }
    }

    /// Whether a publisher process is currently running.
    pub fn is_published(&self) -> bool {
        self.child.is_some()
    }

    /// Withdraws the advertisement.
    pub async fn withdraw(mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill().await {
                warn!(error = %err, "Failed to stop mDNS publisher");
            } else {
                info!("mDNS service withdrawn");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_config_publishes_nothing() {
        let config = AnnounceConfig {
            enabled: false,
            ..AnnounceConfig::default()
        };
        let announcer = Announcer::publish(&config, 12345);
        assert!(!announcer.is_published());
        announcer.withdraw().await;
    }

    #[tokio::test]
    async fn test_missing_binary_degrades() {
        // publish() must not error even when avahi is absent; exercised by
        // always succeeding regardless of the environment
        let announcer = Announcer::publish(&AnnounceConfig::default(), 12345);
        announcer.withdraw().await;
    }
}
