//! TCP fleet server.
//!
//! The server:
//! - Listens on one TCP socket for camera connections
//! - Spawns a ConnectionSession task per device
//! - Replaces a live session when the same peer address reconnects
//! - Owns shutdown ordering: sessions, then the sweeper and reporter,
//!   then whatever the registry still holds
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   FleetServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionSession│────▶│  RegistryHandle │
//! │  (per device)   │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │ start/stop            ▲
//!         ▼                       │ list_stale/remove
//! ┌─────────────────┐     ┌───────┴─────────┐
//! │WorkerSupervisor │     │HeartbeatSweeper │
//! └─────────────────┘     └─────────────────┘
//! ```

mod connection;

pub use connection::{ConnectionSession, SessionError};

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use camfleet_core::FleetConfig;

use crate::registry::RegistryHandle;
use crate::report::spawn_report_task;
use crate::supervisor::WorkerSupervisor;
use crate::sweeper::spawn_sweeper_task;

/// One live session task and the token that cancels it.
struct SessionEntry {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// TCP server for the camera fleet.
pub struct FleetServer {
    listener: TcpListener,
    config: FleetConfig,
    registry: RegistryHandle,
    supervisor: Arc<WorkerSupervisor>,
    cancel: CancellationToken,
}

impl FleetServer {
    /// Binds the listening socket. A bind failure is the one fatal error in
    /// the system: without a listener there is no daemon.
    pub async fn bind(
        config: FleetConfig,
        registry: RegistryHandle,
        supervisor: Arc<WorkerSupervisor>,
        cancel: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, max_sessions = config.server.max_sessions, "Fleet server listening");
        }

        Ok(Self {
            listener,
            config,
            registry,
            supervisor,
            cancel,
        })
    }

    /// The bound address (useful when configured with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until cancellation, then shuts the whole fleet
    /// down in order. Does not return until shutdown completes.
    pub async fn run(self) {
        let sweeper = spawn_sweeper_task(
            self.registry.clone(),
            Arc::clone(&self.supervisor),
            self.config.heartbeat.clone(),
            self.cancel.child_token(),
        );

        let reporter = self.config.report.interval().map(|period| {
            spawn_report_task(self.registry.clone(), period, self.cancel.child_token())
        });

        let mut sessions: HashMap<SocketAddr, SessionEntry> = HashMap::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        self.admit(&mut sessions, stream, peer).await;
                    }
                    Err(err) => {
                        // transient accept failures must not kill the fleet
                        error!(error = %err, "Failed to accept connection");
                    }
                },
            }
        }

        self.shutdown(sessions, sweeper, reporter).await;
    }

    /// Admits one accepted connection, replacing any live session from the
    /// same peer address (the connection-level twin of registration
    /// replacement).
    async fn admit(
        &self,
        sessions: &mut HashMap<SocketAddr, SessionEntry>,
        stream: TcpStream,
        peer: SocketAddr,
    ) {
        sessions.retain(|_, entry| !entry.task.is_finished());

        if let Some(old) = sessions.remove(&peer) {
            info!(peer = %peer, "Reconnect from live peer, replacing its session");
            old.token.cancel();
            if let Err(err) = old.task.await {
                warn!(peer = %peer, error = %err, "Old session task failed");
            }
        }

        if sessions.len() >= self.config.server.max_sessions {
            warn!(
                peer = %peer,
                max = self.config.server.max_sessions,
                "Session limit reached, refusing connection"
            );
            return;
        }

        let token = self.cancel.child_token();
        let session = ConnectionSession::new(
            stream,
            peer,
            self.registry.clone(),
            Arc::clone(&self.supervisor),
            token.clone(),
        );
        let task = tokio::spawn(session.run());
        sessions.insert(peer, SessionEntry { token, task });

        info!(peer = %peer, active_sessions = sessions.len(), "Connection accepted");
    }

    /// Top-down teardown: sessions first (each removes its own record and
    /// stops its worker), then the background tasks, then anything the
    /// registry still holds.
    async fn shutdown(
        &self,
        sessions: HashMap<SocketAddr, SessionEntry>,
        sweeper: JoinHandle<()>,
        reporter: Option<JoinHandle<()>>,
    ) {
        let count = sessions.len();

        // session tokens are children of the server token and are already
        // cancelled; cancel() again is a harmless no-op on the replace path
        for entry in sessions.values() {
            entry.token.cancel();
        }
        for (peer, entry) in sessions {
            if let Err(err) = entry.task.await {
                warn!(peer = %peer, error = %err, "Session task failed during shutdown");
            }
        }
        if count > 0 {
            info!(sessions = count, "All sessions terminated");
        }

        if let Err(err) = sweeper.await {
            warn!(error = %err, "Sweeper task failed during shutdown");
        }
        if let Some(reporter) = reporter {
            if let Err(err) = reporter.await {
                warn!(error = %err, "Reporter task failed during shutdown");
            }
        }

        // Sessions remove their own records on the way out; anything left
        // belongs to a session that died uncleanly. Stop those workers too.
        for (peer, record) in self.registry.drain().await {
            warn!(peer = %peer, mac = %record.mac, "Record outlived its session, stopping worker");
            self.supervisor.stop(record.worker).await;
        }

        info!("Fleet server stopped");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}
