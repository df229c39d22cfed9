//! Per-device connection session.
//!
//! One session per accepted TCP connection. The session frames the byte
//! stream into CRLF-delimited lines (partial lines stay buffered across
//! reads), classifies each line, and drives the registry and worker
//! supervisor. A bad line never costs the connection; a dead connection
//! never costs any other device.
//!
//! State machine: open → registered (first valid triple) → closing. Both
//! transitions are driven from this task only, so a device's worker slot
//! has no cross-task races.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use camfleet_protocol::{parse_line, DeviceMessage, Registration};

use crate::registry::{DeviceRecord, RegistryError, RegistryHandle};
use crate::supervisor::WorkerSupervisor;

/// Upper bound on one protocol line. Registration lines are tens of bytes;
/// anything near this limit is garbage and gets discarded as such.
const MAX_LINE_LEN: usize = 512;

/// Handles one device connection for its whole lifetime.
pub struct ConnectionSession {
    frames: FramedRead<TcpStream, LinesCodec>,
    peer: SocketAddr,
    registry: RegistryHandle,
    supervisor: Arc<WorkerSupervisor>,
    cancel: CancellationToken,
}

impl ConnectionSession {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        registry: RegistryHandle,
        supervisor: Arc<WorkerSupervisor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            frames: FramedRead::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LEN)),
            peer,
            registry,
            supervisor,
            cancel,
        }
    }

    /// Runs the session until peer close, connection fault, or cancellation,
    /// then tears down this device's record and worker.
    pub async fn run(mut self) {
        debug!(peer = %self.peer, "Device connected");

        if let Err(err) = self.process_lines().await {
            match err {
                SessionError::Io(err) => {
                    debug!(peer = %self.peer, error = %err, "Connection fault");
                }
                SessionError::Registry(_) => {
                    // registry gone means daemon shutdown; teardown below
                    debug!(peer = %self.peer, "Registry unavailable, closing session");
                }
            }
        }

        self.teardown().await;
        info!(peer = %self.peer, "Device disconnected");
    }

    async fn process_lines(&mut self) -> Result<(), SessionError> {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!(peer = %self.peer, "Session cancelled");
                    return Ok(());
                }

                item = self.frames.next() => match item {
                    None => {
                        debug!(peer = %self.peer, "Peer closed connection");
                        return Ok(());
                    }
                    Some(Ok(line)) => self.handle_line(&line).await?,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        // the codec discards through the next newline and
                        // keeps framing, so this is a per-line error too
                        warn!(peer = %self.peer, max = MAX_LINE_LEN, "Oversized line discarded");
                    }
                    Some(Err(LinesCodecError::Io(err))) => {
                        return Err(SessionError::Io(err));
                    }
                },
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<(), SessionError> {
        if line.trim().is_empty() {
            return Ok(());
        }

        match parse_line(line) {
            Ok(DeviceMessage::Heartbeat) => {
                if self.registry.update_heartbeat(self.peer).await? {
                    trace!(peer = %self.peer, "Heartbeat accepted");
                } else {
                    warn!(peer = %self.peer, "Heartbeat from unregistered device");
                }
            }
            Ok(DeviceMessage::Register(registration)) => {
                self.handle_registration(registration).await?;
            }
            Err(err) => {
                warn!(peer = %self.peer, error = %err, "Protocol error, line discarded");
            }
        }

        Ok(())
    }

    /// Registration and re-registration. Replace is stop-then-start: the
    /// old worker is fully stopped before the new one is launched, so two
    /// workers never contend for one camera's stream.
    async fn handle_registration(
        &mut self,
        registration: Registration,
    ) -> Result<(), SessionError> {
        if let Some(old) = self.registry.remove(self.peer).await? {
            info!(
                peer = %self.peer,
                mac = %old.mac,
                old_stream = %old.endpoint.rtsp_url(),
                "Re-registration, stopping current worker"
            );
            self.supervisor.stop(old.worker).await;
        }

        let worker = match self
            .supervisor
            .start(&registration.mac, &registration.endpoint)
        {
            Ok(worker) => worker,
            Err(err) => {
                error!(
                    peer = %self.peer,
                    mac = %registration.mac,
                    error = %err,
                    "Failed to start stream worker"
                );
                // no record without a worker; the device may re-register
                return Ok(());
            }
        };

        info!(
            peer = %self.peer,
            mac = %registration.mac,
            stream = %registration.endpoint.rtsp_url(),
            pid = ?worker.pid(),
            "Stream worker started"
        );

        let record = DeviceRecord::new(registration.mac, registration.endpoint, worker);
        if let Some(displaced) = self.registry.add(self.peer, record).await? {
            // can't happen while this session is the only writer for this
            // key; stop it anyway rather than leak a process
            warn!(peer = %self.peer, "Unexpected displaced worker on add, stopping it");
            self.supervisor.stop(displaced).await;
        }

        Ok(())
    }

    /// Removes this connection's record, if any, and stops its worker.
    /// Safe to reach from every exit path: a session that never registered
    /// (or was already reaped by the sweeper) removes nothing.
    async fn teardown(&mut self) {
        match self.registry.remove(self.peer).await {
            Ok(Some(record)) => {
                info!(peer = %self.peer, mac = %record.mac, "Removing device on disconnect");
                self.supervisor.stop(record.worker).await;
            }
            Ok(None) => {}
            Err(RegistryError::ChannelClosed) => {
                // shutdown already drained the registry
            }
        }
    }
}

/// Session-fatal errors; per-line problems never become one of these.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
