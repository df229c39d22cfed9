//! Stream worker supervision.
//!
//! Each registered camera gets one external worker process that pulls the
//! device's RTSP stream and writes MJPEG frames to stdout. Process-level
//! isolation keeps a crashing or wedged video pipeline from touching the
//! coordinator or other devices' streams.
//!
//! Lifecycle contract: a [`WorkerHandle`] is owned by exactly one registry
//! record, and [`WorkerSupervisor::stop`] consumes the handle, so stopping a
//! worker twice is unrepresentable. Stop is graceful-then-forced: SIGTERM,
//! a bounded wait, then SIGKILL.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use futures::StreamExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use camfleet_core::{CameraMac, StreamEndpoint, WorkerConfig};

use crate::frames::{FrameCallback, FrameMeta, JpegFrameDecoder};

/// A live worker process plus its frame pump task.
#[derive(Debug)]
pub struct WorkerHandle {
    child: Child,
    mac: CameraMac,
    pump: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// OS process id, `None` once the child has been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Liveness probe; does not block and does not wait for exit.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Spawns and terminates stream workers.
pub struct WorkerSupervisor {
    config: WorkerConfig,
    frame_callback: Option<FrameCallback>,
}

impl WorkerSupervisor {
    /// `frame_callback` receives every frame each worker emits; pass `None`
    /// to discard worker output entirely.
    pub fn new(config: WorkerConfig, frame_callback: Option<FrameCallback>) -> Self {
        Self {
            config,
            frame_callback,
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        self.config.stop_timeout()
    }

    /// Launches a worker for one device. Returns immediately; the worker's
    /// own connect/retry behavior is its business, not the coordinator's.
    pub fn start(&self, mac: &CameraMac, endpoint: &StreamEndpoint) -> io::Result<WorkerHandle> {
        let url = endpoint.rtsp_url();
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| arg.replace("{url}", &url).replace("{mac}", mac.as_str()))
            .collect();

        let stdout_mode = if self.frame_callback.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout_mode)
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let pump = match (&self.frame_callback, child.stdout.take()) {
            (Some(callback), Some(stdout)) => Some(spawn_frame_pump(
                stdout,
                endpoint.host.clone(),
                mac.clone(),
                callback.clone(),
            )),
            _ => None,
        };

        debug!(
            mac = %mac,
            stream = %url,
            pid = ?child.id(),
            program = %self.config.program,
            "Worker spawned"
        );

        Ok(WorkerHandle {
            child,
            mac: mac.clone(),
            pump,
        })
    }

    /// Stops a worker: SIGTERM, a bounded wait, then SIGKILL.
    ///
    /// Consumes the handle. Tolerates a worker that already exited.
    pub async fn stop(&self, mut handle: WorkerHandle) {
        // Already gone? try_wait also reaps, so the zombie is collected.
        if let Ok(Some(status)) = handle.child.try_wait() {
            debug!(mac = %handle.mac, %status, "Worker already exited");
            Self::join_pump(&mut handle).await;
            return;
        }

        if let Some(pid) = handle.child.id() {
            // SAFETY: plain kill(2) on a pid we still own; no memory at play.
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }

        match timeout(self.config.stop_timeout(), handle.child.wait()).await {
            Ok(Ok(status)) => {
                info!(mac = %handle.mac, %status, "Worker stopped");
            }
            Ok(Err(err)) => {
                warn!(mac = %handle.mac, error = %err, "Failed waiting for worker exit");
            }
            Err(_) => {
                warn!(
                    mac = %handle.mac,
                    timeout_secs = self.config.stop_timeout_secs,
                    "Worker ignored SIGTERM, killing"
                );
                if let Err(err) = handle.child.kill().await {
                    warn!(mac = %handle.mac, error = %err, "Failed to kill worker");
                }
            }
        }

        Self::join_pump(&mut handle).await;
    }

    /// The pump ends on its own at stdout EOF; joining here just bounds it.
    async fn join_pump(handle: &mut WorkerHandle) {
        if let Some(pump) = handle.pump.take() {
            if timeout(Duration::from_secs(1), pump).await.is_err() {
                debug!(mac = %handle.mac, "Frame pump still draining, detached");
            }
        }
    }
}

/// Reads a worker's stdout and forwards every decoded frame to the callback.
fn spawn_frame_pump(
    stdout: ChildStdout,
    device_ip: String,
    mac: CameraMac,
    callback: FrameCallback,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut frames = FramedRead::new(stdout, JpegFrameDecoder::new());
        let mut sequence: u64 = 0;

        while let Some(item) = frames.next().await {
            match item {
                Ok(frame) => {
                    sequence += 1;
                    callback(
                        frame,
                        FrameMeta {
                            device_ip: device_ip.clone(),
                            sequence,
                        },
                    );
                }
                Err(err) => {
                    debug!(mac = %mac, error = %err, "Frame pump read error");
                    break;
                }
            }
        }

        debug!(mac = %mac, frames = sequence, "Frame pump finished");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn config_for(program: &str, args: &[&str]) -> WorkerConfig {
        WorkerConfig {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            stop_timeout_secs: 1,
        }
    }

    fn endpoint() -> StreamEndpoint {
        StreamEndpoint::new("192.168.1.10", 554)
    }

    fn mac() -> CameraMac {
        CameraMac::new("AA:BB:CC:DD:EE:01")
    }

    fn pid_exists(pid: u32) -> bool {
        std::path::Path::new(&format!("/proc/{pid}")).exists()
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let supervisor = WorkerSupervisor::new(config_for("sleep", &["30"]), None);

        let mut handle = supervisor.start(&mac(), &endpoint()).expect("spawn sleep");
        let pid = handle.pid().expect("pid");
        assert!(handle.is_alive());
        assert!(pid_exists(pid));

        supervisor.stop(handle).await;
        assert!(!pid_exists(pid));
    }

    #[tokio::test]
    async fn test_stop_tolerates_exited_worker() {
        let supervisor = WorkerSupervisor::new(config_for("true", &[]), None);

        let handle = supervisor.start(&mac(), &endpoint()).expect("spawn true");
        // give the process a moment to exit on its own
        sleep(Duration::from_millis(200)).await;

        // must not error or hang
        supervisor.stop(handle).await;
    }

    #[tokio::test]
    async fn test_stop_force_kills_stubborn_worker() {
        let supervisor = WorkerSupervisor::new(
            config_for("sh", &["-c", "trap '' TERM; sleep 30"]),
            None,
        );

        let handle = supervisor.start(&mac(), &endpoint()).expect("spawn sh");
        let pid = handle.pid().expect("pid");
        // let the shell install its trap before we signal it
        sleep(Duration::from_millis(200)).await;

        supervisor.stop(handle).await;
        assert!(!pid_exists(pid));
    }

    #[tokio::test]
    async fn test_arg_template_substitution() {
        let supervisor = WorkerSupervisor::new(
            config_for("sh", &["-c", "echo {url} {mac} >/dev/null; sleep 30"]),
            None,
        );

        let handle = supervisor.start(&mac(), &endpoint()).expect("spawn sh");
        assert!(handle.pid().is_some());
        supervisor.stop(handle).await;
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let supervisor =
            WorkerSupervisor::new(config_for("/nonexistent/stream-puller", &[]), None);
        assert!(supervisor.start(&mac(), &endpoint()).is_err());
    }

    #[tokio::test]
    async fn test_frame_pump_delivers_frames() {
        let frames_seen = Arc::new(AtomicU64::new(0));
        let last_seq = Arc::new(AtomicU64::new(0));

        let seen = Arc::clone(&frames_seen);
        let seq = Arc::clone(&last_seq);
        let callback: FrameCallback = Arc::new(move |frame, meta: FrameMeta| {
            assert!(frame.starts_with(&[0xFF, 0xD8]));
            assert!(frame.ends_with(&[0xFF, 0xD9]));
            assert_eq!(meta.device_ip, "192.168.1.10");
            seen.fetch_add(1, Ordering::SeqCst);
            seq.store(meta.sequence, Ordering::SeqCst);
        });

        // two minimal JPEG frames, then stay alive until stopped
        let supervisor = WorkerSupervisor::new(
            config_for(
                "sh",
                &[
                    "-c",
                    "printf '\\377\\330\\377\\331\\377\\330\\377\\331'; sleep 30",
                ],
            ),
            Some(callback),
        );

        let handle = supervisor.start(&mac(), &endpoint()).expect("spawn sh");

        // wait for both frames to arrive
        for _ in 0..50 {
            if frames_seen.load(Ordering::SeqCst) >= 2 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(frames_seen.load(Ordering::SeqCst), 2);
        assert_eq!(last_seq.load(Ordering::SeqCst), 2);

        supervisor.stop(handle).await;
    }
}
