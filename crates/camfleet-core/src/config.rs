//! Daemon configuration, loaded from TOML with per-section defaults.
//!
//! Every field has a default so an empty file (or no file at all) yields a
//! working configuration. CLI flags may override the bind address after
//! loading; everything else is file-only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub server: ServerConfig,
    pub heartbeat: HeartbeatConfig,
    pub worker: WorkerConfig,
    pub snapshot: SnapshotConfig,
    pub announce: AnnounceConfig,
    pub report: ReportConfig,
}

impl FleetConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// TCP listener settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host. `0.0.0.0` listens on every interface.
    pub host: String,

    /// Bind port. `0` asks the OS for an ephemeral port (used by tests).
    pub port: u16,

    /// Maximum concurrent device connections; sized to the expected fleet.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 12345,
            max_sessions: 12,
        }
    }
}

/// Heartbeat expiry settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// A device is stale once this long passes without a heartbeat.
    pub timeout_secs: u64,

    /// Interval between expiry sweeps.
    pub sweep_interval_secs: u64,
}

impl HeartbeatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            sweep_interval_secs: 10,
        }
    }
}

/// Stream worker process settings.
///
/// `{url}` and `{mac}` in `args` are substituted per device at spawn time.
/// The default pulls the RTSP stream with ffmpeg and emits MJPEG frames on
/// stdout, which is the frame contract the daemon's pump expects.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub program: String,
    pub args: Vec<String>,

    /// Grace period between SIGTERM and SIGKILL when stopping a worker.
    pub stop_timeout_secs: u64,
}

impl WorkerConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            args: [
                "-rtsp_transport",
                "tcp",
                "-i",
                "{url}",
                "-an",
                "-vf",
                "fps=2",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-",
            ]
            .map(String::from)
            .to_vec(),
            stop_timeout_secs: 5,
        }
    }
}

/// Frame snapshot settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,

    /// Keep one frame out of every `every_n_frames` per device.
    pub every_n_frames: u64,

    /// Root directory; snapshots land in `<directory>/<device_ip>/<seq>.jpg`.
    pub directory: PathBuf,

    /// Bounded write queue depth; overflow drops frames with a warning.
    pub queue_capacity: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            every_n_frames: 15,
            directory: PathBuf::from("img"),
            queue_capacity: 64,
        }
    }
}

/// mDNS advertisement settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    pub enabled: bool,
    pub service_name: String,
    pub service_type: String,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "camfleet".to_string(),
            service_type: "_rawsocket._tcp".to_string(),
        }
    }
}

/// Fleet status report settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Interval between fleet table log lines; `0` disables the reporter.
    pub interval_secs: u64,
}

impl ReportConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}
