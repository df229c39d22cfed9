//! Camera identity and stream endpoint types.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MAC address string a camera reports at registration.
///
/// Treated as an opaque identifier: the device is authoritative for its own
/// MAC and no format beyond non-emptiness is enforced. Immutable once a
/// device is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraMac(String);

impl CameraMac {
    pub fn new(mac: impl Into<String>) -> Self {
        Self(mac.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraMac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraMac {
    fn from(mac: &str) -> Self {
        Self::new(mac)
    }
}

/// Where to pull a camera's stream from.
///
/// The host is device-supplied and may differ from the address the device
/// connected from; the connection's peer address stays the registry key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEndpoint {
    pub host: String,
    pub port: u16,
}

impl StreamEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The RTSP URL a worker pulls from.
    pub fn rtsp_url(&self) -> String {
        format!("rtsp://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Point-in-time copy of one registry record, for enumeration and reporting.
///
/// Deliberately carries no worker handle: handles never leave the registry
/// except by `remove`/`drain`, so a view can be cloned and logged freely.
#[derive(Debug, Clone)]
pub struct DeviceView {
    /// Peer address of the owning connection (the registry key).
    pub peer: SocketAddr,

    /// MAC reported at registration.
    pub mac: CameraMac,

    /// Current stream endpoint.
    pub endpoint: StreamEndpoint,

    /// Wall-clock time of the most recent (re-)registration.
    pub registered_at: DateTime<Utc>,

    /// How long ago the last heartbeat (or registration) was accepted.
    pub heartbeat_age: Duration,

    /// OS process id of the worker, if it has not been reaped yet.
    pub worker_pid: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtsp_url() {
        let endpoint = StreamEndpoint::new("192.168.1.10", 554);
        assert_eq!(endpoint.rtsp_url(), "rtsp://192.168.1.10:554");
        assert_eq!(endpoint.to_string(), "192.168.1.10:554");
    }

    #[test]
    fn test_mac_display() {
        let mac = CameraMac::new("AA:BB:CC:DD:EE:01");
        assert_eq!(mac.as_str(), "AA:BB:CC:DD:EE:01");
        assert_eq!(mac.to_string(), "AA:BB:CC:DD:EE:01");
    }

    #[test]
    fn test_endpoint_equality() {
        let a = StreamEndpoint::new("10.0.0.1", 554);
        let b = StreamEndpoint::new("10.0.0.1", 554);
        let c = StreamEndpoint::new("10.0.0.1", 8554);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
