//! Line classification for the device protocol.
//!
//! Callers hand in one complete line with the CRLF delimiter already
//! stripped (framing is the transport's job). Empty lines never reach the
//! parser; sessions skip them.

use camfleet_core::{CameraMac, StreamEndpoint};
use thiserror::Error;

use crate::message::{DeviceMessage, Registration};

/// Exact heartbeat token sent by devices.
pub const HEARTBEAT_TOKEN: &str = "AliveHeartBeat";

/// Per-line protocol errors. None of these are fatal to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("expected 3 comma-separated fields, got {count}")]
    FieldCount { count: usize },

    #[error("empty {field} field")]
    EmptyField { field: &'static str },

    #[error("invalid port {value:?}")]
    InvalidPort { value: String },

    #[error("unrecognized message {line:?}")]
    Unrecognized { line: String },
}

/// Classifies one line as a heartbeat or a registration.
///
/// Leading/trailing whitespace is tolerated on the line and around each
/// registration field; devices on flaky firmware pad inconsistently.
pub fn parse_line(line: &str) -> Result<DeviceMessage, ProtocolError> {
    let line = line.trim();

    if line == HEARTBEAT_TOKEN {
        return Ok(DeviceMessage::Heartbeat);
    }

    if !line.contains(',') {
        return Err(ProtocolError::Unrecognized {
            line: line.to_string(),
        });
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(ProtocolError::FieldCount {
            count: fields.len(),
        });
    }

    let (mac, host, port) = (fields[0], fields[1], fields[2]);
    if mac.is_empty() {
        return Err(ProtocolError::EmptyField { field: "mac" });
    }
    if host.is_empty() {
        return Err(ProtocolError::EmptyField { field: "host" });
    }

    // Garbage ports must not propagate into worker spawns downstream.
    let port: u16 = match port.parse() {
        Ok(p) if p != 0 => p,
        _ => {
            return Err(ProtocolError::InvalidPort {
                value: port.to_string(),
            })
        }
    };

    Ok(DeviceMessage::Register(Registration::new(
        CameraMac::new(mac),
        StreamEndpoint::new(host, port),
    )))
}
