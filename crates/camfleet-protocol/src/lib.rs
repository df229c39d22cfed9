//! Camfleet wire protocol.
//!
//! Devices speak a line-oriented, CRLF-delimited plain-text protocol, one
//! message per line, device-to-server only:
//!
//! - `AliveHeartBeat` is a liveness ping, no payload.
//! - `<mac>,<host>,<port>` registers (or re-registers) the
//!   device's streaming endpoint.
//!
//! Anything else on a line is a protocol error for that line only; the
//! connection is expected to survive it.

pub mod message;
pub mod parse;

pub use message::{DeviceMessage, Registration};
pub use parse::{parse_line, ProtocolError, HEARTBEAT_TOKEN};
