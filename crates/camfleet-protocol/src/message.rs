//! Classified device messages.

use camfleet_core::{CameraMac, StreamEndpoint};

/// One complete line from a device, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// Liveness ping; refreshes the sender's heartbeat timestamp.
    Heartbeat,

    /// Registration or re-registration of a streaming endpoint.
    Register(Registration),
}

/// Payload of a registration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Device-reported MAC; immutable for the lifetime of the record.
    pub mac: CameraMac,

    /// Where to pull this camera's stream from; replaced on re-registration.
    pub endpoint: StreamEndpoint,
}

impl Registration {
    pub fn new(mac: impl Into<CameraMac>, endpoint: StreamEndpoint) -> Self {
        Self {
            mac: mac.into(),
            endpoint,
        }
    }
}
