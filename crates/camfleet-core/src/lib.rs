//! Camfleet Core - Shared types for the camera fleet coordinator
//!
//! This crate provides the domain types and configuration shared between
//! the wire protocol crate (camfleet-protocol) and the daemon (camfleetd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()` outside of tests.

pub mod config;
pub mod device;

// Re-exports for convenience
pub use config::{
    AnnounceConfig, ConfigError, FleetConfig, HeartbeatConfig, ReportConfig, ServerConfig,
    SnapshotConfig, WorkerConfig,
};
pub use device::{CameraMac, DeviceView, StreamEndpoint};
