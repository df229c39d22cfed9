//! Camfleet Daemon - camera fleet coordinator
//!
//! This crate provides the core infrastructure for the camfleet daemon:
//! - `registry` - Device registry actor tracking connected cameras
//! - `server` - TCP server for device registration and heartbeats
//! - `supervisor` - One external stream worker process per device
//! - `sweeper` - Background eviction of devices with expired heartbeats
//! - `sink` / `snapshot` - Bounded off-path frame snapshot writing
//! - `announce` - Best-effort mDNS advertisement of the listener
//! - `report` - Periodic fleet status logging
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        camfleetd                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────┐      ┌─────────────────────────────┐    │
//! │  │   FleetServer   │─────▶│       RegistryActor         │    │
//! │  │ (TCP listener)  │      │   (device state owner)      │    │
//! │  └────────┬────────┘      └──────────────┬──────────────┘    │
//! │           │ accept()                     │ list_stale/remove │
//! │           ▼                              │                   │
//! │  ┌─────────────────┐      ┌──────────────┴──────────────┐    │
//! │  │ConnectionSession│      │      HeartbeatSweeper       │    │
//! │  │  (per device)   │      │      (periodic task)        │    │
//! │  └────────┬────────┘      └─────────────────────────────┘    │
//! │           │ start/stop                                       │
//! │           ▼                                                  │
//! │  ┌─────────────────┐      ┌─────────────────────────────┐    │
//! │  │WorkerSupervisor │─────▶│  worker process (ffmpeg)    │    │
//! │  │                 │◀─────│  frames on stdout           │    │
//! │  └────────┬────────┘      └─────────────────────────────┘    │
//! │           │ frame callback                                   │
//! │           ▼                                                  │
//! │  ┌─────────────────┐      ┌─────────────────────────────┐    │
//! │  │ SnapshotWriter  │─────▶│   AsyncSink (bounded queue  │    │
//! │  │  (every Nth)    │      │    + single consumer)       │    │
//! │  └─────────────────┘      └─────────────────────────────┘    │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-device worker mutations (start, replace, stop) are only ever issued
//! by that device's own session task or by the sweeper after it detached the
//! record, so a worker handle has exactly one owner at any time.

pub mod announce;
pub mod frames;
pub mod registry;
pub mod report;
pub mod server;
pub mod sink;
pub mod snapshot;
pub mod supervisor;
pub mod sweeper;
