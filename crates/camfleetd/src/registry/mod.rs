//! Device registry: the single owner of connected-camera state.
//!
//! The registry is built as an actor: one task owns the map, everyone else
//! talks to it through a cloneable [`RegistryHandle`]. Commands are
//! processed strictly in order, so add/update/remove/list are linearizable
//! without any shared lock, and the actor never does I/O: worker handles
//! are passed back to callers for teardown.

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{DeviceRecord, RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

use tokio::sync::mpsc;

/// Command channel depth. Senders briefly queue under burst registration;
/// the actor itself never blocks, so this stays small.
const COMMAND_BUFFER: usize = 64;

/// Spawns the registry actor and returns a handle to it.
///
/// The actor stops once every handle clone has been dropped.
pub fn spawn_registry() -> RegistryHandle {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = RegistryActor::new(rx);
    tokio::spawn(actor.run());
    RegistryHandle::new(tx)
}
