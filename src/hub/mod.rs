//! Process-wide live-connection state.
//!
//! The hub owns the two mutable structures of the relay: the registry of
//! live connections and the in-chat presence set. It is injectable so each
//! test gets a fresh hub instead of sharing globals; its lifecycle is tied
//! to process start/stop and nothing in it survives a restart.

mod presence;
mod registry;

pub use presence::PresenceTracker;
pub use registry::{ConnectionHandle, ConnectionRegistry, RegistryStats};

/// Owner of registry + presence, held by the event router and app state.
#[derive(Default)]
pub struct ConnectionHub {
    pub registry: ConnectionRegistry,
    pub presence: PresenceTracker,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }
}
