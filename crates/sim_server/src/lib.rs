//! # sim_server
//!
//! Process-level wiring for the replicated simulation: the authoritative
//! [`GameServer`], the replicating [`GameClient`], their command-line
//! configuration and the fixed-rate [`TickLoop`] that drives both.

pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod tick;

use std::any::Any;
use std::path::Path;

use anyhow::Context;
use sim_world::{Dependencies, DependencyCollection, PrototypeIndex, builtin_factory};
use tracing::info;

pub use client::{ClientContext, GameClient};
pub use config::{ClientConfig, DEFAULT_MAX_PLAYERS, ServerConfig};
pub use error::GameError;
pub use server::{GameServer, ServerContext};
pub use session::{PlayerSession, SessionRegistry, SessionStatus};
pub use tick::{Flow, StopReason, TickConfig, TickLoop};

/// Read a JSON array of entity prototypes. `None` gives an empty index.
///
/// # Errors
///
/// Fails if the file cannot be read or is not a valid prototype list.
pub fn load_prototypes(path: Option<&Path>) -> anyhow::Result<PrototypeIndex> {
    let mut index = PrototypeIndex::new();
    if let Some(path) = path {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prototypes from {}", path.display()))?;
        let count = index
            .load_json(&json)
            .with_context(|| format!("invalid prototype file {}", path.display()))?;
        info!(count, path = %path.display(), "loaded prototypes");
    }
    Ok(index)
}

/// Services shared by the server and client: `config`, the built-in
/// component factory and `prototypes`.
///
/// # Errors
///
/// Fails if the component factory cannot be built.
pub fn build_dependencies<T: Any + Send + Sync>(config: T, prototypes: PrototypeIndex) -> Result<Dependencies, GameError> {
    let mut collection = DependencyCollection::new();
    collection.register(config)?;
    collection.register(builtin_factory().map_err(sim_world::WorldError::from)?)?;
    collection.register(prototypes)?;
    Ok(collection.build())
}
