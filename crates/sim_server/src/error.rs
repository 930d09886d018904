//! Server-layer error types.

use sim_net::NetError;
use sim_world::{DependencyError, WorldError};

/// Errors raised while setting up or running a game server or client.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Transport or message registration failure.
    #[error(transparent)]
    Net(#[from] NetError),

    /// Entity, map or prototype failure.
    #[error(transparent)]
    World(#[from] WorldError),

    /// A required service was not registered.
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}
