//! # sim_world
//!
//! The world of the replicated simulation: entities, their transform
//! hierarchy, maps and grids, systems, and the game state protocol that
//! keeps a client's copy in step with the server's.
//!
//! - [`EntityManager`]: entity lifecycle, queries and hierarchy operations,
//!   shared by both sides.
//! - [`ServerEntityManager`] / [`ClientEntityManager`]: building and
//!   applying [`GameState`] deltas.
//! - [`MapManager`]: maps, grids and tiles.
//! - [`spatial`]: position, range and arc queries, and snap-checked spawning.
//! - [`EntitySystemManager`]: per-tick systems, including physics.
//! - [`PrototypeIndex`]: entity templates.
//! - [`Dependencies`]: the explicit service context built at startup.

pub mod client;
pub mod components;
pub mod dependencies;
pub mod entity;
pub mod entity_manager;
pub mod error;
pub mod events;
pub mod game_state;
pub mod hierarchy;
pub mod map;
pub mod map_manager;
pub mod prototype;
pub mod server;
pub mod spatial;
pub mod systems;

pub use client::ClientEntityManager;
pub use components::{PHYSICS_NET_ID, Physics, PhysicsState, builtin_factory, shared_builtin_factory};
pub use dependencies::{Dependencies, DependencyCollection};
pub use entity::Entity;
pub use entity_manager::{DEFAULT_MOVE_THRESHOLD, EntityManager};
pub use error::{DependencyError, TransformError, WorldError};
pub use events::EntityEvent;
pub use game_state::{EntityState, GameState, MapStateData, MsgState, MsgStateAck};
pub use map::{Chunk, ChunkIndex, Grid, Map, Tile, TileIndices};
pub use map_manager::{MapManager, TileChange};
pub use prototype::{ComponentPrototype, EntityPrototype, PrototypeIndex, PrototypeSource};
pub use server::ServerEntityManager;
pub use systems::{EntitySystem, EntitySystemManager, PhysicsSystem};
