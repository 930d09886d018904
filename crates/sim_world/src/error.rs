//! World-layer error types.

use sim_component::{ComponentError, EntityUid};
use sim_math::{GridId, MapId};

/// Malformed hierarchy operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// The entity has no transform.
    #[error("entity {0} has no transform")]
    MissingTransform(EntityUid),

    /// An entity cannot be its own parent.
    #[error("entity {0} cannot be parented to itself")]
    SelfParent(EntityUid),

    /// Attaching would make an entity its own ancestor.
    #[error("attaching {child} to {parent} would create a cycle")]
    Cycle { child: EntityUid, parent: EntityUid },

    /// The grid of a parented entity is derived from its root.
    #[error("cannot set the grid of parented entity {0}")]
    GridOnParented(EntityUid),
}

/// Errors raised by the entity manager, maps, prototypes and systems.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// No live entity with this uid.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityUid),

    /// An entity with this uid already exists.
    #[error("entity {0} already exists")]
    DuplicateEntity(EntityUid),

    /// The uid is reserved and cannot name an entity.
    #[error("entity uid {0} is reserved")]
    ReservedEntity(EntityUid),

    /// Every entity uid has been handed out.
    #[error("entity uid space exhausted")]
    EntitiesExhausted,

    /// No prototype with this name.
    #[error("unknown prototype '{0}'")]
    UnknownPrototype(String),

    /// A prototype document could not be parsed.
    #[error("invalid prototype document: {0}")]
    InvalidPrototype(#[from] serde_json::Error),

    /// No map with this id.
    #[error("unknown map {0}")]
    UnknownMap(MapId),

    /// No grid with this id.
    #[error("unknown grid {0}")]
    UnknownGrid(GridId),

    /// A map with this id already exists.
    #[error("map {0} already exists")]
    DuplicateMap(MapId),

    /// A grid with this id already exists.
    #[error("grid {0} already exists")]
    DuplicateGrid(GridId),

    /// `u32::MAX` is never assigned as a map id.
    #[error("map id {0} is reserved")]
    ReservedMap(MapId),

    /// `u32::MAX` is never assigned as a grid id.
    #[error("grid id {0} is reserved")]
    ReservedGrid(GridId),

    /// Received chunk data does not match the grid's chunk size.
    #[error("chunk of grid {grid} has {found} tiles, expected {expected}")]
    ChunkSize { grid: GridId, expected: usize, found: usize },

    /// A default grid cannot be deleted without its map.
    #[error("grid {0} is the default grid of its map")]
    DefaultGrid(GridId),

    /// Component registry failure.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// Hierarchy failure.
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Errors from the dependency context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DependencyError {
    /// Nothing is registered for this type.
    #[error("no dependency registered for {0}")]
    Unregistered(&'static str),

    /// A singleton is already registered for this type.
    #[error("dependency {0} is already registered")]
    AlreadyRegistered(&'static str),
}
