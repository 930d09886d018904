//! # sim_component
//!
//! The "C" in ECS for the replicated simulation: what a component is, how it
//! is registered, stored and found again, and how its state crosses the wire.
//!
//! This crate provides:
//!
//! - [`EntityUid`] and [`EntityAllocator`]: opaque, never-reused entity ids.
//! - [`Component`] / [`ComponentKind`]: the component contract and its static
//!   identity (name, net id, roles).
//! - [`ComponentState`]: immutable MessagePack snapshots for replication.
//! - [`ComponentFactory`]: registration of component kinds.
//! - [`ComponentManager`]: per-entity registry keyed by role and net id, with
//!   deferred removal.
//! - [`EntityQuery`]: declarative entity selection by role.

pub mod component;
pub mod entity;
pub mod error;
pub mod factory;
pub mod manager;
pub mod query;

pub use component::{Component, ComponentKind, ComponentState, ComponentTypeId, FieldMap, NetId, Tick};
pub use entity::{EntityAllocator, EntityUid};
pub use error::ComponentError;
pub use factory::{ComponentFactory, ComponentRegistration};
pub use manager::{ComponentKey, ComponentManager, ComponentMeta};
pub use query::{ComponentSetQuery, EntityQuery};
