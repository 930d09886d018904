//! # sim_math
//!
//! Math types for the replicated simulation. Re-exports [`glam`] for linear
//! algebra and defines the spatial types shared by server and client:
//!
//! - [`Angle`]: planar rotation in radians.
//! - [`GridId`], [`MapId`] and the coordinates expressed against them.
//! - [`Box2`]: axis-aligned boxes for area queries.
//! - [`matrix`]: affine helpers for local and inverse-local matrices.
//! - [`Transform`]: the replicated transform component.

pub mod angle;
pub mod bounds;
pub mod coordinates;
pub mod matrix;
pub mod transform;

// Re-export glam types for convenience.
pub use glam::{Mat3, Vec2, Vec3};

pub use angle::Angle;
pub use bounds::Box2;
pub use coordinates::{GridCoordinates, GridId, MapCoordinates, MapId};
pub use transform::{TRANSFORM_NET_ID, Transform, TransformState};
