//! 2D affine matrix helpers.
//!
//! All spatial composition uses homogeneous 3×3 matrices ([`glam::Mat3`]).
//! A local matrix rotates first and then translates:
//!
//! ```text
//! local   = T(position) × R(rotation)
//! inverse = R(-rotation) × T(-position)
//! ```

use glam::{Mat3, Vec2};

use crate::angle::Angle;

/// The local matrix for a position and rotation.
#[must_use]
pub fn local_matrix(position: Vec2, rotation: Angle) -> Mat3 {
    Mat3::from_translation(position) * Mat3::from_angle(rotation.theta as f32)
}

/// The exact inverse of [`local_matrix`], built without a general inversion.
#[must_use]
pub fn inverse_local_matrix(position: Vec2, rotation: Angle) -> Mat3 {
    Mat3::from_angle(-rotation.theta as f32) * Mat3::from_translation(-position)
}

/// Transform a point by an affine matrix.
#[must_use]
pub fn transform_point(matrix: &Mat3, point: Vec2) -> Vec2 {
    matrix.transform_point2(point)
}

/// The translation part of an affine matrix.
#[must_use]
pub fn translation_of(matrix: &Mat3) -> Vec2 {
    matrix.z_axis.truncate()
}
