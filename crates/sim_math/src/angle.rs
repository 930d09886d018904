//! Planar rotation angles.

use std::f64::consts::TAU;
use std::ops::{Add, AddAssign, Neg, Sub};

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// A counter-clockwise rotation in radians.
///
/// Angles are not normalised on construction; composition simply adds.
/// Use [`Angle::reduced`] or [`Angle::equals_approx`] when comparing.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Angle {
    /// Rotation in radians.
    pub theta: f64,
}

impl Angle {
    /// No rotation.
    pub const ZERO: Self = Self { theta: 0.0 };

    /// Create an angle from radians.
    #[must_use]
    pub const fn new(theta: f64) -> Self {
        Self { theta }
    }

    /// Create an angle from degrees.
    #[must_use]
    pub fn from_degrees(degrees: f64) -> Self {
        Self::new(degrees.to_radians())
    }

    /// The angle in degrees.
    #[must_use]
    pub fn degrees(self) -> f64 {
        self.theta.to_degrees()
    }

    /// The equivalent angle in `[0, 2π)`.
    #[must_use]
    pub fn reduced(self) -> Self {
        let mut theta = self.theta.rem_euclid(TAU);
        if theta >= TAU {
            theta -= TAU;
        }
        Self::new(theta)
    }

    /// Returns `true` if both angles point the same way within `tolerance`
    /// radians, ignoring whole turns.
    #[must_use]
    pub fn equals_approx(self, other: Self, tolerance: f64) -> bool {
        let diff = (self - other).reduced().theta;
        diff <= tolerance || (TAU - diff) <= tolerance
    }

    /// The unit direction this angle points in.
    #[must_use]
    pub fn to_vec(self) -> Vec2 {
        Vec2::new(self.theta.cos() as f32, self.theta.sin() as f32)
    }

    /// Rotate a vector by this angle.
    #[must_use]
    pub fn rotate_vec(self, v: Vec2) -> Vec2 {
        Vec2::from_angle(self.theta as f32).rotate(v)
    }
}

impl Add for Angle {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.theta + rhs.theta)
    }
}

impl AddAssign for Angle {
    fn add_assign(&mut self, rhs: Self) {
        self.theta += rhs.theta;
    }
}

impl Sub for Angle {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.theta - rhs.theta)
    }
}

impl Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.theta)
    }
}

impl From<f64> for Angle {
    fn from(theta: f64) -> Self {
        Self::new(theta)
    }
}

impl std::fmt::Display for Angle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} rad", self.theta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_degrees_roundtrip() {
        let a = Angle::from_degrees(90.0);
        assert!((a.theta - PI / 2.0).abs() < 1e-12);
        assert!((a.degrees() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_composition_adds() {
        let total = Angle::from_degrees(135.0) + Angle::from_degrees(45.0) + Angle::from_degrees(45.0);
        assert!(total.equals_approx(Angle::from_degrees(225.0), 1e-9));
    }

    #[test]
    fn test_reduced_wraps_whole_turns() {
        let a = Angle::from_degrees(450.0).reduced();
        assert!((a.degrees() - 90.0).abs() < 1e-9);
        let b = Angle::from_degrees(-90.0).reduced();
        assert!((b.degrees() - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_equals_approx_across_zero() {
        assert!(Angle::new(TAU - 1e-6).equals_approx(Angle::ZERO, 1e-5));
    }

    #[test]
    fn test_rotate_vec_quarter_turn() {
        let v = Angle::from_degrees(90.0).rotate_vec(Vec2::X);
        assert!(v.abs_diff_eq(Vec2::Y, 1e-6));
    }
}
