//! Axis-aligned boxes.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// An axis-aligned box, edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Box2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl Box2 {
    /// A box spanning both corners, in either order.
    #[must_use]
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// A box of half-size `half_extents` around `center`.
    #[must_use]
    pub fn centered(center: Vec2, half_extents: Vec2) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    #[must_use]
    pub fn intersects(&self, other: &Box2) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// The box grown by `amount` on every side.
    #[must_use]
    pub fn enlarged(&self, amount: f32) -> Self {
        Self::new(self.min - Vec2::splat(amount), self.max + Vec2::splat(amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_orders_corners() {
        let b = Box2::new(Vec2::new(2.0, -1.0), Vec2::new(-2.0, 1.0));
        assert_eq!(b.min, Vec2::new(-2.0, -1.0));
        assert_eq!(b.max, Vec2::new(2.0, 1.0));
        assert_eq!(b.center(), Vec2::ZERO);
    }

    #[test]
    fn test_contains_edges() {
        let b = Box2::centered(Vec2::new(1.0, 1.0), Vec2::splat(1.0));
        assert!(b.contains(Vec2::new(0.0, 2.0)));
        assert!(b.contains(Vec2::new(1.0, 1.0)));
        assert!(!b.contains(Vec2::new(2.1, 1.0)));
    }

    #[test]
    fn test_intersects_and_enlarged() {
        let a = Box2::new(Vec2::ZERO, Vec2::splat(1.0));
        let b = Box2::new(Vec2::splat(1.5), Vec2::splat(2.0));
        assert!(!a.intersects(&b));
        assert!(a.enlarged(0.5).intersects(&b));
        assert!(b.intersects(&a.enlarged(0.5)));
    }
}
