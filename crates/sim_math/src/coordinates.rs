//! Map and grid identifiers and the coordinates expressed against them.
//!
//! A map is a disjoint world space. A grid is a tile-based region placed
//! inside a map. Positions are most often stored relative to a grid origin;
//! [`MapCoordinates`] are absolute within one map.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifies a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapId(pub u32);

impl MapId {
    /// The map entities live on before they are placed anywhere.
    pub const NULLSPACE: MapId = MapId(0);

    /// Returns `true` for [`MapId::NULLSPACE`].
    #[must_use]
    pub const fn is_nullspace(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MapId({})", self.0)
    }
}

/// Identifies a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridId(pub u32);

impl GridId {
    /// The grid of [`MapId::NULLSPACE`]; its origin is the world origin.
    pub const NULLSPACE: GridId = GridId(0);

    /// Returns `true` for [`GridId::NULLSPACE`].
    #[must_use]
    pub const fn is_nullspace(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for GridId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GridId({})", self.0)
    }
}

/// A position relative to a grid origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GridCoordinates {
    /// The grid the position is relative to.
    pub grid_id: GridId,
    /// Offset from the grid origin.
    pub position: Vec2,
}

impl GridCoordinates {
    /// Create grid coordinates.
    #[must_use]
    pub const fn new(grid_id: GridId, position: Vec2) -> Self {
        Self { grid_id, position }
    }

    /// The same grid, shifted by `offset`.
    #[must_use]
    pub fn offset(self, offset: Vec2) -> Self {
        Self::new(self.grid_id, self.position + offset)
    }
}

/// An absolute position within one map.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MapCoordinates {
    /// The map the position lies in.
    pub map_id: MapId,
    /// Position within the map.
    pub position: Vec2,
}

impl MapCoordinates {
    /// Create map coordinates.
    #[must_use]
    pub const fn new(map_id: MapId, position: Vec2) -> Self {
        Self { map_id, position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullspace_defaults() {
        assert!(GridId::default().is_nullspace());
        assert!(MapId::default().is_nullspace());
        assert!(!GridId(3).is_nullspace());
    }

    #[test]
    fn test_grid_coordinates_offset() {
        let c = GridCoordinates::new(GridId(2), Vec2::new(1.0, 1.0)).offset(Vec2::new(0.5, -1.0));
        assert_eq!(c.grid_id, GridId(2));
        assert_eq!(c.position, Vec2::new(1.5, 0.0));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let bytes = rmp_serde::to_vec(&GridId(7)).unwrap();
        let raw: u32 = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(raw, 7);
    }
}
