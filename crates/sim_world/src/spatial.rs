//! Spatial entity queries and checked spawning.
//!
//! Entities have no extent, so every query tests the world position of
//! each live entity against a point, box, circle or arc in one map. Results
//! are ordered by uid.

use std::f64::consts::{PI, TAU};

use sim_component::EntityUid;
use sim_math::{Angle, Box2, GridCoordinates, MapCoordinates, MapId, Vec2};
use tracing::debug;

use crate::entity_manager::EntityManager;
use crate::error::WorldError;

/// Distance within which two positions count as the same point.
pub const POSITION_TOLERANCE: f32 = 1.0e-3;

impl EntityManager {
    fn entities_matching(&self, map: MapId, mut keep: impl FnMut(Vec2) -> bool) -> Vec<EntityUid> {
        self.entities
            .values()
            .filter(|entity| !entity.is_deleted())
            .filter_map(|entity| {
                let coordinates = self.map_position(entity.uid()).ok()?;
                (coordinates.map_id == map && keep(coordinates.position)).then_some(entity.uid())
            })
            .collect()
    }

    /// Entities standing on `coordinates`, within [`POSITION_TOLERANCE`].
    #[must_use]
    pub fn get_entities_at(&self, coordinates: MapCoordinates) -> Vec<EntityUid> {
        self.entities_matching(coordinates.map_id, |position| {
            position.distance(coordinates.position) <= POSITION_TOLERANCE
        })
    }

    /// Entities of `map` inside `area`, edges included.
    #[must_use]
    pub fn get_entities_intersecting(&self, map: MapId, area: Box2) -> Vec<EntityUid> {
        self.entities_matching(map, |position| area.contains(position))
    }

    /// Entities no further than `range` from `coordinates`.
    #[must_use]
    pub fn get_entities_in_range(&self, coordinates: MapCoordinates, range: f32) -> Vec<EntityUid> {
        self.entities_matching(coordinates.map_id, |position| {
            position.distance_squared(coordinates.position) <= range * range
        })
    }

    /// Entities no further than `range` from `uid`, `uid` included.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`](crate::TransformError::MissingTransform)
    /// if `uid` has no transform.
    pub fn get_entities_in_range_of(&self, uid: EntityUid, range: f32) -> Result<Vec<EntityUid>, WorldError> {
        let coordinates = self.map_position(uid)?;
        Ok(self.get_entities_in_range(coordinates, range))
    }

    /// Entities within `range` of `coordinates` whose bearing lies strictly
    /// inside `arc_width` centred on `direction`. Entities exactly on the
    /// origin have no bearing and are left out.
    #[must_use]
    pub fn get_entities_in_arc(
        &self,
        coordinates: MapCoordinates,
        range: f32,
        direction: Angle,
        arc_width: Angle,
    ) -> Vec<EntityUid> {
        let half_width = arc_width.theta.abs() / 2.0;
        self.entities_matching(coordinates.map_id, |position| {
            let offset = position - coordinates.position;
            if offset.length_squared() > range * range || offset.length() <= POSITION_TOLERANCE {
                return false;
            }
            let bearing = Angle::new(f64::from(offset.y.atan2(offset.x)));
            let mut delta = (bearing - direction).reduced().theta;
            if delta > PI {
                delta -= TAU;
            }
            delta.abs() < half_width
        })
    }

    /// Whether `prototype` may be spawned at `coordinates`. Off the snap
    /// lattice of the grid anything goes; on a snap center or corner no
    /// entity already there may share one of the prototype's snap flags.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownGrid`] for grids that do not exist.
    pub fn can_spawn_at(&self, prototype: &str, coordinates: GridCoordinates) -> Result<bool, WorldError> {
        if coordinates.grid_id.is_nullspace() {
            return Ok(true);
        }
        let grid = self
            .maps()
            .grid(coordinates.grid_id)
            .ok_or(WorldError::UnknownGrid(coordinates.grid_id))?;
        let local = coordinates.position;
        if !grid.on_snap_center(local) && !grid.on_snap_border(local) {
            return Ok(true);
        }

        let flags = self.prototypes().snap_flags(prototype);
        if flags.is_empty() {
            return Ok(true);
        }
        let here = MapCoordinates::new(grid.map_id(), grid.local_to_world(local));
        let blocked = self.get_entities_at(here).into_iter().any(|uid| {
            self.entity(uid)
                .and_then(|entity| entity.prototype())
                .is_some_and(|other| self.prototypes().snap_flags(other).iter().any(|f| flags.contains(f)))
        });
        Ok(!blocked)
    }

    /// [`EntityManager::spawn_entity_at`] if [`EntityManager::can_spawn_at`]
    /// allows it. Returns `Ok(None)` when the spot is taken.
    ///
    /// # Errors
    ///
    /// Same as [`EntityManager::spawn_entity_at`].
    pub fn try_spawn_entity_at(
        &mut self,
        prototype: &str,
        coordinates: GridCoordinates,
    ) -> Result<Option<EntityUid>, WorldError> {
        if !self.can_spawn_at(prototype, coordinates)? {
            debug!(prototype, grid = %coordinates.grid_id, "spawn point blocked");
            return Ok(None);
        }
        self.spawn_entity_at(prototype, coordinates).map(Some)
    }

    /// [`EntityManager::try_spawn_entity_at`] on the grid under a map
    /// position.
    ///
    /// # Errors
    ///
    /// Same as [`EntityManager::spawn_entity_at`].
    pub fn try_spawn_entity_at_map(
        &mut self,
        prototype: &str,
        coordinates: MapCoordinates,
    ) -> Result<Option<EntityUid>, WorldError> {
        let grid = self.maps().find_grid_at(coordinates);
        let local = coordinates.position - self.maps().grid_origin(grid);
        self.try_spawn_entity_at(prototype, GridCoordinates::new(grid, local))
    }
}
