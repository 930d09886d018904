//! Transform hierarchy operations.
//!
//! A [`Transform`] only stores local data and raw links. Everything that
//! has to look at more than one transform lives here, on the
//! [`EntityManager`]:
//!
//! - world matrices, composed as grid placement × root local × … × leaf
//!   local, and their inverses,
//! - attaching and detaching parents while preserving world position,
//! - world-space setters, which re-home root entities to the grid under
//!   their new position,
//! - applying replicated transform states.
//!
//! A parented entity's grid is always its root's grid; grid changes are
//! pushed down the subtree.

use sim_component::EntityUid;
use sim_math::matrix::{transform_point, translation_of};
use sim_math::{Angle, GridCoordinates, GridId, Mat3, MapCoordinates, Transform, TransformState, Vec2};
use tracing::{trace, warn};

use crate::entity_manager::EntityManager;
use crate::error::{TransformError, WorldError};
use crate::events::EntityEvent;

impl EntityManager {
    // ── Read access ────────────────────────────────────────────────────────

    #[must_use]
    pub fn transform(&self, uid: EntityUid) -> Option<&Transform> {
        self.components.get_component::<Transform>(uid)
    }

    fn require_transform(&self, uid: EntityUid) -> Result<&Transform, TransformError> {
        self.transform(uid).ok_or(TransformError::MissingTransform(uid))
    }

    fn transform_mut(&mut self, uid: EntityUid) -> Result<&mut Transform, TransformError> {
        self.components
            .get_component_mut::<Transform>(uid)
            .ok_or(TransformError::MissingTransform(uid))
    }

    #[must_use]
    pub fn parent_of(&self, uid: EntityUid) -> Option<EntityUid> {
        self.transform(uid).and_then(Transform::parent)
    }

    /// Direct children of `uid`.
    #[must_use]
    pub fn children_of(&self, uid: EntityUid) -> Vec<EntityUid> {
        self.transform(uid).map(|t| t.children().to_vec()).unwrap_or_default()
    }

    /// `uid` followed by its ancestors, root last.
    fn ancestry(&self, uid: EntityUid) -> Result<Vec<EntityUid>, TransformError> {
        let mut chain = vec![uid];
        let mut current = self.require_transform(uid)?.parent();
        while let Some(parent) = current {
            if chain.contains(&parent) {
                warn!(%uid, %parent, "transform hierarchy contains a loop");
                break;
            }
            chain.push(parent);
            current = self.parent_of(parent);
        }
        Ok(chain)
    }

    /// The root of `uid`'s hierarchy; `uid` itself when unparented.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn map_transform(&self, uid: EntityUid) -> Result<EntityUid, TransformError> {
        let chain = self.ancestry(uid)?;
        Ok(chain.last().copied().unwrap_or(uid))
    }

    /// Returns `true` if `container` is a strict ancestor of `uid`.
    #[must_use]
    pub fn contains_entity(&self, container: EntityUid, uid: EntityUid) -> bool {
        let mut current = self.parent_of(uid);
        let mut depth = 0;
        while let Some(parent) = current {
            if parent == container {
                return true;
            }
            depth += 1;
            if depth > self.entities.len() {
                return false;
            }
            current = self.parent_of(parent);
        }
        false
    }

    /// Local-to-world matrix of `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn world_matrix(&self, uid: EntityUid) -> Result<Mat3, TransformError> {
        let chain = self.ancestry(uid)?;
        let mut matrix = self.maps.grid_matrix(self.root_grid(&chain));
        for link in chain.iter().rev() {
            if let Some(transform) = self.transform(*link) {
                matrix *= transform.local_matrix();
            }
        }
        Ok(matrix)
    }

    /// World-to-local matrix of `uid`, built from the cached inverse local
    /// matrices.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn inv_world_matrix(&self, uid: EntityUid) -> Result<Mat3, TransformError> {
        let chain = self.ancestry(uid)?;
        let mut matrix = Mat3::IDENTITY;
        for link in &chain {
            if let Some(transform) = self.transform(*link) {
                matrix *= transform.inv_local_matrix();
            }
        }
        let origin = self.maps.grid_origin(self.root_grid(&chain));
        Ok(matrix * Mat3::from_translation(-origin))
    }

    fn root_grid(&self, chain: &[EntityUid]) -> GridId {
        chain
            .last()
            .and_then(|root| self.transform(*root))
            .map_or(GridId::NULLSPACE, Transform::grid_id)
    }

    /// Position of `uid` in its map.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn world_position(&self, uid: EntityUid) -> Result<Vec2, TransformError> {
        self.world_matrix(uid).map(|m| translation_of(&m))
    }

    /// Rotation of `uid` in its map: the sum of the local rotations up the
    /// chain.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn world_rotation(&self, uid: EntityUid) -> Result<Angle, TransformError> {
        let chain = self.ancestry(uid)?;
        Ok(chain
            .iter()
            .filter_map(|link| self.transform(*link))
            .fold(Angle::ZERO, |total, t| total + t.local_rotation()))
    }

    /// Position of `uid` relative to its grid's origin.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn grid_position(&self, uid: EntityUid) -> Result<GridCoordinates, TransformError> {
        let grid = self.require_transform(uid)?.grid_id();
        let world = self.world_position(uid)?;
        Ok(GridCoordinates::new(grid, world - self.maps.grid_origin(grid)))
    }

    /// Map and position of `uid` in that map.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn map_position(&self, uid: EntityUid) -> Result<MapCoordinates, TransformError> {
        let grid = self.require_transform(uid)?.grid_id();
        Ok(MapCoordinates::new(self.maps.map_of(grid), self.world_position(uid)?))
    }

    // ── Parenting ──────────────────────────────────────────────────────────

    /// Attach `child` to `parent`, keeping `child`'s world position. The
    /// child and its subtree take on the parent's grid. Local rotation is
    /// kept as is.
    ///
    /// # Errors
    ///
    /// Rejects self-parenting, cycles, and entities without transforms.
    pub fn attach_parent(&mut self, child: EntityUid, parent: EntityUid) -> Result<(), WorldError> {
        if child == parent {
            return Err(TransformError::SelfParent(child).into());
        }
        let old_parent = self.require_transform(child)?.parent();
        if self.ancestry(parent)?.contains(&child) {
            return Err(TransformError::Cycle { child, parent }.into());
        }
        if old_parent == Some(parent) {
            return Ok(());
        }

        let world = self.world_position(child)?;
        let inv_parent = self.inv_world_matrix(parent)?;
        let parent_grid = self.require_transform(parent)?.grid_id();

        if let Some(old) = old_parent
            && let Ok(old_transform) = self.transform_mut(old)
        {
            old_transform.remove_child(child);
        }
        self.transform_mut(parent)?.add_child(child);
        let transform = self.transform_mut(child)?;
        transform.set_parent(Some(parent));
        transform.set_local_position(transform_point(&inv_parent, world));
        self.set_subtree_grid(child, parent_grid);

        self.dirty_component::<Transform>(child);
        self.events.push(EntityEvent::ParentChanged {
            uid: child,
            old: old_parent,
            new: Some(parent),
        });
        trace!(%child, %parent, "attached parent");
        Ok(())
    }

    /// Detach `uid` from its parent, keeping its world position. Its local
    /// position becomes relative to its grid origin. No-op for roots.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn detach_parent(&mut self, uid: EntityUid) -> Result<(), WorldError> {
        let Some(parent) = self.require_transform(uid)?.parent() else {
            return Ok(());
        };
        let coordinates = self.grid_position(uid)?;

        if let Ok(parent_transform) = self.transform_mut(parent) {
            parent_transform.remove_child(uid);
        }
        let transform = self.transform_mut(uid)?;
        transform.set_parent(None);
        transform.set_local_position(coordinates.position);

        self.dirty_component::<Transform>(uid);
        self.events.push(EntityEvent::ParentChanged {
            uid,
            old: Some(parent),
            new: None,
        });
        trace!(%uid, %parent, "detached parent");
        Ok(())
    }

    /// Cut every hierarchy link of an entity about to be deleted: detach it
    /// from its parent and send its children to nullspace.
    pub(crate) fn release_hierarchy(&mut self, uid: EntityUid) -> Result<(), WorldError> {
        if self.transform(uid).is_none() {
            return Ok(());
        }
        self.detach_parent(uid)?;
        for child in self.children_of(uid) {
            self.detach_parent(child)?;
            let transform = self.transform_mut(child)?;
            transform.set_local_position(Vec2::ZERO);
            self.set_subtree_grid(child, GridId::NULLSPACE);
            self.dirty_component::<Transform>(child);
        }
        Ok(())
    }

    fn set_subtree_grid(&mut self, uid: EntityUid, grid: GridId) {
        let mut pending = vec![uid];
        while let Some(next) = pending.pop() {
            if let Ok(transform) = self.transform_mut(next) {
                if transform.grid_id() != grid {
                    transform.set_grid_id(grid);
                }
                pending.extend_from_slice(transform.children());
            }
        }
    }

    // ── Setters ────────────────────────────────────────────────────────────

    fn is_small_move(&self, from: Vec2, to: Vec2) -> bool {
        (to - from).length_squared() < self.move_threshold
    }

    fn moved(&mut self, uid: EntityUid, old: GridCoordinates) -> Result<(), TransformError> {
        let new = self.grid_position(uid)?;
        self.dirty_component::<Transform>(uid);
        self.events.push(EntityEvent::Moved { uid, old, new });
        Ok(())
    }

    /// Set the position relative to the parent (or grid origin for roots).
    /// Returns `false` if the change is below the move threshold.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn set_local_position(&mut self, uid: EntityUid, position: Vec2) -> Result<bool, WorldError> {
        let current = self.require_transform(uid)?.local_position();
        if self.is_small_move(current, position) {
            return Ok(false);
        }
        let old = self.grid_position(uid)?;
        self.transform_mut(uid)?.set_local_position(position);
        self.moved(uid, old)?;
        Ok(true)
    }

    /// Set the rotation relative to the parent. Returns `false` if unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn set_local_rotation(&mut self, uid: EntityUid, rotation: Angle) -> Result<bool, WorldError> {
        let transform = self.transform_mut(uid)?;
        if transform.local_rotation() == rotation {
            return Ok(false);
        }
        let old = transform.set_local_rotation(rotation);
        self.dirty_component::<Transform>(uid);
        self.events.push(EntityEvent::Rotated { uid, old, new: rotation });
        Ok(true)
    }

    /// Set the rotation in map space by adjusting the local rotation.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn set_world_rotation(&mut self, uid: EntityUid, rotation: Angle) -> Result<bool, WorldError> {
        let delta = rotation - self.world_rotation(uid)?;
        let local = self.require_transform(uid)?.local_rotation() + delta;
        self.set_local_rotation(uid, local)
    }

    /// Move `uid` to `position` in its map. A root entity is re-homed to
    /// the grid under the new position. Returns `false` if the change is
    /// below the move threshold.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` or its parent
    /// has no transform.
    pub fn set_world_position(&mut self, uid: EntityUid, position: Vec2) -> Result<bool, WorldError> {
        let current = self.world_position(uid)?;
        if self.is_small_move(current, position) {
            return Ok(false);
        }
        let old = self.grid_position(uid)?;

        match self.parent_of(uid) {
            Some(parent) => {
                let local = transform_point(&self.inv_world_matrix(parent)?, position);
                self.transform_mut(uid)?.set_local_position(local);
            }
            None => {
                let map = self.maps.map_of(old.grid_id);
                let grid = if map.is_nullspace() {
                    old.grid_id
                } else {
                    self.maps.find_grid_at(MapCoordinates::new(map, position))
                };
                let local = position - self.maps.grid_origin(grid);
                self.transform_mut(uid)?.set_local_position(local);
                self.set_subtree_grid(uid, grid);
            }
        }

        self.moved(uid, old)?;
        Ok(true)
    }

    /// Place `uid` at a grid position. For a parented entity the grid must
    /// be the one it already inherits.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::GridOnParented`] when a parented entity is
    /// asked to change grid.
    pub fn set_grid_position(&mut self, uid: EntityUid, coordinates: GridCoordinates) -> Result<bool, WorldError> {
        let transform = self.require_transform(uid)?;
        let current_grid = transform.grid_id();
        let parent = transform.parent();
        if parent.is_some() && coordinates.grid_id != current_grid {
            return Err(TransformError::GridOnParented(uid).into());
        }
        let old = self.grid_position(uid)?;
        if coordinates.grid_id == old.grid_id && self.is_small_move(old.position, coordinates.position) {
            return Ok(false);
        }

        match parent {
            Some(parent) => {
                let world = coordinates.position + self.maps.grid_origin(coordinates.grid_id);
                let local = transform_point(&self.inv_world_matrix(parent)?, world);
                self.transform_mut(uid)?.set_local_position(local);
            }
            None => {
                self.transform_mut(uid)?.set_local_position(coordinates.position);
                self.set_subtree_grid(uid, coordinates.grid_id);
            }
        }

        self.moved(uid, old)?;
        Ok(true)
    }

    /// Move a root entity and its subtree to another grid, keeping its
    /// grid-relative position.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::GridOnParented`] for parented entities.
    pub fn set_grid_id(&mut self, uid: EntityUid, grid: GridId) -> Result<(), WorldError> {
        let transform = self.require_transform(uid)?;
        if transform.parent().is_some() {
            return Err(TransformError::GridOnParented(uid).into());
        }
        if transform.grid_id() == grid {
            return Ok(());
        }
        let old = self.grid_position(uid)?;
        self.set_subtree_grid(uid, grid);
        self.moved(uid, old)?;
        Ok(())
    }

    // ── Replication ────────────────────────────────────────────────────────

    /// Apply a received transform state: relink the parent if it changed,
    /// then take position, rotation and grid with a single matrix rebuild.
    /// The state's position is already relative to its parent, so relinking
    /// does not preserve world position. Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::MissingTransform`] if `uid` has no transform.
    pub fn apply_transform_state(&mut self, uid: EntityUid, state: &TransformState) -> Result<bool, WorldError> {
        let current_parent = self.require_transform(uid)?.parent();
        let wanted_parent = state.parent.filter(|p| p.is_valid());
        let mut changed = false;
        let old = self.grid_position(uid)?;

        if current_parent != wanted_parent {
            self.relink_parent(uid, current_parent, wanted_parent);
            changed = true;
        }

        let is_root = self.parent_of(uid).is_none();
        let grid_changed = is_root && self.require_transform(uid)?.grid_id() != state.grid_id;
        let old_rotation = self.require_transform(uid)?.local_rotation();
        let threshold = self.move_threshold;
        let (moved, rotated) = self.transform_mut(uid)?.apply_local_state(state, threshold);
        if grid_changed {
            self.set_subtree_grid(uid, state.grid_id);
        }

        if rotated {
            self.events.push(EntityEvent::Rotated {
                uid,
                old: old_rotation,
                new: state.rotation,
            });
        }
        if moved || grid_changed || changed {
            let new = self.grid_position(uid)?;
            if new != old {
                self.events.push(EntityEvent::Moved { uid, old, new });
            }
        }
        Ok(changed || moved || rotated || grid_changed)
    }

    fn relink_parent(&mut self, uid: EntityUid, old: Option<EntityUid>, new: Option<EntityUid>) {
        if let Some(old) = old
            && let Ok(old_transform) = self.transform_mut(old)
        {
            old_transform.remove_child(uid);
        }

        let linkable = new.filter(|parent| {
            let known = self.transform(*parent).is_some();
            let acyclic = *parent != uid && !self.contains_entity(uid, *parent);
            if !known || !acyclic {
                warn!(%uid, %parent, known, acyclic, "ignoring replicated parent");
            }
            known && acyclic
        });

        match linkable {
            Some(parent) => {
                let grid = self.transform(parent).map_or(GridId::NULLSPACE, Transform::grid_id);
                if let Ok(parent_transform) = self.transform_mut(parent) {
                    parent_transform.add_child(uid);
                }
                if let Ok(transform) = self.transform_mut(uid) {
                    transform.set_parent(Some(parent));
                }
                self.set_subtree_grid(uid, grid);
            }
            None => {
                if let Ok(transform) = self.transform_mut(uid) {
                    transform.set_parent(None);
                }
            }
        }
        self.events.push(EntityEvent::ParentChanged { uid, old, new: linkable });
    }
}
