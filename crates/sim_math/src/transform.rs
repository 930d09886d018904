//! 2D transform component.
//!
//! [`Transform`] stores an entity's position and rotation relative to its
//! parent, or to its grid origin when it has no parent, together with the
//! parent link, the back-references to its children and cached matrices.
//!
//! The component only knows about itself. Operations that need the rest of
//! the hierarchy (world matrices, reparenting, grid propagation) live on the
//! entity manager, which owns every transform.

use glam::{Mat3, Vec2};
use serde::{Deserialize, Serialize};
use sim_component::{
    Component, ComponentError, ComponentKind, ComponentState, EntityUid, FieldMap, NetId,
};

use crate::angle::Angle;
use crate::coordinates::GridId;
use crate::matrix;

/// Network id of [`Transform`].
pub const TRANSFORM_NET_ID: NetId = 1;

/// The replicated snapshot of a [`Transform`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    /// Position relative to the parent, or to the grid origin for roots.
    pub local_position: Vec2,
    /// Grid the entity belongs to.
    pub grid_id: GridId,
    /// Rotation relative to the parent.
    pub rotation: Angle,
    /// Parent entity, if any.
    pub parent: Option<EntityUid>,
}

/// Position, rotation and hierarchy links of one entity.
#[derive(Debug, Clone)]
pub struct Transform {
    owner: EntityUid,
    local_position: Vec2,
    local_rotation: Angle,
    parent: Option<EntityUid>,
    grid_id: GridId,
    children: Vec<EntityUid>,
    local_matrix: Mat3,
    inv_local_matrix: Mat3,
    matrix_revision: u64,
}

impl Transform {
    /// A transform at `position` on `grid_id` with no rotation or parent.
    #[must_use]
    pub fn new(owner: EntityUid, grid_id: GridId, position: Vec2) -> Self {
        let mut transform = Self {
            owner,
            local_position: position,
            local_rotation: Angle::ZERO,
            parent: None,
            grid_id,
            children: Vec::new(),
            local_matrix: Mat3::IDENTITY,
            inv_local_matrix: Mat3::IDENTITY,
            matrix_revision: 0,
        };
        transform.rebuild_matrices();
        transform
    }

    /// Position relative to the parent, or to the grid origin for roots.
    #[must_use]
    pub fn local_position(&self) -> Vec2 {
        self.local_position
    }

    /// Rotation relative to the parent.
    #[must_use]
    pub fn local_rotation(&self) -> Angle {
        self.local_rotation
    }

    /// The parent entity, if any.
    #[must_use]
    pub fn parent(&self) -> Option<EntityUid> {
        self.parent
    }

    /// The grid this entity belongs to. Always the root ancestor's grid.
    #[must_use]
    pub fn grid_id(&self) -> GridId {
        self.grid_id
    }

    /// Child entities, in attach order.
    #[must_use]
    pub fn children(&self) -> &[EntityUid] {
        &self.children
    }

    /// Cached `T × R` matrix.
    #[must_use]
    pub fn local_matrix(&self) -> Mat3 {
        self.local_matrix
    }

    /// Cached `R⁻¹ × T⁻¹` matrix.
    #[must_use]
    pub fn inv_local_matrix(&self) -> Mat3 {
        self.inv_local_matrix
    }

    /// Number of matrix rebuilds so far.
    #[must_use]
    pub fn matrix_revision(&self) -> u64 {
        self.matrix_revision
    }

    /// Recompute both cached matrices from position and rotation.
    pub fn rebuild_matrices(&mut self) {
        self.local_matrix = matrix::local_matrix(self.local_position, self.local_rotation);
        self.inv_local_matrix = matrix::inverse_local_matrix(self.local_position, self.local_rotation);
        self.matrix_revision += 1;
    }

    /// Set the local position and rebuild. Returns the previous value.
    pub fn set_local_position(&mut self, position: Vec2) -> Vec2 {
        let old = self.local_position;
        self.local_position = position;
        self.rebuild_matrices();
        old
    }

    /// Set the local rotation and rebuild. Returns the previous value.
    pub fn set_local_rotation(&mut self, rotation: Angle) -> Angle {
        let old = self.local_rotation;
        self.local_rotation = rotation;
        self.rebuild_matrices();
        old
    }

    /// Replace the parent link. Does not touch either parent's child list.
    pub fn set_parent(&mut self, parent: Option<EntityUid>) {
        self.parent = parent;
    }

    /// Replace the grid id.
    pub fn set_grid_id(&mut self, grid_id: GridId) {
        self.grid_id = grid_id;
    }

    /// Record `child` as attached. Duplicate attaches are ignored.
    pub fn add_child(&mut self, child: EntityUid) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Forget `child`. Returns `false` if it was not attached.
    pub fn remove_child(&mut self, child: EntityUid) -> bool {
        let before = self.children.len();
        self.children.retain(|c| *c != child);
        self.children.len() != before
    }

    /// The current replicated snapshot.
    #[must_use]
    pub fn state(&self) -> TransformState {
        TransformState {
            local_position: self.local_position,
            grid_id: self.grid_id,
            rotation: self.local_rotation,
            parent: self.parent,
        }
    }

    /// Apply position, rotation and grid from `state` with at most one
    /// matrix rebuild. Parent links are the caller's concern.
    ///
    /// Returns `(moved, rotated)`.
    pub fn apply_local_state(&mut self, state: &TransformState, move_threshold: f32) -> (bool, bool) {
        let rotated = self.local_rotation != state.rotation;
        if rotated {
            self.local_rotation = state.rotation;
        }

        let moved = (state.local_position - self.local_position).length_squared() >= move_threshold;
        if moved {
            self.local_position = state.local_position;
        }

        if self.parent.is_none() && self.grid_id != state.grid_id {
            self.grid_id = state.grid_id;
        }

        if moved || rotated {
            self.rebuild_matrices();
        }
        (moved, rotated)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(EntityUid::INVALID, GridId::NULLSPACE, Vec2::ZERO)
    }
}

impl Component for Transform {
    fn owner(&self) -> EntityUid {
        self.owner
    }

    fn set_owner(&mut self, owner: EntityUid) {
        self.owner = owner;
    }

    fn get_component_state(&self) -> Result<Option<ComponentState>, ComponentError> {
        ComponentState::encode(TRANSFORM_NET_ID, &self.state()).map(Some)
    }

    fn handle_component_state(&mut self, state: &ComponentState) -> Result<(), ComponentError> {
        let state: TransformState = state.decode(TRANSFORM_NET_ID)?;
        self.apply_local_state(&state, 0.0);
        Ok(())
    }

    fn expose_data(&mut self, fields: &FieldMap) -> Result<(), ComponentError> {
        let invalid = |field: &str, e: serde_json::Error| ComponentError::InvalidField {
            component: Self::NAME,
            field: field.to_string(),
            message: e.to_string(),
        };

        if let Some(value) = fields.get("pos") {
            self.local_position = serde_json::from_value(value.clone()).map_err(|e| invalid("pos", e))?;
        }
        if let Some(value) = fields.get("rot") {
            self.local_rotation = serde_json::from_value(value.clone()).map_err(|e| invalid("rot", e))?;
        }
        if let Some(value) = fields.get("grid") {
            self.grid_id = serde_json::from_value(value.clone()).map_err(|e| invalid("grid", e))?;
        }
        self.rebuild_matrices();
        Ok(())
    }
}

impl ComponentKind for Transform {
    const NAME: &'static str = "Transform";
    const NET_ID: Option<NetId> = Some(TRANSFORM_NET_ID);
}
