//! Built-in components besides [`Transform`](sim_math::Transform).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sim_component::{
    Component, ComponentError, ComponentFactory, ComponentKind, ComponentState, EntityUid, FieldMap, NetId,
};
use sim_math::{Transform, Vec2};

/// Network id of [`Physics`].
pub const PHYSICS_NET_ID: NetId = 2;

/// Replicated snapshot of [`Physics`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsState {
    pub mass: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
}

/// Velocity integration data, driven by
/// [`PhysicsSystem`](crate::systems::PhysicsSystem).
#[derive(Debug, Clone)]
pub struct Physics {
    owner: EntityUid,
    pub mass: f32,
    /// Units per second.
    pub linear_velocity: Vec2,
    /// Radians per second.
    pub angular_velocity: f32,
}

impl Physics {
    #[must_use]
    pub fn new(owner: EntityUid) -> Self {
        Self {
            owner,
            mass: 1.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
        }
    }

    /// A physics component moving at `velocity`.
    #[must_use]
    pub fn moving(owner: EntityUid, velocity: Vec2) -> Self {
        Self {
            linear_velocity: velocity,
            ..Self::new(owner)
        }
    }

    #[must_use]
    pub fn state(&self) -> PhysicsState {
        PhysicsState {
            mass: self.mass,
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
        }
    }
}

impl Default for Physics {
    fn default() -> Self {
        Self::new(EntityUid::INVALID)
    }
}

impl Component for Physics {
    fn owner(&self) -> EntityUid {
        self.owner
    }

    fn set_owner(&mut self, owner: EntityUid) {
        self.owner = owner;
    }

    fn get_component_state(&self) -> Result<Option<ComponentState>, ComponentError> {
        ComponentState::encode(PHYSICS_NET_ID, &self.state()).map(Some)
    }

    fn handle_component_state(&mut self, state: &ComponentState) -> Result<(), ComponentError> {
        let state: PhysicsState = state.decode(PHYSICS_NET_ID)?;
        self.mass = state.mass;
        self.linear_velocity = state.linear_velocity;
        self.angular_velocity = state.angular_velocity;
        Ok(())
    }

    fn expose_data(&mut self, fields: &FieldMap) -> Result<(), ComponentError> {
        let invalid = |field: &str, e: serde_json::Error| ComponentError::InvalidField {
            component: Self::NAME,
            field: field.to_string(),
            message: e.to_string(),
        };
        if let Some(value) = fields.get("mass") {
            self.mass = serde_json::from_value(value.clone()).map_err(|e| invalid("mass", e))?;
        }
        if let Some(value) = fields.get("vel") {
            self.linear_velocity = serde_json::from_value(value.clone()).map_err(|e| invalid("vel", e))?;
        }
        if let Some(value) = fields.get("angular") {
            self.angular_velocity = serde_json::from_value(value.clone()).map_err(|e| invalid("angular", e))?;
        }
        Ok(())
    }
}

impl ComponentKind for Physics {
    const NAME: &'static str = "Physics";
    const NET_ID: Option<NetId> = Some(PHYSICS_NET_ID);
}

/// A factory with every built-in component registered.
///
/// # Errors
///
/// Only fails if the built-ins clash, which is a programming error.
pub fn builtin_factory() -> Result<ComponentFactory, ComponentError> {
    let mut factory = ComponentFactory::new();
    factory.register::<Transform>()?;
    factory.register::<Physics>()?;
    Ok(factory)
}

/// [`builtin_factory`] behind an [`Arc`], ready for an entity manager.
///
/// # Errors
///
/// See [`builtin_factory`].
pub fn shared_builtin_factory() -> Result<Arc<ComponentFactory>, ComponentError> {
    builtin_factory().map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_factory() {
        let factory = builtin_factory().unwrap();
        assert_eq!(factory.name_for_net_id(1), Some("Transform"));
        assert_eq!(factory.name_for_net_id(PHYSICS_NET_ID), Some("Physics"));
    }

    #[test]
    fn test_physics_state_roundtrip() {
        let mut source = Physics::moving(EntityUid(1), Vec2::new(1.0, -2.0));
        source.angular_velocity = 0.5;
        let state = source.get_component_state().unwrap().unwrap();

        let mut replica = Physics::new(EntityUid(1));
        replica.handle_component_state(&state).unwrap();
        assert_eq!(replica.state(), source.state());
    }

    #[test]
    fn test_physics_expose_data() {
        let mut physics = Physics::default();
        let fields: FieldMap = serde_json::from_str(r#"{ "mass": 4.0, "vel": [1.0, 0.0] }"#).unwrap();
        physics.expose_data(&fields).unwrap();
        assert_eq!(physics.mass, 4.0);
        assert_eq!(physics.linear_velocity, Vec2::X);

        let bad: FieldMap = serde_json::from_str(r#"{ "mass": "heavy" }"#).unwrap();
        assert!(matches!(physics.expose_data(&bad), Err(ComponentError::InvalidField { .. })));
    }
}
