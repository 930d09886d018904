//! Entity systems.
//!
//! A system declares an [`EntityQuery`] once; every tick the
//! [`EntitySystemManager`] evaluates the query and hands the matching uids
//! to the system's [`EntitySystem::update`]. A failing system is logged and
//! skipped; the others still run.

use std::f64::consts::TAU;

use sim_component::{EntityQuery, EntityUid};
use sim_math::{Angle, Vec2};
use tracing::{debug, error, info};

use crate::components::Physics;
use crate::entity_manager::EntityManager;
use crate::error::WorldError;

/// Per-tick logic over a declared set of entities.
pub trait EntitySystem: Send + std::fmt::Debug {
    /// Human-readable name used in logs.
    fn name(&self) -> &'static str;

    /// Which entities [`EntitySystem::update`] is handed.
    fn query(&self) -> EntityQuery;

    /// Called once before the first update.
    fn initialize(&mut self, _entities: &mut EntityManager) -> Result<(), WorldError> {
        Ok(())
    }

    /// Run one step over `matched`, a snapshot taken before the call.
    /// Entities deleted mid-update may still be listed.
    fn update(&mut self, entities: &mut EntityManager, matched: &[EntityUid], frame_time: f32)
    -> Result<(), WorldError>;

    /// Called once when the manager shuts down.
    fn shutdown(&mut self) {}
}

/// Ordered set of systems.
#[derive(Debug, Default)]
pub struct EntitySystemManager {
    systems: Vec<Box<dyn EntitySystem>>,
    initialized: bool,
}

impl EntitySystemManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            initialized: false,
        }
    }

    /// Add a system. Systems run in registration order.
    pub fn register<S: EntitySystem + 'static>(&mut self, system: S) {
        debug!(system = system.name(), "registered system");
        self.systems.push(Box::new(system));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Initialize every system once.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first initialization failure.
    pub fn initialize(&mut self, entities: &mut EntityManager) -> Result<(), WorldError> {
        if self.initialized {
            return Ok(());
        }
        for system in &mut self.systems {
            system.initialize(entities)?;
        }
        self.initialized = true;
        info!(systems = self.systems.len(), "systems initialized");
        Ok(())
    }

    /// Run every system once.
    pub fn update(&mut self, entities: &mut EntityManager, frame_time: f32) {
        for system in &mut self.systems {
            let matched = match entities.get_entities(&system.query()) {
                Ok(matched) => matched,
                Err(e) => {
                    error!(system = system.name(), error = %e, "system query failed");
                    continue;
                }
            };
            if let Err(e) = system.update(entities, &matched, frame_time) {
                error!(system = system.name(), error = %e, "system update failed");
            }
        }
    }

    pub fn shutdown(&mut self) {
        for system in &mut self.systems {
            system.shutdown();
        }
        self.initialized = false;
    }
}

// ── Physics ────────────────────────────────────────────────────────────────

/// Velocities below this are treated as zero.
///
/// Positions are written through [`EntityManager::set_world_position`],
/// which drops moves shorter than the square root of the manager's move
/// threshold (about 0.0316 with [`DEFAULT_MOVE_THRESHOLD`]). At 60 ticks
/// per second a body slower than about 1.9 units/s is therefore never
/// moved, even though its velocity is well above this epsilon.
///
/// [`DEFAULT_MOVE_THRESHOLD`]: crate::entity_manager::DEFAULT_MOVE_THRESHOLD
pub const PHYSICS_EPSILON: f32 = 1.0e-6;

/// Fraction of velocity lost per second.
pub const GLOBAL_FRICTION: f32 = 0.01;

/// Integrates [`Physics`] velocities into transforms.
#[derive(Debug, Default)]
pub struct PhysicsSystem;

impl PhysicsSystem {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn step(entities: &mut EntityManager, uid: EntityUid, frame_time: f32) -> Result<(), WorldError> {
        let Some(physics) = entities.components().get_component::<Physics>(uid) else {
            return Ok(());
        };
        let angular = physics.angular_velocity;
        let mut velocity = physics.linear_velocity;

        if angular.abs() > PHYSICS_EPSILON {
            let rotation = entities.world_rotation(uid)? + Angle::new(f64::from(angular * frame_time));
            entities.set_world_rotation(uid, Angle::new(rotation.theta.rem_euclid(TAU)))?;
        }

        if velocity.length_squared() > PHYSICS_EPSILON {
            velocity -= velocity * (frame_time * GLOBAL_FRICTION);
        } else {
            velocity = Vec2::ZERO;
        }

        let movement = velocity * frame_time;
        if movement != Vec2::ZERO {
            let position = entities.world_position(uid)? + movement;
            entities.set_world_position(uid, position)?;
        }

        if let Some(physics) = entities.components_mut().get_component_mut::<Physics>(uid)
            && physics.linear_velocity != velocity
        {
            physics.linear_velocity = velocity;
            entities.dirty_component::<Physics>(uid);
        }
        Ok(())
    }
}

impl EntitySystem for PhysicsSystem {
    fn name(&self) -> &'static str {
        "physics"
    }

    fn query(&self) -> EntityQuery {
        EntityQuery::of::<Physics>()
    }

    fn update(&mut self, entities: &mut EntityManager, matched: &[EntityUid], frame_time: f32) -> Result<(), WorldError> {
        for uid in matched {
            if entities.entity_exists(*uid) {
                Self::step(entities, *uid, frame_time)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::components::shared_builtin_factory;
    use crate::prototype::PrototypeIndex;
    use sim_component::ComponentTypeId;
    use sim_math::GridCoordinates;

    fn manager() -> EntityManager {
        EntityManager::new(shared_builtin_factory().unwrap(), Arc::new(PrototypeIndex::new()))
    }

    fn moving_entity(em: &mut EntityManager, velocity: Vec2) -> EntityUid {
        let uid = em.create_entity(None).unwrap();
        em.components_mut()
            .add_component(uid, Physics::moving(uid, velocity), false)
            .unwrap();
        uid
    }

    #[test]
    fn test_physics_moves_and_slows() {
        let mut em = manager();
        let uid = moving_entity(&mut em, Vec2::new(10.0, 0.0));
        let mut systems = EntitySystemManager::new();
        systems.register(PhysicsSystem::new());
        systems.initialize(&mut em).unwrap();

        em.update(&mut systems, 1.0);

        let velocity = em.components().get_component::<Physics>(uid).unwrap().linear_velocity;
        assert!((velocity.x - 9.9).abs() < 1.0e-5);
        let position = em.world_position(uid).unwrap();
        assert!((position.x - 9.9).abs() < 1.0e-4);
        assert_eq!(em.entity(uid).unwrap().last_modified_tick(), 1);
    }

    #[test]
    fn test_physics_stops_tiny_velocity() {
        let mut em = manager();
        let uid = moving_entity(&mut em, Vec2::new(1.0e-4, 0.0));
        let mut systems = EntitySystemManager::new();
        systems.register(PhysicsSystem::new());

        em.update(&mut systems, 1.0);

        assert_eq!(em.components().get_component::<Physics>(uid).unwrap().linear_velocity, Vec2::ZERO);
        assert_eq!(em.world_position(uid).unwrap(), Vec2::ZERO);
    }

    #[test]
    fn test_slow_bodies_stay_below_move_threshold() {
        let mut em = manager();
        let slow = moving_entity(&mut em, Vec2::new(1.0, 0.0));
        let fast = moving_entity(&mut em, Vec2::new(5.0, 0.0));
        let mut systems = EntitySystemManager::new();
        systems.register(PhysicsSystem::new());

        for _ in 0..60 {
            em.update(&mut systems, 1.0 / 60.0);
        }

        assert_eq!(em.world_position(slow).unwrap(), Vec2::ZERO);
        assert!(em.components().get_component::<Physics>(slow).unwrap().linear_velocity.x > 0.9);
        assert!(em.world_position(fast).unwrap().x > 4.9);
    }

    #[test]
    fn test_physics_spins() {
        let mut em = manager();
        let uid = moving_entity(&mut em, Vec2::ZERO);
        em.components_mut().get_component_mut::<Physics>(uid).unwrap().angular_velocity = 1.0;
        let mut systems = EntitySystemManager::new();
        systems.register(PhysicsSystem::new());

        em.update(&mut systems, 0.5);
        assert!(em.world_rotation(uid).unwrap().equals_approx(Angle::new(0.5), 1.0e-6));
    }

    #[derive(Debug)]
    struct Failing;

    impl EntitySystem for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn query(&self) -> EntityQuery {
            EntityQuery::all()
        }

        fn update(&mut self, _: &mut EntityManager, _: &[EntityUid], _: f32) -> Result<(), WorldError> {
            Err(WorldError::UnknownEntity(EntityUid(99)))
        }
    }

    #[derive(Debug)]
    struct Unregistered;

    impl EntitySystem for Unregistered {
        fn name(&self) -> &'static str {
            "unregistered"
        }

        fn query(&self) -> EntityQuery {
            EntityQuery::of_role(ComponentTypeId::from_name("Sprite"))
        }

        fn update(&mut self, _: &mut EntityManager, _: &[EntityUid], _: f32) -> Result<(), WorldError> {
            Ok(())
        }
    }

    #[test]
    fn test_failing_systems_do_not_stop_others() {
        let mut em = manager();
        let uid = moving_entity(&mut em, Vec2::new(2.0, 0.0));
        em.set_grid_position(uid, GridCoordinates::default()).unwrap();
        let mut systems = EntitySystemManager::new();
        systems.register(Failing);
        systems.register(Unregistered);
        systems.register(PhysicsSystem::new());
        assert_eq!(systems.len(), 3);

        em.update(&mut systems, 1.0);
        assert!(em.world_position(uid).unwrap().x > 1.9);
    }
}
