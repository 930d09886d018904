//! The entity manager shared by server and client.
//!
//! [`EntityManager`] owns the entity table, the [`ComponentManager`] and the
//! [`MapManager`], and keeps the three consistent: every entity carries a
//! [`Transform`], deleting an entity tombstones its components, and the
//! current tick is mirrored into both sub-managers so their
//! last-modified ticks line up.
//!
//! Hierarchy operations live in [`crate::hierarchy`]; the replication
//! wrappers in [`crate::server`] and [`crate::client`].

use std::collections::BTreeMap;
use std::sync::Arc;

use sim_component::{
    ComponentError, ComponentFactory, ComponentKind, ComponentManager, ComponentTypeId, EntityAllocator,
    EntityQuery, EntityUid, Tick,
};
use sim_math::{GridCoordinates, GridId, Transform, Vec2};
use tracing::{debug, info, warn};

use crate::entity::Entity;
use crate::error::WorldError;
use crate::events::EntityEvent;
use crate::map_manager::MapManager;
use crate::prototype::PrototypeSource;
use crate::systems::EntitySystemManager;

/// Squared distance below which position changes are ignored. This also
/// bounds the slowest speed physics can move a body at; see
/// [`PHYSICS_EPSILON`](crate::systems::PHYSICS_EPSILON).
pub const DEFAULT_MOVE_THRESHOLD: f32 = 1.0e-3;

/// Entity table plus the component and map stores.
#[derive(Debug)]
pub struct EntityManager {
    pub(crate) components: ComponentManager,
    pub(crate) maps: MapManager,
    pub(crate) entities: BTreeMap<EntityUid, Entity>,
    pub(crate) events: Vec<EntityEvent>,
    pub(crate) move_threshold: f32,
    /// `(tick, uid)` of every deletion, kept only when replicating out.
    pub(crate) deletion_history: Option<Vec<(Tick, EntityUid)>>,
    prototypes: Arc<dyn PrototypeSource>,
    allocator: EntityAllocator,
    current_tick: Tick,
    started: bool,
}

impl EntityManager {
    #[must_use]
    pub fn new(factory: Arc<ComponentFactory>, prototypes: Arc<dyn PrototypeSource>) -> Self {
        Self {
            components: ComponentManager::new(factory),
            maps: MapManager::new(),
            entities: BTreeMap::new(),
            events: Vec::new(),
            move_threshold: DEFAULT_MOVE_THRESHOLD,
            deletion_history: None,
            prototypes,
            allocator: EntityAllocator::new(),
            current_tick: 0,
            started: false,
        }
    }

    /// Use `threshold` as the squared-distance move threshold.
    #[must_use]
    pub fn with_move_threshold(mut self, threshold: f32) -> Self {
        self.move_threshold = threshold.max(0.0);
        self
    }

    #[must_use]
    pub fn move_threshold(&self) -> f32 {
        self.move_threshold
    }

    #[must_use]
    pub fn components(&self) -> &ComponentManager {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentManager {
        &mut self.components
    }

    #[must_use]
    pub fn maps(&self) -> &MapManager {
        &self.maps
    }

    pub fn maps_mut(&mut self) -> &mut MapManager {
        &mut self.maps
    }

    #[must_use]
    pub fn prototypes(&self) -> &Arc<dyn PrototypeSource> {
        &self.prototypes
    }

    // ── Ticks ──────────────────────────────────────────────────────────────

    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Advance to the next tick and return it.
    pub fn tick(&mut self) -> Tick {
        self.set_current_tick(self.current_tick + 1);
        self.current_tick
    }

    /// Jump to `tick`. Clients follow the server's tick this way.
    pub fn set_current_tick(&mut self, tick: Tick) {
        self.current_tick = tick;
        self.components.set_current_tick(tick);
        self.maps.set_current_tick(tick);
    }

    /// One fixed step: advance the tick, run `systems`, sweep removed
    /// components. Returns the new tick.
    pub fn update(&mut self, systems: &mut EntitySystemManager, frame_time: f32) -> Tick {
        let tick = self.tick();
        systems.update(self, frame_time);
        self.cull_removed_components();
        tick
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Initialize every entity created so far; later spawns initialize
    /// immediately.
    pub fn startup(&mut self) {
        self.started = true;
        let pending: Vec<EntityUid> = self
            .entities
            .values()
            .filter(|e| !e.is_initialized())
            .map(Entity::uid)
            .collect();
        for uid in &pending {
            self.initialize_entity(*uid).ok();
        }
        info!(entities = self.entities.len(), initialized = pending.len(), "entity manager started");
    }

    /// Delete every entity and stop.
    pub fn shutdown(&mut self) {
        let flushed = self.flush_entities();
        self.started = false;
        info!(flushed, "entity manager shut down");
    }

    /// Delete every entity and sweep their components. Returns how many
    /// were deleted.
    pub fn flush_entities(&mut self) -> usize {
        let uids: Vec<EntityUid> = self.entities.keys().copied().collect();
        let deleted = uids.into_iter().filter(|uid| self.delete_entity(*uid)).count();
        self.cull_removed_components();
        deleted
    }

    /// Run component initialization on `uid` once.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownEntity`] if there is no such entity.
    pub fn initialize_entity(&mut self, uid: EntityUid) -> Result<(), WorldError> {
        let entity = self.entities.get(&uid).ok_or(WorldError::UnknownEntity(uid))?;
        if entity.is_initialized() {
            return Ok(());
        }
        self.components.initialize_components(uid);
        if let Some(entity) = self.entities.get_mut(&uid) {
            entity.set_initialized();
        }
        Ok(())
    }

    // ── Creation ───────────────────────────────────────────────────────────

    /// Create an uninitialized entity, optionally from a prototype.
    ///
    /// # Errors
    ///
    /// Fails on unknown prototypes or invalid prototype data.
    pub fn create_entity(&mut self, prototype: Option<&str>) -> Result<EntityUid, WorldError> {
        let uid = self.allocator.allocate().ok_or(WorldError::EntitiesExhausted)?;
        self.build_entity(uid, prototype)
    }

    /// Create an uninitialized entity with a caller-chosen uid. Later
    /// allocations skip past it.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateEntity`] if the uid is live,
    /// [`WorldError::ReservedEntity`] for [`EntityUid::RESERVED`], otherwise
    /// the same as [`EntityManager::create_entity`].
    pub fn create_entity_with_uid(&mut self, uid: EntityUid, prototype: Option<&str>) -> Result<EntityUid, WorldError> {
        self.build_entity(uid, prototype)
    }

    /// Create an entity from a prototype, initializing it if the manager
    /// has started.
    ///
    /// # Errors
    ///
    /// Same as [`EntityManager::create_entity`].
    pub fn spawn_entity(&mut self, prototype: &str) -> Result<EntityUid, WorldError> {
        let uid = self.create_entity(Some(prototype))?;
        if self.started {
            self.initialize_entity(uid)?;
        }
        Ok(uid)
    }

    /// [`EntityManager::spawn_entity`] placed at `coordinates` before
    /// initialization.
    ///
    /// # Errors
    ///
    /// Same as [`EntityManager::create_entity`].
    pub fn spawn_entity_at(&mut self, prototype: &str, coordinates: GridCoordinates) -> Result<EntityUid, WorldError> {
        let uid = self.create_entity(Some(prototype))?;
        self.set_grid_position(uid, coordinates)?;
        if self.started {
            self.initialize_entity(uid)?;
        }
        Ok(uid)
    }

    pub(crate) fn build_entity(&mut self, uid: EntityUid, prototype: Option<&str>) -> Result<EntityUid, WorldError> {
        if !uid.is_valid() || self.entities.contains_key(&uid) {
            return Err(WorldError::DuplicateEntity(uid));
        }
        if uid == EntityUid::RESERVED {
            return Err(WorldError::ReservedEntity(uid));
        }
        let entity = match prototype {
            Some(name) => self.prototypes.allocate(name, uid, self.current_tick)?,
            None => Entity::new(uid, None, String::new(), self.current_tick),
        };
        self.allocator.observe(uid);

        self.components
            .add_component(uid, Transform::new(uid, GridId::NULLSPACE, Vec2::ZERO), false)?;
        if let Some(name) = prototype
            && let Err(e) = self.prototypes.apply_fields(name, uid, &mut self.components)
        {
            self.components.remove_all_components(uid);
            return Err(e);
        }

        self.entities.insert(uid, entity);
        debug!(%uid, prototype = prototype.unwrap_or("-"), "created entity");
        Ok(uid)
    }

    // ── Lookup ─────────────────────────────────────────────────────────────

    #[must_use]
    pub fn entity(&self, uid: EntityUid) -> Option<&Entity> {
        self.entities.get(&uid)
    }

    #[must_use]
    pub fn entity_exists(&self, uid: EntityUid) -> bool {
        self.entities.contains_key(&uid)
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Every live entity, ordered by uid.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Uids of the entities matching `query`, ordered by uid.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::UnregisteredRole`] if the query names a
    /// role no registered component claims.
    pub fn get_entities(&self, query: &EntityQuery) -> Result<Vec<EntityUid>, WorldError> {
        let factory = self.components.factory();
        if let Some(role) = query.roles().into_iter().find(|r| !factory.is_role_registered(*r)) {
            return Err(ComponentError::UnregisteredRole(role).into());
        }

        if let EntityQuery::Type(role) = query {
            let mut owners: Vec<EntityUid> = self
                .components
                .get_all_components(*role)?
                .into_iter()
                .filter_map(|key| self.components.meta(key))
                .map(|meta| meta.owner)
                .filter(|uid| self.entities.contains_key(uid))
                .collect();
            owners.sort_unstable();
            owners.dedup();
            return Ok(owners);
        }

        Ok(self
            .entities
            .keys()
            .copied()
            .filter(|uid| query.matches(|role| self.components.has_component(*uid, role)))
            .collect())
    }

    // ── Modification ───────────────────────────────────────────────────────

    /// Mark the component holding `role` on `uid` modified this tick, and
    /// the entity with it.
    pub fn dirty(&mut self, uid: EntityUid, role: ComponentTypeId) {
        self.components.mark_dirty(uid, role);
        self.touch(uid);
    }

    /// [`EntityManager::dirty`] by component type.
    pub fn dirty_component<T: ComponentKind>(&mut self, uid: EntityUid) {
        self.dirty(uid, T::kind_id());
    }

    /// Mark the entity itself modified this tick.
    pub fn touch(&mut self, uid: EntityUid) {
        let tick = self.current_tick;
        if let Some(entity) = self.entities.get_mut(&uid) {
            entity.mark_modified(tick);
        }
    }

    /// Delete `uid`. Its parent link is cut and its children are sent to
    /// nullspace; its components stay reachable by key until the next
    /// sweep. Returns `false` if the entity does not exist.
    pub fn delete_entity(&mut self, uid: EntityUid) -> bool {
        if !self.entities.contains_key(&uid) {
            return false;
        }
        if let Err(e) = self.release_hierarchy(uid) {
            warn!(%uid, error = %e, "failed to release hierarchy of deleted entity");
        }
        let removed = self.components.remove_all_components(uid);
        if let Some(mut entity) = self.entities.remove(&uid) {
            entity.set_deleted();
        }
        if let Some(history) = &mut self.deletion_history {
            history.push((self.current_tick, uid));
        }
        self.events.push(EntityEvent::Deleted { uid });
        debug!(%uid, components = removed, "deleted entity");
        true
    }

    /// Sweep tombstoned components. Returns how many were dropped.
    pub fn cull_removed_components(&mut self) -> usize {
        self.components.cull_removed_components()
    }

    // ── Events ─────────────────────────────────────────────────────────────

    /// Take every queued event.
    pub fn drain_events(&mut self) -> Vec<EntityEvent> {
        std::mem::take(&mut self.events)
    }

    /// Events queued since the last drain.
    #[must_use]
    pub fn pending_events(&self) -> &[EntityEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Physics, shared_builtin_factory};
    use crate::prototype::PrototypeIndex;
    use sim_component::ComponentSetQuery;

    fn manager() -> EntityManager {
        let mut prototypes = PrototypeIndex::new();
        prototypes
            .load_json(
                r#"[
                    { "id": "crate", "name": "Crate", "components": [ { "type": "Transform", "pos": [1.0, 2.0] } ] },
                    { "id": "ball", "components": [ { "type": "Physics", "vel": [1.0, 0.0] } ] },
                    { "id": "broken", "components": [ { "type": "Physics", "mass": "heavy" } ] }
                ]"#,
            )
            .unwrap();
        EntityManager::new(shared_builtin_factory().unwrap(), Arc::new(prototypes))
    }

    #[test]
    fn test_create_entity_has_transform() {
        let mut em = manager();
        let uid = em.create_entity(None).unwrap();
        assert!(em.entity_exists(uid));
        assert!(em.components().get_component::<Transform>(uid).is_some());
        assert!(!em.entity(uid).unwrap().is_initialized());
    }

    #[test]
    fn test_prototype_fields_applied() {
        let mut em = manager();
        let uid = em.create_entity(Some("crate")).unwrap();
        assert_eq!(em.entity(uid).unwrap().name(), "Crate");
        assert_eq!(em.transform(uid).unwrap().local_position(), Vec2::new(1.0, 2.0));

        let ball = em.create_entity(Some("ball")).unwrap();
        assert_eq!(em.components().get_component::<Physics>(ball).unwrap().linear_velocity, Vec2::X);
    }

    #[test]
    fn test_invalid_prototype_leaves_nothing_behind() {
        let mut em = manager();
        assert!(em.create_entity(Some("broken")).is_err());
        assert!(matches!(em.create_entity(Some("ghost")), Err(WorldError::UnknownPrototype(_))));
        assert_eq!(em.entity_count(), 0);
        em.cull_removed_components();
        assert!(em.components().is_empty());
    }

    #[test]
    fn test_create_with_uid_and_allocation() {
        let mut em = manager();
        em.create_entity_with_uid(EntityUid(10), None).unwrap();
        assert!(matches!(
            em.create_entity_with_uid(EntityUid(10), None),
            Err(WorldError::DuplicateEntity(_))
        ));
        assert_eq!(em.create_entity(None).unwrap(), EntityUid(11));
    }

    #[test]
    fn test_last_uid_is_rejected_without_panicking() {
        let mut em = manager();
        assert!(matches!(
            em.create_entity_with_uid(EntityUid(u64::MAX), None),
            Err(WorldError::ReservedEntity(_))
        ));
        assert!(!em.entity_exists(EntityUid(u64::MAX)));

        em.create_entity_with_uid(EntityUid(u64::MAX - 1), None).unwrap();
        assert!(matches!(em.create_entity(None), Err(WorldError::EntitiesExhausted)));
        assert_eq!(em.entity_count(), 1);
    }

    #[test]
    fn test_spawn_initializes_after_startup() {
        let mut em = manager();
        let early = em.spawn_entity("crate").unwrap();
        assert!(!em.entity(early).unwrap().is_initialized());
        em.startup();
        assert!(em.entity(early).unwrap().is_initialized());
        let late = em.spawn_entity("crate").unwrap();
        assert!(em.entity(late).unwrap().is_initialized());
    }

    #[test]
    fn test_delete_entity_tombstones_components() {
        let mut em = manager();
        let uid = em.create_entity(Some("ball")).unwrap();
        assert!(em.delete_entity(uid));
        assert!(!em.delete_entity(uid));
        assert!(!em.entity_exists(uid));
        assert!(!em.components().has_component(uid, Physics::kind_id()));
        assert_eq!(em.components().pending_removals(), 2);
        assert_eq!(em.drain_events(), vec![EntityEvent::Deleted { uid }]);

        assert_eq!(em.cull_removed_components(), 2);
        assert_eq!(em.components().pending_removals(), 0);
    }

    #[test]
    fn test_get_entities_queries() {
        let mut em = manager();
        let plain = em.create_entity(None).unwrap();
        let ball = em.create_entity(Some("ball")).unwrap();

        assert_eq!(em.get_entities(&EntityQuery::all()).unwrap(), vec![plain, ball]);
        assert_eq!(em.get_entities(&EntityQuery::of::<Physics>()).unwrap(), vec![ball]);

        let without_physics = ComponentSetQuery::new()
            .with(Transform::kind_id())
            .without(Physics::kind_id());
        assert_eq!(em.get_entities(&without_physics.into()).unwrap(), vec![plain]);

        let unknown = EntityQuery::of_role(ComponentTypeId::from_name("Sprite"));
        assert!(matches!(
            em.get_entities(&unknown),
            Err(WorldError::Component(ComponentError::UnregisteredRole(_)))
        ));
    }

    #[test]
    fn test_tick_propagates() {
        let mut em = manager();
        em.tick();
        em.tick();
        assert_eq!(em.current_tick(), 2);
        assert_eq!(em.components().current_tick(), 2);
        assert_eq!(em.maps().current_tick(), 2);

        let uid = em.create_entity(None).unwrap();
        assert_eq!(em.entity(uid).unwrap().last_modified_tick(), 2);
        em.tick();
        em.dirty_component::<Transform>(uid);
        assert_eq!(em.entity(uid).unwrap().last_modified_tick(), 3);
    }

    #[test]
    fn test_flush_entities() {
        let mut em = manager();
        em.create_entity(None).unwrap();
        em.create_entity(Some("ball")).unwrap();
        assert_eq!(em.flush_entities(), 2);
        assert_eq!(em.entity_count(), 0);
        assert!(em.components().is_empty());
    }
}
