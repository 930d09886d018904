//! The per-entity component registry.
//!
//! Components live in a generational [`SlotMap`]; a [`ComponentKey`] is a
//! stable handle that never aliases a later component. Each entity keeps two
//! lookup tables (role → key and net id → key) and a global index maps every
//! role to the set of components claiming it.
//!
//! ## Deferred removal
//!
//! Removing a component only tombstones it and runs its `shutdown` hook. The
//! slot stays allocated, so handles taken before the removal keep resolving
//! and an iteration already in progress is unaffected. New lookups and new
//! snapshots skip tombstoned components. [`ComponentManager::cull_removed_components`]
//! erases them once per tick at the sweep point.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use slotmap::SlotMap;
use tracing::{debug, trace};

use crate::component::{Component, ComponentKind, ComponentState, ComponentTypeId, NetId, Tick};
use crate::entity::EntityUid;
use crate::error::ComponentError;
use crate::factory::{ComponentFactory, ComponentRegistration};

slotmap::new_key_type! {
    /// Stable handle to a stored component.
    pub struct ComponentKey;
}

/// Bookkeeping for a stored component, as reported by [`ComponentManager::meta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentMeta {
    /// Owning entity.
    pub owner: EntityUid,
    /// Concrete component name.
    pub name: &'static str,
    /// Network id, if replicated.
    pub net_id: Option<NetId>,
    /// Last tick at which the component was added or marked dirty.
    pub last_modified_tick: Tick,
    /// Whether the component is tombstoned and waiting for the sweep.
    pub removed: bool,
}

#[derive(Debug)]
struct ComponentSlot {
    owner: EntityUid,
    name: &'static str,
    net_id: Option<NetId>,
    roles: Vec<ComponentTypeId>,
    last_modified_tick: Tick,
    removed: bool,
    component: Box<dyn Component>,
}

#[derive(Debug, Default)]
struct EntityComponents {
    by_role: HashMap<ComponentTypeId, ComponentKey>,
    by_net_id: BTreeMap<NetId, ComponentKey>,
    instances: Vec<ComponentKey>,
}

fn downcast_ref<T: Component>(component: &dyn Component) -> Option<&T> {
    let any: &dyn Any = component;
    any.downcast_ref::<T>()
}

fn downcast_mut<T: Component>(component: &mut dyn Component) -> Option<&mut T> {
    let any: &mut dyn Any = component;
    any.downcast_mut::<T>()
}

/// Stores every component of every entity.
#[derive(Debug)]
pub struct ComponentManager {
    factory: Arc<ComponentFactory>,
    slots: SlotMap<ComponentKey, ComponentSlot>,
    entities: HashMap<EntityUid, EntityComponents>,
    role_index: HashMap<ComponentTypeId, BTreeSet<ComponentKey>>,
    removed: Vec<ComponentKey>,
    current_tick: Tick,
}

impl ComponentManager {
    /// Create an empty registry backed by a finished factory.
    #[must_use]
    pub fn new(factory: Arc<ComponentFactory>) -> Self {
        Self {
            factory,
            slots: SlotMap::with_key(),
            entities: HashMap::new(),
            role_index: HashMap::new(),
            removed: Vec::new(),
            current_tick: 0,
        }
    }

    /// The component factory this registry validates against.
    #[must_use]
    pub fn factory(&self) -> &Arc<ComponentFactory> {
        &self.factory
    }

    /// The tick stamped onto newly added or dirtied components.
    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    /// Advance the tick used for modification stamps.
    pub fn set_current_tick(&mut self, tick: Tick) {
        self.current_tick = tick;
    }

    // ── Insertion ──────────────────────────────────────────────────────────

    /// Add a component to `uid`, registering it under every role it declares
    /// and under its network id.
    ///
    /// With `overwrite`, components already holding a clashing role or net id
    /// are tombstoned first.
    ///
    /// # Errors
    ///
    /// Fails when the kind is unregistered, the owner does not match `uid`,
    /// or a role / net id is already claimed and `overwrite` is `false`.
    pub fn add_component<T: ComponentKind>(
        &mut self,
        uid: EntityUid,
        component: T,
        overwrite: bool,
    ) -> Result<ComponentKey, ComponentError> {
        let factory = Arc::clone(&self.factory);
        let registration = factory
            .registration(T::kind_id())
            .ok_or_else(|| ComponentError::UnregisteredComponent(T::NAME.to_string()))?;
        self.insert(uid, registration, Box::new(component), overwrite)
    }

    /// Instantiate the registered component `name` with default data and add
    /// it to `uid`.
    ///
    /// # Errors
    ///
    /// Same as [`ComponentManager::add_component`].
    pub fn add_default_component(
        &mut self,
        uid: EntityUid,
        name: &str,
        overwrite: bool,
    ) -> Result<ComponentKey, ComponentError> {
        let factory = Arc::clone(&self.factory);
        let registration = factory
            .registration_by_name(name)
            .ok_or_else(|| ComponentError::UnregisteredComponent(name.to_string()))?;
        let mut component = registration.instantiate();
        component.set_owner(uid);
        self.insert(uid, registration, component, overwrite)
    }

    fn insert(
        &mut self,
        uid: EntityUid,
        registration: &ComponentRegistration,
        component: Box<dyn Component>,
        overwrite: bool,
    ) -> Result<ComponentKey, ComponentError> {
        if component.owner() != uid {
            return Err(ComponentError::OwnerMismatch {
                component: registration.name,
                entity: uid,
                owner: component.owner(),
            });
        }

        let mut displaced = Vec::new();
        if let Some(entry) = self.entities.get(&uid) {
            for role in &registration.roles {
                if let Some(&key) = entry.by_role.get(role)
                    && self.is_live(key)
                {
                    if !overwrite {
                        return Err(ComponentError::DuplicateRole {
                            entity: uid,
                            role: self.factory.role_name(*role),
                        });
                    }
                    displaced.push(key);
                }
            }
            if let Some(net_id) = registration.net_id
                && let Some(&key) = entry.by_net_id.get(&net_id)
                && self.is_live(key)
            {
                if !overwrite {
                    return Err(ComponentError::DuplicateNetId { entity: uid, net_id });
                }
                displaced.push(key);
            }
        }

        displaced.sort();
        displaced.dedup();
        for key in displaced {
            self.tombstone(key);
        }

        let key = self.slots.insert(ComponentSlot {
            owner: uid,
            name: registration.name,
            net_id: registration.net_id,
            roles: registration.roles.clone(),
            last_modified_tick: self.current_tick,
            removed: false,
            component,
        });

        let entry = self.entities.entry(uid).or_default();
        for role in &registration.roles {
            entry.by_role.insert(*role, key);
            self.role_index.entry(*role).or_default().insert(key);
        }
        if let Some(net_id) = registration.net_id {
            entry.by_net_id.insert(net_id, key);
        }
        entry.instances.push(key);

        trace!(entity = %uid, component = registration.name, "added component");
        Ok(key)
    }

    // ── Removal ────────────────────────────────────────────────────────────

    /// Tombstone the component claiming `role` on `uid`.
    ///
    /// Returns `false` if there is no live component for that role.
    pub fn remove_component(&mut self, uid: EntityUid, role: ComponentTypeId) -> bool {
        match self.live_key_for_role(uid, role) {
            Some(key) => {
                self.tombstone(key);
                true
            }
            None => false,
        }
    }

    /// Tombstone the component with network id `net_id` on `uid`.
    pub fn remove_component_by_net_id(&mut self, uid: EntityUid, net_id: NetId) -> bool {
        match self.live_key_for_net_id(uid, net_id) {
            Some(key) => {
                self.tombstone(key);
                true
            }
            None => false,
        }
    }

    /// Tombstone every component of `uid`. Returns how many were removed.
    pub fn remove_all_components(&mut self, uid: EntityUid) -> usize {
        let keys = self.get_component_instances(uid);
        for key in &keys {
            self.tombstone(*key);
        }
        keys.len()
    }

    fn tombstone(&mut self, key: ComponentKey) {
        if let Some(slot) = self.slots.get_mut(key)
            && !slot.removed
        {
            slot.removed = true;
            slot.component.shutdown();
            self.removed.push(key);
        }
    }

    /// Erase every tombstoned component. Returns how many were erased.
    pub fn cull_removed_components(&mut self) -> usize {
        let removed = std::mem::take(&mut self.removed);
        let count = removed.len();
        for key in removed {
            let Some(slot) = self.slots.remove(key) else {
                continue;
            };
            if let Some(entry) = self.entities.get_mut(&slot.owner) {
                entry.by_role.retain(|_, k| *k != key);
                entry.by_net_id.retain(|_, k| *k != key);
                entry.instances.retain(|k| *k != key);
                if entry.instances.is_empty() {
                    self.entities.remove(&slot.owner);
                }
            }
            for role in &slot.roles {
                if let Some(set) = self.role_index.get_mut(role) {
                    set.remove(&key);
                    if set.is_empty() {
                        self.role_index.remove(role);
                    }
                }
            }
        }
        if count > 0 {
            debug!(count, "culled removed components");
        }
        count
    }

    // ── Lookup ─────────────────────────────────────────────────────────────

    fn is_live(&self, key: ComponentKey) -> bool {
        self.slots.get(key).is_some_and(|slot| !slot.removed)
    }

    fn live_key_for_role(&self, uid: EntityUid, role: ComponentTypeId) -> Option<ComponentKey> {
        let key = *self.entities.get(&uid)?.by_role.get(&role)?;
        self.is_live(key).then_some(key)
    }

    fn live_key_for_net_id(&self, uid: EntityUid, net_id: NetId) -> Option<ComponentKey> {
        let key = *self.entities.get(&uid)?.by_net_id.get(&net_id)?;
        self.is_live(key).then_some(key)
    }

    /// Returns `true` if `uid` holds a live component satisfying `role`.
    #[must_use]
    pub fn has_component(&self, uid: EntityUid, role: ComponentTypeId) -> bool {
        self.live_key_for_role(uid, role).is_some()
    }

    /// Returns `true` if `uid` holds a live component with `net_id`.
    #[must_use]
    pub fn has_net_component(&self, uid: EntityUid, net_id: NetId) -> bool {
        self.live_key_for_net_id(uid, net_id).is_some()
    }

    /// Typed access to the component of kind `T` on `uid`.
    #[must_use]
    pub fn get_component<T: ComponentKind>(&self, uid: EntityUid) -> Option<&T> {
        self.live_key_for_role(uid, T::kind_id())
            .and_then(|key| self.get::<T>(key))
    }

    /// Typed mutable access to the component of kind `T` on `uid`.
    pub fn get_component_mut<T: ComponentKind>(&mut self, uid: EntityUid) -> Option<&mut T> {
        let key = self.live_key_for_role(uid, T::kind_id())?;
        self.get_mut::<T>(key)
    }

    /// Typed access that reports a missing component as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::MissingComponent`] when `uid` has no such
    /// component.
    pub fn try_get_component<T: ComponentKind>(&self, uid: EntityUid) -> Result<&T, ComponentError> {
        self.get_component::<T>(uid)
            .ok_or(ComponentError::MissingComponent {
                entity: uid,
                component: T::NAME,
            })
    }

    /// The component satisfying `role` on `uid`.
    #[must_use]
    pub fn get_by_role(&self, uid: EntityUid, role: ComponentTypeId) -> Option<&dyn Component> {
        self.live_key_for_role(uid, role).and_then(|key| self.component(key))
    }

    /// The component with network id `net_id` on `uid`. Unknown ids yield
    /// `None`.
    #[must_use]
    pub fn get_by_net_id(&self, uid: EntityUid, net_id: NetId) -> Option<&dyn Component> {
        self.live_key_for_net_id(uid, net_id).and_then(|key| self.component(key))
    }

    /// Mutable variant of [`ComponentManager::get_by_net_id`].
    pub fn get_by_net_id_mut(&mut self, uid: EntityUid, net_id: NetId) -> Option<&mut dyn Component> {
        let key = self.live_key_for_net_id(uid, net_id)?;
        self.component_mut(key)
    }

    /// Every live component on `uid` satisfying `role`.
    #[must_use]
    pub fn get_components(&self, uid: EntityUid, role: ComponentTypeId) -> Vec<ComponentKey> {
        self.entities
            .get(&uid)
            .map(|entry| {
                entry
                    .instances
                    .iter()
                    .copied()
                    .filter(|key| {
                        self.slots
                            .get(*key)
                            .is_some_and(|slot| !slot.removed && slot.roles.contains(&role))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of every live component, across all entities, satisfying
    /// `role`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::UnregisteredRole`] if no registered kind
    /// claims `role`.
    pub fn get_all_components(&self, role: ComponentTypeId) -> Result<Vec<ComponentKey>, ComponentError> {
        if !self.factory.is_role_registered(role) {
            return Err(ComponentError::UnregisteredRole(role));
        }
        Ok(self
            .role_index
            .get(&role)
            .map(|set| set.iter().copied().filter(|key| self.is_live(*key)).collect())
            .unwrap_or_default())
    }

    /// Snapshot of every live component on `uid`, in insertion order.
    #[must_use]
    pub fn get_component_instances(&self, uid: EntityUid) -> Vec<ComponentKey> {
        self.entities
            .get(&uid)
            .map(|entry| {
                entry
                    .instances
                    .iter()
                    .copied()
                    .filter(|key| self.is_live(*key))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Live replicated components on `uid`, ordered by net id.
    #[must_use]
    pub fn get_net_components(&self, uid: EntityUid) -> Vec<(NetId, ComponentKey)> {
        self.entities
            .get(&uid)
            .map(|entry| {
                entry
                    .by_net_id
                    .iter()
                    .filter(|(_, key)| self.is_live(**key))
                    .map(|(net_id, key)| (*net_id, *key))
                    .collect()
            })
            .unwrap_or_default()
    }

    // ── Handle access ──────────────────────────────────────────────────────

    /// Resolve a handle. Tombstoned components resolve until the sweep.
    #[must_use]
    pub fn component(&self, key: ComponentKey) -> Option<&dyn Component> {
        self.slots.get(key).map(|slot| &*slot.component)
    }

    /// Resolve a handle mutably.
    pub fn component_mut(&mut self, key: ComponentKey) -> Option<&mut dyn Component> {
        match self.slots.get_mut(key) {
            Some(slot) => Some(&mut *slot.component),
            None => None,
        }
    }

    /// Resolve a handle as concrete type `T`.
    #[must_use]
    pub fn get<T: Component>(&self, key: ComponentKey) -> Option<&T> {
        self.component(key).and_then(downcast_ref::<T>)
    }

    /// Resolve a handle mutably as concrete type `T`.
    pub fn get_mut<T: Component>(&mut self, key: ComponentKey) -> Option<&mut T> {
        self.component_mut(key).and_then(downcast_mut::<T>)
    }

    /// Bookkeeping for a handle.
    #[must_use]
    pub fn meta(&self, key: ComponentKey) -> Option<ComponentMeta> {
        self.slots.get(key).map(|slot| ComponentMeta {
            owner: slot.owner,
            name: slot.name,
            net_id: slot.net_id,
            last_modified_tick: slot.last_modified_tick,
            removed: slot.removed,
        })
    }

    // ── Replication ────────────────────────────────────────────────────────

    /// Stamp the component claiming `role` on `uid` with the current tick.
    pub fn mark_dirty(&mut self, uid: EntityUid, role: ComponentTypeId) -> bool {
        match self.live_key_for_role(uid, role) {
            Some(key) => self.mark_dirty_key(key),
            None => false,
        }
    }

    /// Stamp a component with the current tick.
    pub fn mark_dirty_key(&mut self, key: ComponentKey) -> bool {
        let tick = self.current_tick;
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.last_modified_tick = slot.last_modified_tick.max(tick);
                true
            }
            None => false,
        }
    }

    /// States of every live replicated component on `uid` modified at or
    /// after `from_tick`, ordered by net id.
    ///
    /// # Errors
    ///
    /// Propagates encoding failures from the components.
    pub fn get_component_states(
        &self,
        uid: EntityUid,
        from_tick: Tick,
    ) -> Result<Vec<ComponentState>, ComponentError> {
        let mut states = Vec::new();
        for (_, key) in self.get_net_components(uid) {
            let Some(slot) = self.slots.get(key) else {
                continue;
            };
            if slot.last_modified_tick < from_tick {
                continue;
            }
            if let Some(state) = slot.component.get_component_state()? {
                states.push(state);
            }
        }
        Ok(states)
    }

    /// Hand a received state to the component with the matching net id.
    ///
    /// Returns `Ok(false)` when `uid` has no such component.
    ///
    /// # Errors
    ///
    /// Propagates decoding failures from the component.
    pub fn handle_component_state(
        &mut self,
        uid: EntityUid,
        state: &ComponentState,
    ) -> Result<bool, ComponentError> {
        match self.get_by_net_id_mut(uid, state.net_id) {
            Some(component) => {
                component.handle_component_state(state)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Run `initialize` then `startup` on every live component of `uid`.
    pub fn initialize_components(&mut self, uid: EntityUid) {
        let keys = self.get_component_instances(uid);
        for key in &keys {
            if let Some(component) = self.component_mut(*key) {
                component.initialize();
            }
        }
        for key in &keys {
            if let Some(component) = self.component_mut(*key) {
                component.startup();
            }
        }
    }

    /// Number of stored components, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of components waiting for the sweep.
    #[must_use]
    pub fn pending_removals(&self) -> usize {
        self.removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    const DAMAGEABLE: ComponentTypeId = ComponentTypeId::from_name("Damageable");

    #[derive(Debug, Default)]
    struct Health {
        owner: EntityUid,
        current: f32,
        shut_down: bool,
    }

    impl Component for Health {
        fn owner(&self) -> EntityUid {
            self.owner
        }

        fn set_owner(&mut self, owner: EntityUid) {
            self.owner = owner;
        }

        fn shutdown(&mut self) {
            self.shut_down = true;
        }
    }

    impl ComponentKind for Health {
        const NAME: &'static str = "Health";
        const ROLES: &'static [&'static str] = &["Damageable"];
    }

    #[derive(Debug, Default)]
    struct Armor {
        owner: EntityUid,
    }

    impl Component for Armor {
        fn owner(&self) -> EntityUid {
            self.owner
        }

        fn set_owner(&mut self, owner: EntityUid) {
            self.owner = owner;
        }
    }

    impl ComponentKind for Armor {
        const NAME: &'static str = "Armor";
        const ROLES: &'static [&'static str] = &["Damageable"];
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct SpriteState {
        frame: u32,
    }

    #[derive(Debug, Default)]
    struct Sprite {
        owner: EntityUid,
        frame: u32,
    }

    impl Component for Sprite {
        fn owner(&self) -> EntityUid {
            self.owner
        }

        fn set_owner(&mut self, owner: EntityUid) {
            self.owner = owner;
        }

        fn get_component_state(&self) -> Result<Option<ComponentState>, ComponentError> {
            ComponentState::encode(Self::NET_ID.unwrap_or_default(), &SpriteState { frame: self.frame })
                .map(Some)
        }

        fn handle_component_state(&mut self, state: &ComponentState) -> Result<(), ComponentError> {
            let body: SpriteState = state.decode(Self::NET_ID.unwrap_or_default())?;
            self.frame = body.frame;
            Ok(())
        }
    }

    impl ComponentKind for Sprite {
        const NAME: &'static str = "Sprite";
        const NET_ID: Option<NetId> = Some(5);
    }

    fn manager() -> ComponentManager {
        let mut factory = ComponentFactory::new();
        factory.register::<Health>().unwrap();
        factory.register::<Armor>().unwrap();
        factory.register::<Sprite>().unwrap();
        ComponentManager::new(Arc::new(factory))
    }

    fn health(owner: EntityUid) -> Health {
        Health {
            owner,
            current: 100.0,
            shut_down: false,
        }
    }

    #[test]
    fn test_add_and_get_typed() {
        let mut mgr = manager();
        let e = EntityUid(1);
        mgr.add_component(e, health(e), false).unwrap();

        assert_eq!(mgr.get_component::<Health>(e).unwrap().current, 100.0);
        assert!(mgr.has_component(e, Health::kind_id()));
        assert!(mgr.has_component(e, DAMAGEABLE));
        assert!(mgr.get_component::<Armor>(e).is_none());

        mgr.get_component_mut::<Health>(e).unwrap().current = 50.0;
        assert_eq!(mgr.try_get_component::<Health>(e).unwrap().current, 50.0);
    }

    #[test]
    fn test_owner_mismatch_rejected() {
        let mut mgr = manager();
        let err = mgr
            .add_component(EntityUid(1), health(EntityUid(2)), false)
            .unwrap_err();
        assert!(matches!(err, ComponentError::OwnerMismatch { .. }));
        assert!(mgr.is_empty());
    }

    #[test]
    fn test_role_uniqueness_without_overwrite() {
        let mut mgr = manager();
        let e = EntityUid(1);
        mgr.add_component(e, health(e), false).unwrap();

        let err = mgr.add_component(e, Armor { owner: e }, false).unwrap_err();
        assert!(matches!(
            err,
            ComponentError::DuplicateRole { role: "Damageable", .. }
        ));
        assert!(mgr.get_component::<Armor>(e).is_none());
    }

    #[test]
    fn test_overwrite_displaces_previous_holder() {
        let mut mgr = manager();
        let e = EntityUid(1);
        let old = mgr.add_component(e, health(e), false).unwrap();
        mgr.add_component(e, Armor { owner: e }, true).unwrap();

        assert!(mgr.get_component::<Armor>(e).is_some());
        assert!(!mgr.has_component(e, Health::kind_id()));
        assert!(mgr.get::<Health>(old).unwrap().shut_down);
        assert_eq!(mgr.pending_removals(), 1);
    }

    #[test]
    fn test_duplicate_net_id_rejected() {
        let mut mgr = manager();
        let e = EntityUid(1);
        mgr.add_component(e, Sprite { owner: e, frame: 0 }, false).unwrap();
        let err = mgr
            .add_component(e, Sprite { owner: e, frame: 1 }, false)
            .unwrap_err();
        assert!(matches!(err, ComponentError::DuplicateRole { .. } | ComponentError::DuplicateNetId { .. }));
    }

    #[test]
    fn test_unregistered_component_rejected() {
        #[derive(Debug, Default)]
        struct Ghost {
            owner: EntityUid,
        }
        impl Component for Ghost {
            fn owner(&self) -> EntityUid {
                self.owner
            }
            fn set_owner(&mut self, owner: EntityUid) {
                self.owner = owner;
            }
        }
        impl ComponentKind for Ghost {
            const NAME: &'static str = "Ghost";
        }

        let mut mgr = manager();
        let err = mgr
            .add_component(EntityUid(1), Ghost { owner: EntityUid(1) }, false)
            .unwrap_err();
        assert!(matches!(err, ComponentError::UnregisteredComponent(_)));
    }

    #[test]
    fn test_removal_is_deferred_until_cull() {
        let mut mgr = manager();
        let a = EntityUid(1);
        let b = EntityUid(2);
        mgr.add_component(a, health(a), false).unwrap();
        mgr.add_component(b, health(b), false).unwrap();

        let snapshot = mgr.get_all_components(DAMAGEABLE).unwrap();
        assert_eq!(snapshot.len(), 2);

        assert!(mgr.remove_component(a, Health::kind_id()));
        // Handles from the snapshot keep resolving until the sweep.
        for key in &snapshot {
            assert!(mgr.component(*key).is_some());
        }
        assert!(!mgr.has_component(a, DAMAGEABLE));
        assert_eq!(mgr.get_all_components(DAMAGEABLE).unwrap().len(), 1);

        assert_eq!(mgr.cull_removed_components(), 1);
        assert!(mgr.component(snapshot[0]).is_none());
        assert_eq!(mgr.len(), 1);
        assert!(!mgr.remove_component(a, Health::kind_id()));
    }

    #[test]
    fn test_get_all_components_unregistered_role_is_error() {
        let mgr = manager();
        let err = mgr
            .get_all_components(ComponentTypeId::from_name("Nothing"))
            .unwrap_err();
        assert!(matches!(err, ComponentError::UnregisteredRole(_)));
    }

    #[test]
    fn test_get_components_by_role_on_entity() {
        let mut mgr = manager();
        let e = EntityUid(1);
        mgr.add_component(e, health(e), false).unwrap();
        mgr.add_component(e, Sprite { owner: e, frame: 0 }, false).unwrap();

        assert_eq!(mgr.get_components(e, DAMAGEABLE).len(), 1);
        assert_eq!(mgr.get_component_instances(e).len(), 2);
        assert_eq!(mgr.get_net_components(e).len(), 1);
    }

    #[test]
    fn test_net_id_lookup_is_soft() {
        let mut mgr = manager();
        let e = EntityUid(1);
        mgr.add_component(e, Sprite { owner: e, frame: 3 }, false).unwrap();

        assert!(mgr.get_by_net_id(e, 5).is_some());
        assert!(mgr.get_by_net_id(e, 99).is_none());
        assert!(!mgr.has_net_component(EntityUid(42), 5));
    }

    #[test]
    fn test_component_states_respect_from_tick() {
        let mut mgr = manager();
        let e = EntityUid(1);
        mgr.set_current_tick(3);
        mgr.add_component(e, Sprite { owner: e, frame: 7 }, false).unwrap();

        assert_eq!(mgr.get_component_states(e, 3).unwrap().len(), 1);
        assert!(mgr.get_component_states(e, 4).unwrap().is_empty());

        mgr.set_current_tick(6);
        assert!(mgr.mark_dirty(e, Sprite::kind_id()));
        let states = mgr.get_component_states(e, 4).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].decode::<SpriteState>(5).unwrap().frame, 7);
    }

    #[test]
    fn test_handle_component_state_routes_by_net_id() {
        let mut mgr = manager();
        let e = EntityUid(1);
        mgr.add_component(e, Sprite { owner: e, frame: 0 }, false).unwrap();

        let state = ComponentState::encode(5, &SpriteState { frame: 9 }).unwrap();
        assert!(mgr.handle_component_state(e, &state).unwrap());
        assert_eq!(mgr.get_component::<Sprite>(e).unwrap().frame, 9);

        assert!(!mgr.handle_component_state(EntityUid(2), &state).unwrap());
    }

    #[test]
    fn test_add_default_component_sets_owner() {
        let mut mgr = manager();
        let e = EntityUid(4);
        let key = mgr.add_default_component(e, "Health", false).unwrap();
        assert_eq!(mgr.meta(key).unwrap().owner, e);
        assert_eq!(mgr.meta(key).unwrap().name, "Health");
    }
}
