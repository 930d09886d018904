//! Client side of entity replication.
//!
//! [`ClientEntityManager`] mirrors the server's world by applying received
//! [`GameState`]s. Application runs in two phases so that everything a
//! state refers to exists before it is used, and everything it removes is
//! removed only after the rest has been applied:
//!
//! 1. maps and grids are created and their tiles written,
//! 2. unknown entities are created, component states applied, and the new
//!    entities initialized,
//! 3. deleted entities are removed,
//! 4. deleted grids and maps are removed.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use sim_component::{ComponentFactory, ComponentState, EntityUid, Tick};
use sim_math::{TRANSFORM_NET_ID, TransformState};
use tracing::{debug, trace, warn};

use crate::entity_manager::EntityManager;
use crate::error::WorldError;
use crate::game_state::{EntityState, GameState};
use crate::prototype::PrototypeSource;

/// Replica entity manager.
#[derive(Debug)]
pub struct ClientEntityManager {
    inner: EntityManager,
    last_applied_tick: Tick,
}

impl ClientEntityManager {
    #[must_use]
    pub fn new(factory: Arc<ComponentFactory>, prototypes: Arc<dyn PrototypeSource>) -> Self {
        Self::from_manager(EntityManager::new(factory, prototypes))
    }

    /// Wrap an already configured manager.
    #[must_use]
    pub fn from_manager(inner: EntityManager) -> Self {
        Self {
            inner,
            last_applied_tick: 0,
        }
    }

    /// `to_tick` of the last state applied; 0 before the first.
    #[must_use]
    pub fn last_applied_tick(&self) -> Tick {
        self.last_applied_tick
    }

    /// Apply a received state. Returns `Ok(false)` for a state that is not
    /// newer than the last one applied; it is dropped untouched.
    ///
    /// # Errors
    ///
    /// Fails on map data or component states that cannot be applied. The
    /// applied tick does not advance, so the server keeps sending from the
    /// old cursor.
    pub fn apply_game_state(&mut self, state: &GameState) -> Result<bool, WorldError> {
        if state.to_tick <= self.last_applied_tick {
            trace!(
                to_tick = state.to_tick,
                last_applied = self.last_applied_tick,
                "dropping stale game state"
            );
            return Ok(false);
        }
        self.inner.set_current_tick(state.to_tick);

        let tile_changes = self.inner.maps_mut().apply_state_pre(&state.map_data)?;
        let created = self.apply_entity_states(&state.entity_states)?;
        let deleted = self.apply_deleted_entities(&state.deleted_entities);
        self.inner.maps_mut().apply_state_post(&state.map_data);
        self.inner.cull_removed_components();

        self.last_applied_tick = state.to_tick;
        debug!(
            from_tick = state.from_tick,
            to_tick = state.to_tick,
            entities = state.entity_states.len(),
            created = created.len(),
            deleted,
            tiles = tile_changes.len(),
            "applied game state"
        );
        Ok(true)
    }

    /// Create unknown entities, apply every component state, then
    /// initialize every listed entity that is not yet initialized. Returns
    /// the created uids.
    ///
    /// # Errors
    ///
    /// Fails on states that cannot be decoded or components that cannot be
    /// added.
    pub fn apply_entity_states(&mut self, states: &[EntityState]) -> Result<Vec<EntityUid>, WorldError> {
        let mut created = Vec::new();
        for state in states {
            if self.inner.entity_exists(state.uid) {
                continue;
            }
            let uid = match self.inner.build_entity(state.uid, state.prototype.as_deref()) {
                Ok(uid) => uid,
                Err(WorldError::UnknownPrototype(name)) => {
                    warn!(uid = %state.uid, prototype = %name, "unknown prototype, creating blank entity");
                    self.inner.build_entity(state.uid, None)?
                }
                Err(e) => return Err(e),
            };
            created.push(uid);
        }

        for state in states {
            for component_state in &state.component_states {
                self.apply_component_state(state.uid, component_state)?;
            }
        }

        // Entities created by an earlier state that failed halfway are
        // still uninitialized and get initialized here.
        for state in states {
            if self.inner.entity(state.uid).is_some_and(|e| !e.is_initialized()) {
                self.inner.initialize_entity(state.uid)?;
            }
        }
        Ok(created)
    }

    fn apply_component_state(&mut self, uid: EntityUid, state: &ComponentState) -> Result<(), WorldError> {
        if state.net_id == TRANSFORM_NET_ID {
            let transform: TransformState = state.decode(TRANSFORM_NET_ID)?;
            self.inner.apply_transform_state(uid, &transform)?;
            return Ok(());
        }

        let components = self.inner.components_mut();
        if !components.has_net_component(uid, state.net_id) {
            let Some(name) = components.factory().name_for_net_id(state.net_id) else {
                warn!(%uid, net_id = state.net_id, "no component registered for net id");
                return Ok(());
            };
            components.add_default_component(uid, name, false)?;
        }
        components.handle_component_state(uid, state)?;
        Ok(())
    }

    /// Delete every listed entity that exists. Returns how many were.
    pub fn apply_deleted_entities(&mut self, deleted: &[EntityUid]) -> usize {
        deleted.iter().filter(|uid| self.inner.delete_entity(**uid)).count()
    }

    #[must_use]
    pub fn into_inner(self) -> EntityManager {
        self.inner
    }
}

impl Deref for ClientEntityManager {
    type Target = EntityManager;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ClientEntityManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
