//! Server side of entity replication.
//!
//! [`ServerEntityManager`] adds what only the authority needs on top of the
//! shared [`EntityManager`]: a deletion history, and the construction of
//! [`GameState`] deltas from any client cursor that is still covered by
//! that history.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use sim_component::{ComponentFactory, EntityUid, Tick};
use tracing::trace;

use crate::entity_manager::EntityManager;
use crate::error::WorldError;
use crate::game_state::{EntityState, GameState};
use crate::prototype::PrototypeSource;

/// Authoritative entity manager.
#[derive(Debug)]
pub struct ServerEntityManager {
    inner: EntityManager,
}

impl ServerEntityManager {
    #[must_use]
    pub fn new(factory: Arc<ComponentFactory>, prototypes: Arc<dyn PrototypeSource>) -> Self {
        Self::from_manager(EntityManager::new(factory, prototypes))
    }

    /// Wrap an already configured manager. From here on every deletion is
    /// remembered, so clients behind the deletion tick learn about it.
    #[must_use]
    pub fn from_manager(mut inner: EntityManager) -> Self {
        inner.deletion_history.get_or_insert_with(Vec::new);
        Self { inner }
    }

    fn history(&self) -> &[(Tick, EntityUid)] {
        self.inner.deletion_history.as_deref().unwrap_or_default()
    }

    /// States of every entity modified at or after `from_tick`, carrying
    /// only the components modified since then.
    ///
    /// # Errors
    ///
    /// Propagates component state encoding failures.
    pub fn get_entity_states(&self, from_tick: Tick) -> Result<Vec<EntityState>, WorldError> {
        let mut states = Vec::new();
        for entity in self.inner.entities() {
            let component_states = self.inner.components().get_component_states(entity.uid(), from_tick)?;
            if entity.last_modified_tick() < from_tick && component_states.is_empty() {
                continue;
            }
            states.push(EntityState {
                uid: entity.uid(),
                prototype: entity.prototype().map(str::to_string),
                component_states,
            });
        }
        Ok(states)
    }

    /// Entities deleted at or after `from_tick`.
    #[must_use]
    pub fn get_deleted_entities(&self, from_tick: Tick) -> Vec<EntityUid> {
        self.history()
            .iter()
            .filter(|(tick, _)| *tick >= from_tick)
            .map(|(_, uid)| *uid)
            .collect()
    }

    /// Forget entity, grid and map deletions at or before `to_tick`.
    pub fn cull_deletion_history(&mut self, to_tick: Tick) {
        let mut culled = 0;
        if let Some(history) = &mut self.inner.deletion_history {
            let before = history.len();
            history.retain(|(tick, _)| *tick > to_tick);
            culled = before - history.len();
        }
        self.inner.maps_mut().cull_deletion_history(to_tick);
        if culled > 0 {
            trace!(to_tick, culled, "culled deletion history");
        }
    }

    #[must_use]
    pub fn deletion_history_len(&self) -> usize {
        self.history().len()
    }

    /// The delta from `from_tick` to the current tick.
    ///
    /// # Errors
    ///
    /// Propagates component state encoding failures.
    pub fn get_game_state(&self, from_tick: Tick) -> Result<GameState, WorldError> {
        Ok(GameState {
            from_tick,
            to_tick: self.inner.current_tick(),
            entity_states: self.get_entity_states(from_tick)?,
            deleted_entities: self.get_deleted_entities(from_tick),
            map_data: self.inner.maps().get_state_data(from_tick),
        })
    }

    #[must_use]
    pub fn into_inner(self) -> EntityManager {
        self.inner
    }
}

impl Deref for ServerEntityManager {
    type Target = EntityManager;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ServerEntityManager {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Physics, shared_builtin_factory};
    use crate::prototype::PrototypeIndex;
    use sim_math::{TRANSFORM_NET_ID, Vec2};

    fn server() -> ServerEntityManager {
        let mut prototypes = PrototypeIndex::new();
        prototypes
            .load_json(r#"[{ "id": "ball", "components": [ { "type": "Physics" } ] }]"#)
            .unwrap();
        ServerEntityManager::new(shared_builtin_factory().unwrap(), Arc::new(prototypes))
    }

    #[test]
    fn test_states_only_include_changes_since_cursor() {
        let mut em = server();
        em.tick();
        let a = em.create_entity(Some("ball")).unwrap();
        em.set_current_tick(3);
        let b = em.create_entity(Some("ball")).unwrap();
        em.set_current_tick(5);
        em.set_local_position(a, Vec2::new(4.0, 0.0)).unwrap();

        let states = em.get_entity_states(4).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].uid, a);
        assert_eq!(states[0].prototype.as_deref(), Some("ball"));
        let net_ids: Vec<_> = states[0].component_states.iter().map(|s| s.net_id).collect();
        assert_eq!(net_ids, vec![TRANSFORM_NET_ID]);

        let everything = em.get_entity_states(0).unwrap();
        assert_eq!(everything.iter().map(|s| s.uid).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(everything[1].component_states.len(), 2);
    }

    #[test]
    fn test_component_dirtied_directly_is_sent() {
        let mut em = server();
        let uid = em.create_entity(Some("ball")).unwrap();
        em.set_current_tick(8);
        em.components_mut().mark_dirty(uid, <Physics as sim_component::ComponentKind>::kind_id());

        let states = em.get_entity_states(8).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].component_states.len(), 1);
    }

    #[test]
    fn test_deletion_history() {
        let mut em = server();
        let first = em.create_entity(None).unwrap();
        let second = em.create_entity(None).unwrap();
        em.set_current_tick(2);
        em.delete_entity(first);
        em.set_current_tick(6);
        em.delete_entity(second);
        assert!(!em.delete_entity(second));

        assert_eq!(em.get_deleted_entities(0), vec![first, second]);
        assert_eq!(em.get_deleted_entities(3), vec![second]);

        em.cull_deletion_history(2);
        assert_eq!(em.deletion_history_len(), 1);
        assert_eq!(em.get_deleted_entities(0), vec![second]);
    }

    #[test]
    fn test_game_state_spans_cursor_to_now() {
        let mut em = server();
        em.maps_mut().create_map(None).unwrap();
        em.tick();
        em.create_entity(None).unwrap();

        let state = em.get_game_state(0).unwrap();
        assert_eq!(state.from_tick, 0);
        assert_eq!(state.to_tick, 1);
        assert_eq!(state.entity_states.len(), 1);
        assert_eq!(state.map_data.created_maps.len(), 1);

        em.tick();
        assert!(em.get_game_state(2).unwrap().is_empty());
    }
}
