//! Entity records.

use sim_component::{EntityUid, Tick};

/// Bookkeeping for one entity. Its components live in the
/// [`ComponentManager`](sim_component::ComponentManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    uid: EntityUid,
    prototype: Option<String>,
    name: String,
    last_modified_tick: Tick,
    initialized: bool,
    deleted: bool,
}

impl Entity {
    /// A fresh, uninitialized entity.
    #[must_use]
    pub fn new(uid: EntityUid, prototype: Option<String>, name: String, tick: Tick) -> Self {
        Self {
            uid,
            prototype,
            name,
            last_modified_tick: tick,
            initialized: false,
            deleted: false,
        }
    }

    #[must_use]
    pub fn uid(&self) -> EntityUid {
        self.uid
    }

    /// The prototype this entity was instantiated from.
    #[must_use]
    pub fn prototype(&self) -> Option<&str> {
        self.prototype.as_deref()
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Newest modification tick of the entity or any of its components.
    #[must_use]
    pub fn last_modified_tick(&self) -> Tick {
        self.last_modified_tick
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Raise the modification tick. Never moves backwards.
    pub fn mark_modified(&mut self, tick: Tick) {
        self.last_modified_tick = self.last_modified_tick.max(tick);
    }

    pub(crate) fn set_initialized(&mut self) {
        self.initialized = true;
    }

    pub(crate) fn set_deleted(&mut self) {
        self.deleted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modified_tick_is_monotonic() {
        let mut entity = Entity::new(EntityUid(1), None, "thing".into(), 5);
        entity.mark_modified(3);
        assert_eq!(entity.last_modified_tick(), 5);
        entity.mark_modified(8);
        assert_eq!(entity.last_modified_tick(), 8);
    }

    #[test]
    fn test_new_entity_flags() {
        let entity = Entity::new(EntityUid(2), Some("crate".into()), "Crate".into(), 0);
        assert!(!entity.is_initialized());
        assert!(!entity.is_deleted());
        assert_eq!(entity.prototype(), Some("crate"));
    }
}
