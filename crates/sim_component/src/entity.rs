//! Entity identifiers and allocation.
//!
//! An [`EntityUid`] is an opaque `u64` handle with no data of its own. Uids
//! are handed out in increasing order and never recycled within a session, so
//! a uid is also a stable key into the entity arena: a stale uid can never
//! alias a newer entity.

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EntityUid(pub u64);

impl EntityUid {
    /// The null / invalid entity sentinel.
    pub const INVALID: EntityUid = EntityUid(0);

    /// The last uid of the space. Never assigned, so the allocator can
    /// always move past an observed uid.
    pub const RESERVED: EntityUid = EntityUid(u64::MAX);

    /// Create a uid from a raw `u64` identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) uid.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for EntityUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntityUid({})", self.0)
    }
}

/// Allocates monotonically increasing entity uids.
///
/// The server's allocator is the single source of truth for entity identity.
/// Clients never allocate for replicated entities; they adopt the server's
/// uids through [`EntityAllocator::observe`] so that any client-local entities
/// cannot collide with them.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: u64,
}

impl EntityAllocator {
    /// Creates a new allocator. Uids start at 1 (0 is reserved for [`EntityUid::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    /// Allocates a fresh uid, or `None` once the uid space is used up.
    pub fn allocate(&mut self) -> Option<EntityUid> {
        let id = self.next_id;
        if id == EntityUid::RESERVED.0 {
            return None;
        }
        self.next_id = id + 1;
        Some(EntityUid(id))
    }

    /// Records a uid chosen elsewhere, moving the counter past it. Returns
    /// `false` for [`EntityUid::RESERVED`], which can never be assigned.
    pub fn observe(&mut self, uid: EntityUid) -> bool {
        let Some(next) = uid.0.checked_add(1) else {
            return false;
        };
        if next > self.next_id {
            self.next_id = next;
        }
        true
    }

    /// Returns the number of uids handed out or observed so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_creation() {
        let e = EntityUid::from_raw(42);
        assert_eq!(e.id(), 42);
        assert!(e.is_valid());
    }

    #[test]
    fn test_uid_invalid() {
        assert!(!EntityUid::INVALID.is_valid());
        assert_eq!(EntityUid::default(), EntityUid::INVALID);
    }

    #[test]
    fn test_allocator_is_monotonic() {
        let mut alloc = EntityAllocator::new();
        let e1 = alloc.allocate().unwrap();
        let e2 = alloc.allocate().unwrap();
        let e3 = alloc.allocate().unwrap();
        assert_eq!((e1.id(), e2.id(), e3.id()), (1, 2, 3));
        assert_eq!(alloc.count(), 3);
    }

    #[test]
    fn test_observe_skips_past_foreign_uid() {
        let mut alloc = EntityAllocator::new();
        assert!(alloc.observe(EntityUid(10)));
        assert_eq!(alloc.allocate(), Some(EntityUid(11)));

        // Observing an older uid never moves the counter backwards.
        assert!(alloc.observe(EntityUid(3)));
        assert_eq!(alloc.allocate(), Some(EntityUid(12)));
    }

    #[test]
    fn test_observe_rejects_last_uid() {
        let mut alloc = EntityAllocator::new();
        assert!(!alloc.observe(EntityUid(u64::MAX)));
        assert_eq!(alloc.allocate(), Some(EntityUid(1)));
    }

    #[test]
    fn test_allocate_stops_at_end_of_space() {
        let mut alloc = EntityAllocator::new();
        assert!(alloc.observe(EntityUid(u64::MAX - 2)));
        assert_eq!(alloc.allocate(), Some(EntityUid(u64::MAX - 1)));
        assert_eq!(alloc.allocate(), None);
        assert_eq!(alloc.allocate(), None);
    }

    #[test]
    fn test_uid_serialization_roundtrip() {
        let uid = EntityUid::from_raw(999);
        let bytes = rmp_serde::to_vec(&uid).unwrap();
        let restored: EntityUid = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(uid, restored);
    }
}
