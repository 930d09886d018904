//! Notifications raised by entity and transform changes.
//!
//! The entity manager queues an [`EntityEvent`] for every move, rotation,
//! reparent and deletion. Consumers drain the queue once per tick with
//! [`EntityManager::drain_events`](crate::EntityManager::drain_events).

use sim_component::EntityUid;
use sim_math::{Angle, GridCoordinates};

/// Something that happened to an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityEvent {
    /// The entity's grid position changed.
    Moved {
        uid: EntityUid,
        old: GridCoordinates,
        new: GridCoordinates,
    },
    /// The entity's local rotation changed.
    Rotated { uid: EntityUid, old: Angle, new: Angle },
    /// The entity was attached to or detached from a parent.
    ParentChanged {
        uid: EntityUid,
        old: Option<EntityUid>,
        new: Option<EntityUid>,
    },
    /// The entity was deleted.
    Deleted { uid: EntityUid },
}

impl EntityEvent {
    /// The entity the event is about.
    #[must_use]
    pub fn uid(&self) -> EntityUid {
        match self {
            Self::Moved { uid, .. }
            | Self::Rotated { uid, .. }
            | Self::ParentChanged { uid, .. }
            | Self::Deleted { uid } => *uid,
        }
    }
}
