//! Core [`Component`] trait, static component identity, and wire state.
//!
//! A component is split across two traits:
//!
//! - [`Component`] is object-safe. The registry stores every component as a
//!   `Box<dyn Component>` and drives its lifecycle and replication hooks
//!   through it.
//! - [`ComponentKind`] carries the static identity of a concrete type: its
//!   name, optional network id, and the extra roles it satisfies.
//!
//! ## Type identity
//!
//! [`ComponentTypeId`] is derived from a **string name** using the FNV-1a
//! 64-bit hash, so concrete types and abstract roles share one id space and
//! any peer can compute the same id for the same name.

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::entity::EntityUid;
use crate::error::ComponentError;

/// A simulation tick. The replication cursor unit.
pub type Tick = u64;

/// Identifies a replicated component type on the wire.
pub type NetId = u32;

/// Declared prototype field data handed to [`Component::expose_data`].
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// A unique identifier for a component type or role, derived from its string
/// name using the FNV-1a 64-bit hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the id for a component or role name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// The id of a concrete component type `T`.
    #[must_use]
    pub fn of<T: ComponentKind>() -> Self {
        Self::from_name(T::NAME)
    }
}

impl std::fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// The object-safe component contract.
///
/// Every component belongs to exactly one entity, its owner. The registry
/// refuses a component whose owner differs from the entity it is added to.
pub trait Component: Any + Send + Sync + std::fmt::Debug {
    /// The entity this component belongs to.
    fn owner(&self) -> EntityUid;

    /// Reassign the owning entity. Called by entity construction code only.
    fn set_owner(&mut self, owner: EntityUid);

    /// Called once the owning entity has all of its components.
    fn initialize(&mut self) {}

    /// Called after [`Component::initialize`] on every component of the entity.
    fn startup(&mut self) {}

    /// Called when the component is removed or its entity is deleted.
    fn shutdown(&mut self) {}

    /// Produce an immutable snapshot for replication.
    ///
    /// Components without a network id keep the default, which replicates
    /// nothing.
    fn get_component_state(&self) -> Result<Option<ComponentState>, ComponentError> {
        Ok(None)
    }

    /// Apply a snapshot received from the authoritative side.
    fn handle_component_state(&mut self, _state: &ComponentState) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Load declared field data from a prototype.
    fn expose_data(&mut self, _fields: &FieldMap) -> Result<(), ComponentError> {
        Ok(())
    }
}

/// Static identity of a concrete component type.
///
/// # Examples
///
/// ```rust
/// use sim_component::{Component, ComponentKind, EntityUid};
///
/// #[derive(Debug, Default)]
/// struct Health {
///     owner: EntityUid,
///     current: f32,
/// }
///
/// impl Component for Health {
///     fn owner(&self) -> EntityUid { self.owner }
///     fn set_owner(&mut self, owner: EntityUid) { self.owner = owner; }
/// }
///
/// impl ComponentKind for Health {
///     const NAME: &'static str = "Health";
///     const ROLES: &'static [&'static str] = &["Damageable"];
/// }
/// ```
pub trait ComponentKind: Component + Sized {
    /// Concrete component name; unique within an entity.
    const NAME: &'static str;

    /// Network id, present only for replicated component types.
    const NET_ID: Option<NetId> = None;

    /// Abstract roles this type satisfies in addition to its own name.
    const ROLES: &'static [&'static str] = &[];

    /// The [`ComponentTypeId`] of this concrete type.
    fn kind_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::NAME)
    }
}

/// An immutable replication snapshot of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    /// The network id of the component type that produced this state.
    pub net_id: NetId,
    /// MessagePack-encoded state body.
    pub data: Vec<u8>,
}

impl ComponentState {
    /// Encode a state body for the given network id.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::StateEncode`] if serialisation fails.
    pub fn encode<T: Serialize>(net_id: NetId, body: &T) -> Result<Self, ComponentError> {
        let data = rmp_serde::to_vec_named(body)
            .map_err(|e| ComponentError::StateEncode { net_id, message: e.to_string() })?;
        Ok(Self { net_id, data })
    }

    /// Decode the state body, checking it was produced for `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::StateMismatch`] when the net ids differ and
    /// [`ComponentError::StateDecode`] when the payload is malformed.
    pub fn decode<T: DeserializeOwned>(&self, expected: NetId) -> Result<T, ComponentError> {
        if self.net_id != expected {
            return Err(ComponentError::StateMismatch {
                expected,
                found: self.net_id,
            });
        }
        rmp_serde::from_slice(&self.data).map_err(|e| ComponentError::StateDecode {
            net_id: self.net_id,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Health {
        owner: EntityUid,
    }

    impl Component for Health {
        fn owner(&self) -> EntityUid {
            self.owner
        }

        fn set_owner(&mut self, owner: EntityUid) {
            self.owner = owner;
        }
    }

    impl ComponentKind for Health {
        const NAME: &'static str = "Health";
    }

    #[test]
    fn test_kind_id_matches_from_name() {
        assert_eq!(Health::kind_id(), ComponentTypeId::from_name("Health"));
        assert_eq!(ComponentTypeId::of::<Health>(), Health::kind_id());
    }

    #[test]
    fn test_type_ids_differ_between_names() {
        assert_ne!(
            ComponentTypeId::from_name("Health"),
            ComponentTypeId::from_name("Velocity")
        );
    }

    #[test]
    fn test_fnv1a_known_vector() {
        // FNV-1a 64-bit of empty string is the offset basis itself.
        assert_eq!(
            ComponentTypeId::from_name(""),
            ComponentTypeId(0xcbf2_9ce4_8422_2325)
        );
    }

    #[test]
    fn test_default_hooks_replicate_nothing() {
        let health = Health::default();
        assert!(health.get_component_state().unwrap().is_none());
    }

    #[test]
    fn test_state_decode_checks_net_id() {
        let state = ComponentState::encode(7, &(1.0f32, 2.0f32)).unwrap();
        let body: (f32, f32) = state.decode(7).unwrap();
        assert_eq!(body, (1.0, 2.0));

        let err = state.decode::<(f32, f32)>(8).unwrap_err();
        assert!(matches!(err, ComponentError::StateMismatch { expected: 8, found: 7 }));
    }

    #[test]
    fn test_state_decode_rejects_garbage() {
        let state = ComponentState {
            net_id: 3,
            data: vec![0xc1],
        };
        let err = state.decode::<(f32, f32)>(3).unwrap_err();
        assert!(matches!(err, ComponentError::StateDecode { net_id: 3, .. }));
    }
}
