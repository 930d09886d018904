//! Component-layer error types.

use crate::component::{ComponentTypeId, NetId};
use crate::entity::EntityUid;

/// Errors that can occur while registering, storing or replicating components.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// The component's owner does not match the entity it is being added to.
    #[error("component {component} is owned by {owner}, cannot add it to {entity}")]
    OwnerMismatch {
        component: &'static str,
        entity: EntityUid,
        owner: EntityUid,
    },

    /// Another component on the entity already claims this role.
    #[error("{entity} already has a component for role {role}")]
    DuplicateRole {
        entity: EntityUid,
        role: &'static str,
    },

    /// Another component on the entity already uses this network id.
    #[error("{entity} already has a component with net id {net_id}")]
    DuplicateNetId { entity: EntityUid, net_id: NetId },

    /// No component kind with this name has been registered.
    #[error("component '{0}' is not registered")]
    UnregisteredComponent(String),

    /// The entity holds no component of the requested kind.
    #[error("{entity} has no '{component}' component")]
    MissingComponent {
        entity: EntityUid,
        component: &'static str,
    },

    /// No registered component kind claims this role.
    #[error("role {0} is not registered")]
    UnregisteredRole(ComponentTypeId),

    /// A component kind was registered twice.
    #[error("component '{0}' is already registered")]
    DuplicateRegistration(&'static str),

    /// Two component kinds share one network id.
    #[error("net id {net_id} is already taken by '{existing}'")]
    NetIdTaken { net_id: NetId, existing: &'static str },

    /// Failed to encode a component state.
    #[error("failed to encode state for net id {net_id}: {message}")]
    StateEncode { net_id: NetId, message: String },

    /// Failed to decode a component state.
    #[error("failed to decode state for net id {net_id}: {message}")]
    StateDecode { net_id: NetId, message: String },

    /// A state was handed to a component of a different network type.
    #[error("state for net id {found} handed to component with net id {expected}")]
    StateMismatch { expected: NetId, found: NetId },

    /// A prototype field could not be applied to a component.
    #[error("invalid field '{field}' on component '{component}': {message}")]
    InvalidField {
        component: &'static str,
        field: String,
        message: String,
    },
}
