//! Registration of component kinds.
//!
//! Every component type that may live in a [`ComponentManager`] must first be
//! registered here. A registration records the component's name, network id,
//! full role list and a constructor used when instantiating prototypes.
//!
//! The factory is filled at startup and then shared read-only behind an
//! `Arc`.
//!
//! [`ComponentManager`]: crate::manager::ComponentManager

use std::collections::HashMap;

use crate::component::{Component, ComponentKind, ComponentTypeId, NetId};
use crate::error::ComponentError;

/// Static metadata for one registered component kind.
#[derive(Debug, Clone)]
pub struct ComponentRegistration {
    /// Concrete component name.
    pub name: &'static str,
    /// Id of the concrete name.
    pub kind: ComponentTypeId,
    /// Network id, if the kind is replicated.
    pub net_id: Option<NetId>,
    /// Every role the kind satisfies; always includes `kind` first.
    pub roles: Vec<ComponentTypeId>,
    constructor: fn() -> Box<dyn Component>,
}

impl ComponentRegistration {
    /// Instantiate a default component of this kind.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn Component> {
        (self.constructor)()
    }
}

fn construct<T: ComponentKind + Default>() -> Box<dyn Component> {
    Box::new(T::default())
}

/// Registry of component kinds, keyed by name, id and network id.
#[derive(Debug, Default)]
pub struct ComponentFactory {
    by_kind: HashMap<ComponentTypeId, ComponentRegistration>,
    by_name: HashMap<&'static str, ComponentTypeId>,
    by_net_id: HashMap<NetId, ComponentTypeId>,
    role_names: HashMap<ComponentTypeId, &'static str>,
}

impl ComponentFactory {
    /// Create an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register component kind `T`.
    ///
    /// # Errors
    ///
    /// Fails if the name is already registered or the network id is taken.
    pub fn register<T: ComponentKind + Default>(&mut self) -> Result<(), ComponentError> {
        let kind = T::kind_id();
        if self.by_kind.contains_key(&kind) {
            return Err(ComponentError::DuplicateRegistration(T::NAME));
        }
        if let Some(net_id) = T::NET_ID
            && let Some(existing) = self.by_net_id.get(&net_id)
        {
            return Err(ComponentError::NetIdTaken {
                net_id,
                existing: self.by_kind.get(existing).map_or("<unknown>", |r| r.name),
            });
        }

        let mut roles = vec![kind];
        self.role_names.insert(kind, T::NAME);
        for role in T::ROLES {
            let id = ComponentTypeId::from_name(role);
            if !roles.contains(&id) {
                roles.push(id);
            }
            self.role_names.insert(id, role);
        }

        if let Some(net_id) = T::NET_ID {
            self.by_net_id.insert(net_id, kind);
        }
        self.by_name.insert(T::NAME, kind);
        self.by_kind.insert(
            kind,
            ComponentRegistration {
                name: T::NAME,
                kind,
                net_id: T::NET_ID,
                roles,
                constructor: construct::<T>,
            },
        );
        tracing::debug!(component = T::NAME, net_id = ?T::NET_ID, "registered component");
        Ok(())
    }

    /// Registration for a concrete kind id.
    #[must_use]
    pub fn registration(&self, kind: ComponentTypeId) -> Option<&ComponentRegistration> {
        self.by_kind.get(&kind)
    }

    /// Registration by component name.
    #[must_use]
    pub fn registration_by_name(&self, name: &str) -> Option<&ComponentRegistration> {
        self.by_name.get(name).and_then(|kind| self.by_kind.get(kind))
    }

    /// Registration by network id.
    #[must_use]
    pub fn registration_by_net_id(&self, net_id: NetId) -> Option<&ComponentRegistration> {
        self.by_net_id.get(&net_id).and_then(|kind| self.by_kind.get(kind))
    }

    /// Component name for a network id.
    #[must_use]
    pub fn name_for_net_id(&self, net_id: NetId) -> Option<&'static str> {
        self.registration_by_net_id(net_id).map(|r| r.name)
    }

    /// Returns `true` if some registered kind claims `role`.
    #[must_use]
    pub fn is_role_registered(&self, role: ComponentTypeId) -> bool {
        self.role_names.contains_key(&role)
    }

    /// Human-readable name of a role, for diagnostics.
    #[must_use]
    pub fn role_name(&self, role: ComponentTypeId) -> &'static str {
        self.role_names.get(&role).copied().unwrap_or("<unknown>")
    }

    /// Instantiate a default component by name.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::UnregisteredComponent`] for unknown names.
    pub fn create(&self, name: &str) -> Result<Box<dyn Component>, ComponentError> {
        self.registration_by_name(name)
            .map(ComponentRegistration::instantiate)
            .ok_or_else(|| ComponentError::UnregisteredComponent(name.to_string()))
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityUid;

    #[derive(Debug, Default)]
    struct Sprite {
        owner: EntityUid,
    }

    impl Component for Sprite {
        fn owner(&self) -> EntityUid {
            self.owner
        }

        fn set_owner(&mut self, owner: EntityUid) {
            self.owner = owner;
        }
    }

    impl ComponentKind for Sprite {
        const NAME: &'static str = "Sprite";
        const NET_ID: Option<NetId> = Some(10);
        const ROLES: &'static [&'static str] = &["Renderable"];
    }

    #[derive(Debug, Default)]
    struct Icon {
        owner: EntityUid,
    }

    impl Component for Icon {
        fn owner(&self) -> EntityUid {
            self.owner
        }

        fn set_owner(&mut self, owner: EntityUid) {
            self.owner = owner;
        }
    }

    impl ComponentKind for Icon {
        const NAME: &'static str = "Icon";
        const NET_ID: Option<NetId> = Some(10);
    }

    #[test]
    fn test_register_records_roles_and_net_id() {
        let mut factory = ComponentFactory::new();
        factory.register::<Sprite>().unwrap();

        let reg = factory.registration_by_name("Sprite").unwrap();
        assert_eq!(reg.roles[0], ComponentTypeId::from_name("Sprite"));
        assert!(reg.roles.contains(&ComponentTypeId::from_name("Renderable")));
        assert_eq!(factory.name_for_net_id(10), Some("Sprite"));
        assert!(factory.is_role_registered(ComponentTypeId::from_name("Renderable")));
        assert_eq!(factory.role_name(ComponentTypeId::from_name("Renderable")), "Renderable");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut factory = ComponentFactory::new();
        factory.register::<Sprite>().unwrap();
        assert!(matches!(
            factory.register::<Sprite>(),
            Err(ComponentError::DuplicateRegistration("Sprite"))
        ));
    }

    #[test]
    fn test_net_id_collision_rejected() {
        let mut factory = ComponentFactory::new();
        factory.register::<Sprite>().unwrap();
        assert!(matches!(
            factory.register::<Icon>(),
            Err(ComponentError::NetIdTaken { net_id: 10, existing: "Sprite" })
        ));
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn test_create_by_name() {
        let mut factory = ComponentFactory::new();
        factory.register::<Sprite>().unwrap();
        let component = factory.create("Sprite").unwrap();
        assert_eq!(component.owner(), EntityUid::INVALID);
        assert!(matches!(
            factory.create("Missing"),
            Err(ComponentError::UnregisteredComponent(_))
        ));
    }
}
