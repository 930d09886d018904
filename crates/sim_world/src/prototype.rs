//! Entity prototypes.
//!
//! Prototype files are parsed and their inheritance resolved elsewhere. The
//! entity manager only needs two things from them, captured by
//! [`PrototypeSource`]: a blank entity record for a prototype name, and the
//! application of the prototype's declared component fields to an entity.
//!
//! [`PrototypeIndex`] is the in-memory source used by the server and client:
//! a set of already-resolved JSON documents of the form
//!
//! ```json
//! { "id": "crate", "name": "Crate", "components": [ { "type": "Transform", "pos": [1.0, 2.0] } ] }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sim_component::{ComponentManager, EntityUid, FieldMap, Tick};
use tracing::debug;

use crate::entity::Entity;
use crate::error::WorldError;

/// Declared data of one component in a prototype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPrototype {
    /// Registered component name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Every other key of the document.
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// A resolved entity template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPrototype {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Template this one was derived from; informational once resolved.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub components: Vec<ComponentPrototype>,
    /// Placement categories such as `wall` or `pipe`. Two entities sharing
    /// a category cannot be spawned on the same snap point.
    #[serde(default)]
    pub snap: Vec<String>,
}

/// Where the entity manager gets entity templates from.
pub trait PrototypeSource: Send + Sync + std::fmt::Debug {
    /// A blank, uninitialized entity record for prototype `name`.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownPrototype`] if there is no such prototype.
    fn allocate(&self, name: &str, uid: EntityUid, tick: Tick) -> Result<Entity, WorldError>;

    /// Add the prototype's components to `uid` and load their declared
    /// fields.
    ///
    /// # Errors
    ///
    /// Fails on unknown prototypes, unregistered component names and
    /// invalid field data.
    fn apply_fields(&self, name: &str, uid: EntityUid, components: &mut ComponentManager) -> Result<(), WorldError>;

    /// Snap categories of prototype `name`; empty for unknown prototypes.
    fn snap_flags(&self, _name: &str) -> &[String] {
        &[]
    }
}

/// In-memory prototype store.
#[derive(Debug, Clone, Default)]
pub struct PrototypeIndex {
    prototypes: HashMap<String, EntityPrototype>,
}

impl PrototypeIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prototypes: HashMap::new(),
        }
    }

    /// Add or replace a prototype.
    pub fn insert(&mut self, prototype: EntityPrototype) {
        self.prototypes.insert(prototype.id.clone(), prototype);
    }

    /// Load a JSON array of prototype documents. Returns how many were read.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidPrototype`] if the document does not parse.
    pub fn load_json(&mut self, json: &str) -> Result<usize, WorldError> {
        let documents: Vec<EntityPrototype> = serde_json::from_str(json)?;
        let count = documents.len();
        for prototype in documents {
            self.insert(prototype);
        }
        debug!(count, "loaded prototypes");
        Ok(count)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntityPrototype> {
        self.prototypes.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    fn prototype(&self, name: &str) -> Result<&EntityPrototype, WorldError> {
        self.prototypes
            .get(name)
            .ok_or_else(|| WorldError::UnknownPrototype(name.to_string()))
    }
}

impl PrototypeSource for PrototypeIndex {
    fn snap_flags(&self, name: &str) -> &[String] {
        self.prototypes
            .get(name)
            .map(|prototype| prototype.snap.as_slice())
            .unwrap_or_default()
    }

    fn allocate(&self, name: &str, uid: EntityUid, tick: Tick) -> Result<Entity, WorldError> {
        let prototype = self.prototype(name)?;
        let display = prototype.name.clone().unwrap_or_else(|| prototype.id.clone());
        Ok(Entity::new(uid, Some(prototype.id.clone()), display, tick))
    }

    fn apply_fields(&self, name: &str, uid: EntityUid, components: &mut ComponentManager) -> Result<(), WorldError> {
        let prototype = self.prototype(name)?;
        for declared in &prototype.components {
            let registration = components
                .factory()
                .registration_by_name(&declared.kind)
                .ok_or_else(|| sim_component::ComponentError::UnregisteredComponent(declared.kind.clone()))?;
            let kind = registration.kind;
            if !components.has_component(uid, kind) {
                components.add_default_component(uid, &declared.kind, false)?;
            }
            if let Some(component) = components
                .get_components(uid, kind)
                .first()
                .and_then(|key| components.component_mut(*key))
            {
                component.expose_data(&declared.fields)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_json() {
        let mut index = PrototypeIndex::new();
        let count = index
            .load_json(
                r#"[
                    { "id": "crate", "name": "Crate", "components": [ { "type": "Transform", "pos": [1.0, 2.0] } ] },
                    { "id": "marker" }
                ]"#,
            )
            .unwrap();
        assert_eq!(count, 2);
        let crate_proto = index.get("crate").unwrap();
        assert_eq!(crate_proto.components[0].kind, "Transform");
        assert!(crate_proto.components[0].fields.contains_key("pos"));
        assert!(index.get("marker").unwrap().components.is_empty());
    }

    #[test]
    fn test_snap_flags() {
        let mut index = PrototypeIndex::new();
        index.load_json(r#"[{ "id": "wire", "snap": ["wire"] }, { "id": "crate" }]"#).unwrap();
        assert_eq!(index.snap_flags("wire"), ["wire".to_string()]);
        assert!(index.snap_flags("crate").is_empty());
        assert!(index.snap_flags("ghost").is_empty());
    }

    #[test]
    fn test_allocate_unknown_prototype() {
        let index = PrototypeIndex::new();
        assert!(matches!(
            index.allocate("ghost", EntityUid(1), 0),
            Err(WorldError::UnknownPrototype(_))
        ));
    }

    #[test]
    fn test_allocate_uses_display_name() {
        let mut index = PrototypeIndex::new();
        index.load_json(r#"[{ "id": "crate", "name": "Crate" }, { "id": "wall" }]"#).unwrap();
        assert_eq!(index.allocate("crate", EntityUid(1), 0).unwrap().name(), "Crate");
        assert_eq!(index.allocate("wall", EntityUid(2), 0).unwrap().name(), "wall");
    }
}
