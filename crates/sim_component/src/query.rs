//! Entity query descriptors.
//!
//! An [`EntityQuery`] declares which entities a caller wants to visit. Systems
//! declare one at registration time; the entity manager evaluates it against
//! the component registry and returns a snapshot of matching uids.

use serde::{Deserialize, Serialize};

use crate::component::{ComponentKind, ComponentTypeId};

/// Selects entities by the roles of their components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityQuery {
    /// Every live entity.
    All,
    /// Entities holding a component that satisfies this role.
    Type(ComponentTypeId),
    /// Entities matching a combination of role sets.
    Components(ComponentSetQuery),
}

impl EntityQuery {
    /// Query for every live entity.
    #[must_use]
    pub fn all() -> Self {
        Self::All
    }

    /// Query for entities with a component satisfying `role`.
    #[must_use]
    pub fn of_role(role: ComponentTypeId) -> Self {
        Self::Type(role)
    }

    /// Query for entities holding component kind `T`.
    #[must_use]
    pub fn of<T: ComponentKind>() -> Self {
        Self::Type(T::kind_id())
    }

    /// Every role referenced by this query.
    #[must_use]
    pub fn roles(&self) -> Vec<ComponentTypeId> {
        match self {
            Self::All => Vec::new(),
            Self::Type(role) => vec![*role],
            Self::Components(set) => {
                let mut roles = Vec::new();
                roles.extend_from_slice(&set.all);
                roles.extend_from_slice(&set.exclusion);
                roles.extend_from_slice(&set.one);
                roles
            }
        }
    }

    /// Evaluate the query for one entity, given a predicate that reports
    /// whether the entity holds a component for a role.
    pub fn matches(&self, has_role: impl Fn(ComponentTypeId) -> bool) -> bool {
        match self {
            Self::All => true,
            Self::Type(role) => has_role(*role),
            Self::Components(set) => set.matches(has_role),
        }
    }
}

impl From<ComponentSetQuery> for EntityQuery {
    fn from(set: ComponentSetQuery) -> Self {
        Self::Components(set)
    }
}

/// Entities that hold every role in `all`, none in `exclusion`, and at least
/// one in `one` (the last check is skipped when `one` is empty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSetQuery {
    /// Roles that must all be present.
    pub all: Vec<ComponentTypeId>,
    /// Roles that must all be absent.
    pub exclusion: Vec<ComponentTypeId>,
    /// Roles of which at least one must be present.
    pub one: Vec<ComponentTypeId>,
}

impl ComponentSetQuery {
    /// Create a new empty set query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a role.
    #[must_use]
    pub fn with(mut self, role: ComponentTypeId) -> Self {
        self.all.push(role);
        self
    }

    /// Exclude a role.
    #[must_use]
    pub fn without(mut self, role: ComponentTypeId) -> Self {
        self.exclusion.push(role);
        self
    }

    /// Add a role to the any-of set.
    #[must_use]
    pub fn any_of(mut self, role: ComponentTypeId) -> Self {
        self.one.push(role);
        self
    }

    fn matches(&self, has_role: impl Fn(ComponentTypeId) -> bool) -> bool {
        if !self.all.iter().all(|role| has_role(*role)) {
            return false;
        }
        if self.exclusion.iter().any(|role| has_role(*role)) {
            return false;
        }
        self.one.is_empty() || self.one.iter().any(|role| has_role(*role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFORM: ComponentTypeId = ComponentTypeId::from_name("Transform");
    const PHYSICS: ComponentTypeId = ComponentTypeId::from_name("Physics");
    const SPRITE: ComponentTypeId = ComponentTypeId::from_name("Sprite");
    const ICON: ComponentTypeId = ComponentTypeId::from_name("Icon");

    fn holding(roles: &[ComponentTypeId]) -> impl Fn(ComponentTypeId) -> bool + '_ {
        move |role| roles.contains(&role)
    }

    #[test]
    fn test_all_matches_everything() {
        assert!(EntityQuery::all().matches(holding(&[])));
    }

    #[test]
    fn test_type_query() {
        let q = EntityQuery::of_role(PHYSICS);
        assert!(q.matches(holding(&[TRANSFORM, PHYSICS])));
        assert!(!q.matches(holding(&[TRANSFORM])));
    }

    #[test]
    fn test_set_query_all_and_exclusion() {
        let q: EntityQuery = ComponentSetQuery::new()
            .with(TRANSFORM)
            .without(PHYSICS)
            .into();
        assert!(q.matches(holding(&[TRANSFORM])));
        assert!(!q.matches(holding(&[TRANSFORM, PHYSICS])));
        assert!(!q.matches(holding(&[SPRITE])));
    }

    #[test]
    fn test_empty_one_set_is_ignored() {
        let q: EntityQuery = ComponentSetQuery::new().with(TRANSFORM).into();
        assert!(q.matches(holding(&[TRANSFORM])));
    }

    #[test]
    fn test_one_set_requires_any() {
        let q: EntityQuery = ComponentSetQuery::new()
            .with(TRANSFORM)
            .any_of(SPRITE)
            .any_of(ICON)
            .into();
        assert!(q.matches(holding(&[TRANSFORM, ICON])));
        assert!(!q.matches(holding(&[TRANSFORM])));
    }

    #[test]
    fn test_roles_lists_every_referenced_role() {
        let q: EntityQuery = ComponentSetQuery::new()
            .with(TRANSFORM)
            .without(PHYSICS)
            .any_of(SPRITE)
            .into();
        assert_eq!(q.roles(), vec![TRANSFORM, PHYSICS, SPRITE]);
        assert!(EntityQuery::all().roles().is_empty());
    }
}
