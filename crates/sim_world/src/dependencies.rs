//! Explicit dependency context.
//!
//! Long-lived services (configuration, the component factory, prototypes)
//! are registered once into a [`DependencyCollection`] at startup. Building
//! it consumes the collection, so nothing can be registered afterwards, and
//! yields a cheap-to-clone [`Dependencies`] handle that is passed to the
//! constructors that need it.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::DependencyError;

type Singleton = Arc<dyn Any + Send + Sync>;

/// Registration phase of the dependency context.
#[derive(Debug, Default)]
pub struct DependencyCollection {
    singletons: HashMap<TypeId, (&'static str, Singleton)>,
}

impl DependencyCollection {
    #[must_use]
    pub fn new() -> Self {
        Self {
            singletons: HashMap::new(),
        }
    }

    /// Register the singleton for type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError::AlreadyRegistered`] if `T` already has one.
    pub fn register<T: Any + Send + Sync>(&mut self, value: T) -> Result<(), DependencyError> {
        self.register_arc(Arc::new(value))
    }

    /// Register an already shared singleton for type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError::AlreadyRegistered`] if `T` already has one.
    pub fn register_arc<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> Result<(), DependencyError> {
        let name = type_name::<T>();
        if self.singletons.contains_key(&TypeId::of::<T>()) {
            return Err(DependencyError::AlreadyRegistered(name));
        }
        self.singletons.insert(TypeId::of::<T>(), (name, value));
        debug!(dependency = name, "registered dependency");
        Ok(())
    }

    /// Finish registration.
    #[must_use]
    pub fn build(self) -> Dependencies {
        Dependencies {
            singletons: Arc::new(self.singletons),
        }
    }
}

/// Built, read-only dependency context.
#[derive(Debug, Clone)]
pub struct Dependencies {
    singletons: Arc<HashMap<TypeId, (&'static str, Singleton)>>,
}

impl Dependencies {
    /// The singleton for type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError::Unregistered`] if nothing was registered.
    pub fn resolve<T: Any + Send + Sync>(&self) -> Result<Arc<T>, DependencyError> {
        self.try_resolve::<T>()
            .ok_or(DependencyError::Unregistered(type_name::<T>()))
    }

    /// The singleton for type `T`, if registered.
    #[must_use]
    pub fn try_resolve<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let (_, singleton) = self.singletons.get(&TypeId::of::<T>())?;
        Arc::clone(singleton).downcast::<T>().ok()
    }

    /// Number of registered singletons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.singletons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.singletons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Settings {
        rate: u32,
    }

    #[test]
    fn test_resolve_registered() {
        let mut collection = DependencyCollection::new();
        collection.register(Settings { rate: 30 }).unwrap();
        let deps = collection.build();
        assert_eq!(deps.resolve::<Settings>().unwrap().rate, 30);
        assert_eq!(deps.len(), 1);
    }

    #[test]
    fn test_resolve_unregistered_fails() {
        let deps = DependencyCollection::new().build();
        assert!(matches!(deps.resolve::<Settings>(), Err(DependencyError::Unregistered(_))));
        assert!(deps.try_resolve::<Settings>().is_none());
    }

    #[test]
    fn test_double_registration_fails() {
        let mut collection = DependencyCollection::new();
        collection.register(Settings { rate: 1 }).unwrap();
        assert!(matches!(
            collection.register(Settings { rate: 2 }),
            Err(DependencyError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn test_clones_share_singletons() {
        let mut collection = DependencyCollection::new();
        collection.register(Settings { rate: 5 }).unwrap();
        let deps = collection.build();
        let other = deps.clone();
        assert!(Arc::ptr_eq(&deps.resolve::<Settings>().unwrap(), &other.resolve::<Settings>().unwrap()));
    }
}
