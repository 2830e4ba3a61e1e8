//! Process-wide dependency container with positional injection
//!
//! Dependencies are registered by name before the listener starts and are
//! immutable afterwards. Handlers and hooks may declare the subset of names
//! they consume; the pipeline hands them a projection restricted to that
//! subset, otherwise the whole container.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Write-once name → instance mapping
#[derive(Default)]
pub struct DependencyContainer {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl DependencyContainer {
    /// Create an empty container
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dependency under a name, replacing any previous value
    pub fn provide<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.entries.insert(name.into(), Arc::new(value));
    }

    /// Register an already-shared dependency
    pub fn provide_arc<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.entries.insert(name.into(), value);
    }

    /// Names of all registered dependencies
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered dependencies
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the container is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .get(name)
            .and_then(|value| value.clone().downcast::<T>().ok())
    }
}

impl std::fmt::Debug for DependencyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyContainer")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// View over the container handed to middleware, hooks, and handlers
///
/// Cloning is cheap; the view shares the frozen container. When a route
/// declares `inject`, the view only resolves those names.
#[derive(Clone)]
pub struct Deps {
    container: Arc<DependencyContainer>,
    subset: Option<Arc<[String]>>,
}

impl Deps {
    /// Full view over a container
    pub fn all(container: Arc<DependencyContainer>) -> Self {
        Self {
            container,
            subset: None,
        }
    }

    /// Projection restricted to the given names
    pub fn subset(container: Arc<DependencyContainer>, names: Arc<[String]>) -> Self {
        Self {
            container,
            subset: Some(names),
        }
    }

    /// Whether a name is visible through this view
    pub fn contains(&self, name: &str) -> bool {
        self.visible(name) && self.container.entries.contains_key(name)
    }

    /// Resolve a dependency by name and type
    ///
    /// Returns `None` when the name is absent, hidden by the projection, or
    /// registered under a different type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        if !self.visible(name) {
            tracing::debug!(
                dependency = name,
                "Dependency not in the route's inject list"
            );
            return None;
        }
        self.container.lookup::<T>(name)
    }

    fn visible(&self, name: &str) -> bool {
        match &self.subset {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}

impl std::fmt::Debug for Deps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deps")
            .field("subset", &self.subset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Database {
        dsn: String,
    }

    fn container() -> Arc<DependencyContainer> {
        let mut container = DependencyContainer::new();
        container.provide(
            "db",
            Database {
                dsn: "postgres://localhost".to_string(),
            },
        );
        container.provide("greeting", "hello".to_string());
        Arc::new(container)
    }

    #[test]
    fn test_full_view_resolves_by_name_and_type() {
        let deps = Deps::all(container());
        let db = deps.get::<Database>("db").unwrap();
        assert_eq!(db.dsn, "postgres://localhost");
        assert_eq!(*deps.get::<String>("greeting").unwrap(), "hello");
    }

    #[test]
    fn test_wrong_type_is_none() {
        let deps = Deps::all(container());
        assert!(deps.get::<u32>("db").is_none());
    }

    #[test]
    fn test_missing_name_is_none() {
        let deps = Deps::all(container());
        assert!(deps.get::<String>("cache").is_none());
        assert!(!deps.contains("cache"));
    }

    #[test]
    fn test_subset_projection_hides_other_names() {
        let names: Arc<[String]> = Arc::from(vec!["greeting".to_string()]);
        let deps = Deps::subset(container(), names);
        assert!(deps.get::<String>("greeting").is_some());
        assert!(deps.get::<Database>("db").is_none());
        assert!(!deps.contains("db"));
    }
}
