//! Singleton and request-scoped state stores
//!
//! A store type declares its initial state; the registry owns one singleton
//! instance per registered type (created on first access, disposed at
//! application shutdown) and hands out per-request instances that are
//! disposed together when the request completes.

use dashmap::DashMap;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::sync::Arc;

use crate::error::{Error, Result};

/// State container registered with the application
///
/// # Example
///
/// ```rust
/// use nexus_service::store::Store;
/// use serde_json::{json, Value};
///
/// struct RequestCounter;
///
/// impl Store for RequestCounter {
///     fn initial() -> Value {
///         json!({ "count": 0 })
///     }
/// }
/// ```
pub trait Store: Send + Sync + 'static {
    /// Initial state for a fresh instance
    fn initial() -> Value
    where
        Self: Sized;
}

/// Subscriber invoked after each state transition
pub type Listener = Box<dyn Fn(&Value) + Send + Sync>;

/// A live store instance holding JSON state
///
/// Transitions are serialized by the state lock; listeners observe each new
/// state in transition order.
pub struct StoreInstance {
    name: &'static str,
    state: RwLock<Value>,
    listeners: Mutex<Vec<Listener>>,
}

impl StoreInstance {
    fn new(name: &'static str, initial: Value) -> Self {
        Self {
            name,
            state: RwLock::new(initial),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Type name of the owning store
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Snapshot of the current state
    pub fn state(&self) -> Value {
        self.state.read().map(|s| s.clone()).unwrap_or(Value::Null)
    }

    /// Merge a patch into the state and notify listeners
    ///
    /// Object patches shallow-merge into object state; any other combination
    /// replaces the state wholesale.
    pub fn update(&self, patch: Value) {
        let snapshot = {
            let mut state = match self.state.write() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            merge(&mut state, patch);
            state.clone()
        };
        let listeners = match self.listeners.lock() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in listeners.iter() {
            listener(&snapshot);
        }
    }

    /// Subscribe to state transitions
    pub fn listen(&self, listener: impl Fn(&Value) + Send + Sync + 'static) {
        let mut listeners = match self.listeners.lock() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push(Box::new(listener));
    }
}

impl std::fmt::Debug for StoreInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInstance")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

fn merge(state: &mut Value, patch: Value) {
    match (state, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key, value);
            }
        }
        (slot, other) => *slot = other,
    }
}

struct StoreFactory {
    name: &'static str,
    create: fn() -> Value,
}

/// Registry of store types and their singleton instances
///
/// Registration happens during application startup (directly or from plugin
/// `register` phases); access from request handling is read-only.
#[derive(Default)]
pub struct StoreRegistry {
    factories: RwLock<HashMap<TypeId, StoreFactory>>,
    singletons: DashMap<TypeId, Arc<StoreInstance>>,
}

impl StoreRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store type
    pub fn register<S: Store>(&self) {
        let mut factories = match self.factories.write() {
            Ok(factories) => factories,
            Err(poisoned) => poisoned.into_inner(),
        };
        factories.insert(
            TypeId::of::<S>(),
            StoreFactory {
                name: std::any::type_name::<S>(),
                create: S::initial,
            },
        );
    }

    /// Whether a store type is registered
    pub fn is_registered<S: Store>(&self) -> bool {
        self.factories
            .read()
            .map(|f| f.contains_key(&TypeId::of::<S>()))
            .unwrap_or(false)
    }

    /// The process-wide singleton for a store type, created on first access
    pub fn singleton<S: Store>(&self) -> Result<Arc<StoreInstance>> {
        let type_id = TypeId::of::<S>();
        if let Some(instance) = self.singletons.get(&type_id) {
            return Ok(instance.clone());
        }
        let instance = self.instantiate(type_id, std::any::type_name::<S>())?;
        Ok(self
            .singletons
            .entry(type_id)
            .or_insert(instance)
            .clone())
    }

    /// Build a fresh (request-scoped) instance for a store type
    pub(crate) fn instantiate(
        &self,
        type_id: TypeId,
        requested: &'static str,
    ) -> Result<Arc<StoreInstance>> {
        let factories = match self.factories.read() {
            Ok(factories) => factories,
            Err(poisoned) => poisoned.into_inner(),
        };
        let factory = factories
            .get(&type_id)
            .ok_or(Error::StoreNotRegistered(requested))?;
        Ok(Arc::new(StoreInstance::new(factory.name, (factory.create)())))
    }

    /// Drop all singleton instances (application shutdown)
    pub fn dispose_singletons(&self) {
        let count = self.singletons.len();
        self.singletons.clear();
        if count > 0 {
            tracing::debug!("Disposed {} singleton store(s)", count);
        }
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("singletons", &self.singletons.len())
            .finish()
    }
}

/// Per-request store instances, disposed together at request end
#[derive(Default)]
pub struct RequestStores {
    instances: Mutex<HashMap<TypeId, Arc<StoreInstance>>>,
}

impl RequestStores {
    /// Get or lazily create the request-scoped instance for a store type
    pub fn get_or_create<S: Store>(&self, registry: &StoreRegistry) -> Result<Arc<StoreInstance>> {
        let mut instances = match self.instances.lock() {
            Ok(instances) => instances,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(instance) = instances.get(&TypeId::of::<S>()) {
            return Ok(instance.clone());
        }
        let instance = registry.instantiate(TypeId::of::<S>(), std::any::type_name::<S>())?;
        instances.insert(TypeId::of::<S>(), instance.clone());
        Ok(instance)
    }

    /// Drop every request-scoped instance
    pub fn dispose(&self) {
        let mut instances = match self.instances.lock() {
            Ok(instances) => instances,
            Err(poisoned) => poisoned.into_inner(),
        };
        instances.clear();
    }

    /// Whether any instance was created during this request
    pub fn is_empty(&self) -> bool {
        self.instances.lock().map(|i| i.is_empty()).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter;
    impl Store for Counter {
        fn initial() -> Value {
            json!({ "count": 0 })
        }
    }

    struct Flags;
    impl Store for Flags {
        fn initial() -> Value {
            json!({ "beta": false })
        }
    }

    #[test]
    fn test_singleton_identity() {
        let registry = StoreRegistry::new();
        registry.register::<Counter>();

        let a = registry.singleton::<Counter>().unwrap();
        let b = registry.singleton::<Counter>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_unregistered_store_errors() {
        let registry = StoreRegistry::new();
        let err = registry.singleton::<Counter>().unwrap_err();
        assert!(matches!(err, Error::StoreNotRegistered(_)));
    }

    #[test]
    fn test_update_merges_and_notifies() {
        let registry = StoreRegistry::new();
        registry.register::<Counter>();
        let store = registry.singleton::<Counter>().unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_listener = seen.clone();
        store.listen(move |state| {
            seen_in_listener.store(state["count"].as_u64().unwrap_or(0) as usize, Ordering::SeqCst);
        });

        store.update(json!({ "count": 7, "extra": true }));
        assert_eq!(store.state()["count"], 7);
        assert_eq!(store.state()["extra"], true);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_non_object_patch_replaces() {
        let registry = StoreRegistry::new();
        registry.register::<Counter>();
        let store = registry.singleton::<Counter>().unwrap();
        store.update(json!([1, 2, 3]));
        assert_eq!(store.state(), json!([1, 2, 3]));
    }

    #[test]
    fn test_request_stores_are_isolated_from_singleton() {
        let registry = StoreRegistry::new();
        registry.register::<Counter>();

        let singleton = registry.singleton::<Counter>().unwrap();
        singleton.update(json!({ "count": 100 }));

        let request = RequestStores::default();
        let scoped = request.get_or_create::<Counter>(&registry).unwrap();
        assert_eq!(scoped.state()["count"], 0);
        assert!(!Arc::ptr_eq(&singleton, &scoped));

        // Same instance within the request
        let again = request.get_or_create::<Counter>(&registry).unwrap();
        assert!(Arc::ptr_eq(&scoped, &again));
    }

    #[test]
    fn test_request_stores_dispose_together() {
        let registry = StoreRegistry::new();
        registry.register::<Counter>();
        registry.register::<Flags>();

        let request = RequestStores::default();
        request.get_or_create::<Counter>(&registry).unwrap();
        request.get_or_create::<Flags>(&registry).unwrap();
        assert!(!request.is_empty());

        request.dispose();
        assert!(request.is_empty());
    }

    #[test]
    fn test_dispose_singletons_recreates_fresh() {
        let registry = StoreRegistry::new();
        registry.register::<Counter>();
        let store = registry.singleton::<Counter>().unwrap();
        store.update(json!({ "count": 9 }));

        registry.dispose_singletons();
        let fresh = registry.singleton::<Counter>().unwrap();
        assert_eq!(fresh.state()["count"], 0);
    }
}
