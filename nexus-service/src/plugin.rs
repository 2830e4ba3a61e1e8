//! Plugin lifecycle management
//!
//! Plugins bundle registrations (routes, middleware, stores, dependencies)
//! and are driven through fixed phases:
//!
//! 1. **configure** — may mutate config and app settings; no routes yet.
//! 2. **register** — adds middleware, routes, stores, decorators.
//! 3. **boot** — after all registrations; builds caches, opens pools.
//! 4. **ready** — once the listener is up.
//! 5. **shutdown** — reverse order, each under a timeout.
//!
//! Before the first phase the manager orders plugins with Kahn's topological
//! sort over their dependency edges; a missing required dependency, a cycle,
//! or a declared conflict aborts startup. Ties are broken by priority
//! (critical first), then insertion order. Cross-plugin access goes through
//! `get_plugin(name)`, which exposes a plugin's `exports` value once it has
//! booted; the object graph stays acyclic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::app::AppBuilder;
use crate::error::{Error, Result};

/// Scheduling weight used to break ordering ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginPriority {
    /// Infrastructure plugins other plugins build on
    Critical,
    /// Early risers
    High,
    /// The default
    Normal,
    /// Runs after everything else
    Low,
}

impl Default for PluginPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Plugin metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMeta {
    /// Unique plugin name
    pub name: String,
    /// Plugin version string
    pub version: String,
    /// Names this plugin requires; startup fails when one is missing
    #[serde(default)]
    pub deps: Vec<String>,
    /// Names this plugin uses when present; missing ones only log a warning
    #[serde(default)]
    pub optional_deps: Vec<String>,
    /// Names this plugin refuses to run alongside
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Tie-break priority
    #[serde(default)]
    pub priority: PluginPriority,
}

impl PluginMeta {
    /// Metadata with a name and version, everything else defaulted
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            deps: Vec::new(),
            optional_deps: Vec::new(),
            conflicts: Vec::new(),
            priority: PluginPriority::Normal,
        }
    }

    /// Add a required dependency
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.deps.push(name.into());
        self
    }

    /// Add an optional dependency
    #[must_use]
    pub fn optionally_depends_on(mut self, name: impl Into<String>) -> Self {
        self.optional_deps.push(name.into());
        self
    }

    /// Declare a conflict
    #[must_use]
    pub fn conflicts_with(mut self, name: impl Into<String>) -> Self {
        self.conflicts.push(name.into());
        self
    }

    /// Set the priority
    #[must_use]
    pub fn priority(mut self, priority: PluginPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Lifecycle state of a plugin record
///
/// Each transition happens at most once; `Ready`, `Shutdown`, and `Error`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Added, not yet configured
    Pending,
    /// `configure` completed
    Configured,
    /// `register` completed
    Registered,
    /// `boot` completed; exports are visible
    Booted,
    /// `ready` completed
    Ready,
    /// `shutdown` completed
    Shutdown,
    /// A phase failed
    Error,
}

/// Events emitted while driving plugins
#[derive(Debug, Clone)]
pub enum PluginEvent {
    /// A plugin was added to the manager
    Added {
        /// Plugin name
        name: String,
    },
    /// A plugin finished `configure`
    Configured {
        /// Plugin name
        name: String,
    },
    /// A plugin finished `register`
    Registered {
        /// Plugin name
        name: String,
    },
    /// A plugin finished `boot`
    Booted {
        /// Plugin name
        name: String,
    },
    /// A plugin finished `ready`
    Ready {
        /// Plugin name
        name: String,
    },
    /// A plugin finished `shutdown`
    Shutdown {
        /// Plugin name
        name: String,
    },
    /// A phase failed for a plugin
    Error {
        /// Plugin name
        name: String,
        /// Phase that failed
        phase: &'static str,
        /// Failure detail
        message: String,
    },
    /// A lifecycle phase is starting
    LifecycleStart {
        /// Phase name
        phase: &'static str,
    },
    /// A lifecycle phase completed
    LifecycleComplete {
        /// Phase name
        phase: &'static str,
    },
}

/// Subscriber for plugin events (observability, error reporters, …)
pub type PluginEventListener = Arc<dyn Fn(&PluginEvent) + Send + Sync>;

/// Per-plugin view handed into lifecycle phases
pub struct PluginContext {
    name: String,
    config: Value,
    storage: HashMap<String, Value>,
    exports: Arc<RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
    known: Arc<HashSet<String>>,
}

impl PluginContext {
    /// This plugin's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The config value supplied at registration
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Private key/value storage persisted across phases
    pub fn storage(&mut self) -> &mut HashMap<String, Value> {
        &mut self.storage
    }

    /// Read-only view of the private storage
    pub fn storage_ref(&self) -> &HashMap<String, Value> {
        &self.storage
    }

    /// Whether a plugin with this name was added
    pub fn has_plugin(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// Another plugin's exports
    ///
    /// Legitimately `None` before the owner reaches `booted`.
    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.exports
            .read()
            .ok()
            .and_then(|exports| exports.get(name).cloned())
    }

    /// Scoped tracing span for this plugin's log output
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("plugin", name = %self.name)
    }
}

/// A packaged bundle of registrations driven through the lifecycle
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Plugin metadata; read once at registration
    fn meta(&self) -> PluginMeta;

    /// Validate the configuration supplied with `add`
    fn validate_config(&self, _config: &Value) -> Result<()> {
        Ok(())
    }

    /// Mutate configuration and app settings; no routes exist yet
    async fn configure(&self, _app: &mut AppBuilder, _cx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Add middleware, routes, stores, and dependencies
    async fn register(&self, _app: &mut AppBuilder, _cx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Runs after all registrations; build caches, open pools
    async fn boot(&self, _cx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Value exposed to other plugins through `get_plugin`; evaluated after
    /// `boot`
    fn exports(&self, _cx: &PluginContext) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }

    /// Runs once the listener is accepting connections
    async fn on_ready(&self, _cx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Runs during graceful shutdown, in reverse resolution order
    async fn on_shutdown(&self, _cx: &mut PluginContext) -> Result<()> {
        Ok(())
    }
}

struct PluginRecord {
    plugin: Arc<dyn Plugin>,
    meta: PluginMeta,
    config: Value,
    state: PluginState,
    storage: HashMap<String, Value>,
}

/// Orders plugins and drives them through lifecycle phases
#[derive(Default)]
pub struct PluginManager {
    records: Vec<PluginRecord>,
    order: Vec<usize>,
    exports: Arc<RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
    listeners: Vec<PluginEventListener>,
}

impl PluginManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no plugins are registered
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Subscribe to plugin events
    pub fn subscribe(&mut self, listener: PluginEventListener) {
        self.listeners.push(listener);
    }

    /// Add a plugin with its configuration
    pub fn add(&mut self, plugin: Arc<dyn Plugin>, config: Value) -> Result<()> {
        let meta = plugin.meta();
        if meta.name.is_empty() {
            return Err(Error::PluginResolution(
                "plugin metadata has an empty name".to_string(),
            ));
        }
        if self.records.iter().any(|r| r.meta.name == meta.name) {
            return Err(Error::PluginResolution(format!(
                "plugin '{}' is already registered",
                meta.name
            )));
        }
        plugin.validate_config(&config)?;

        let name = meta.name.clone();
        self.records.push(PluginRecord {
            plugin,
            meta,
            config,
            state: PluginState::Pending,
            storage: HashMap::new(),
        });
        self.emit(&PluginEvent::Added { name });
        Ok(())
    }

    /// Current state of a plugin
    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.records
            .iter()
            .find(|r| r.meta.name == name)
            .map(|r| r.state)
    }

    /// Whether a plugin with this name was added
    pub fn has_plugin(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.meta.name == name)
    }

    /// A booted plugin's exports
    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.exports
            .read()
            .ok()
            .and_then(|exports| exports.get(name).cloned())
    }

    /// Names in resolved order (available after [`PluginManager::resolve`])
    pub fn resolved_order(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|&i| self.records[i].meta.name.clone())
            .collect()
    }

    /// Check conflicts and compute the execution order
    ///
    /// Kahn's algorithm over required-dependency edges; among ready nodes the
    /// lowest (priority, insertion index) runs first.
    pub fn resolve(&mut self) -> Result<()> {
        let names: HashMap<&str, usize> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.meta.name.as_str(), i))
            .collect();

        // Conflicts are rejected before any ordering happens.
        for record in &self.records {
            for conflict in &record.meta.conflicts {
                if names.contains_key(conflict.as_str()) {
                    return Err(Error::PluginResolution(format!(
                        "plugin '{}' conflicts with '{}'",
                        record.meta.name, conflict
                    )));
                }
            }
        }

        let n = self.records.len();
        let mut indegree = vec![0usize; n];
        let mut adjacent = vec![Vec::<usize>::new(); n];

        for (i, record) in self.records.iter().enumerate() {
            for dep in &record.meta.deps {
                match names.get(dep.as_str()) {
                    Some(&d) => {
                        // edge dep -> plugin (dependency runs first)
                        adjacent[d].push(i);
                        indegree[i] += 1;
                    }
                    None => {
                        return Err(Error::PluginResolution(format!(
                            "plugin '{}' requires missing plugin '{}'",
                            record.meta.name, dep
                        )));
                    }
                }
            }
            for dep in &record.meta.optional_deps {
                match names.get(dep.as_str()) {
                    Some(&d) => {
                        adjacent[d].push(i);
                        indegree[i] += 1;
                    }
                    None => {
                        tracing::warn!(
                            plugin = %record.meta.name,
                            optional_dep = %dep,
                            "Optional plugin dependency not present"
                        );
                    }
                }
            }
        }

        let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while !ready.is_empty() {
            // Lowest (priority, insertion index) first
            let pos = ready
                .iter()
                .enumerate()
                .min_by_key(|(_, &i)| (self.records[i].meta.priority, i))
                .map(|(pos, _)| pos)
                .unwrap_or(0);
            let next = ready.swap_remove(pos);
            order.push(next);
            for &succ in &adjacent[next] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    ready.push(succ);
                }
            }
        }

        if order.len() != n {
            let stuck: Vec<&str> = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.records[i].meta.name.as_str())
                .collect();
            return Err(Error::PluginResolution(format!(
                "cyclic plugin dependency among: {}",
                stuck.join(", ")
            )));
        }

        tracing::info!(
            order = ?order.iter().map(|&i| self.records[i].meta.name.as_str()).collect::<Vec<_>>(),
            "Plugin dependency order resolved"
        );
        self.order = order;
        Ok(())
    }

    /// Drive the `configure` phase
    pub async fn run_configure(&mut self, app: &mut AppBuilder) -> Result<()> {
        self.emit(&PluginEvent::LifecycleStart { phase: "configure" });
        for i in self.order.clone() {
            let (plugin, mut cx) = self.check_out(i);
            let result = plugin.configure(app, &mut cx).await;
            self.check_in(i, cx, result, "configure", PluginState::Configured)?;
            self.emit(&PluginEvent::Configured {
                name: self.records[i].meta.name.clone(),
            });
        }
        self.emit(&PluginEvent::LifecycleComplete { phase: "configure" });
        Ok(())
    }

    /// Drive the `register` phase
    pub async fn run_register(&mut self, app: &mut AppBuilder) -> Result<()> {
        self.emit(&PluginEvent::LifecycleStart { phase: "register" });
        for i in self.order.clone() {
            let (plugin, mut cx) = self.check_out(i);
            let result = plugin.register(app, &mut cx).await;
            self.check_in(i, cx, result, "register", PluginState::Registered)?;
            self.emit(&PluginEvent::Registered {
                name: self.records[i].meta.name.clone(),
            });
        }
        self.emit(&PluginEvent::LifecycleComplete { phase: "register" });
        Ok(())
    }

    /// Drive the `boot` phase and collect exports
    pub async fn run_boot(&mut self) -> Result<()> {
        self.emit(&PluginEvent::LifecycleStart { phase: "boot" });
        for i in self.order.clone() {
            let (plugin, mut cx) = self.check_out(i);
            let result = plugin.boot(&mut cx).await;
            if result.is_ok() {
                if let Some(value) = plugin.exports(&cx) {
                    if let Ok(mut exports) = self.exports.write() {
                        exports.insert(self.records[i].meta.name.clone(), value);
                    }
                }
            }
            self.check_in(i, cx, result, "boot", PluginState::Booted)?;
            self.emit(&PluginEvent::Booted {
                name: self.records[i].meta.name.clone(),
            });
        }
        self.emit(&PluginEvent::LifecycleComplete { phase: "boot" });
        Ok(())
    }

    /// Drive the `ready` phase (listener is up)
    pub async fn run_ready(&mut self) -> Result<()> {
        self.emit(&PluginEvent::LifecycleStart { phase: "ready" });
        for i in self.order.clone() {
            let (plugin, mut cx) = self.check_out(i);
            let result = plugin.on_ready(&mut cx).await;
            self.check_in(i, cx, result, "ready", PluginState::Ready)?;
            self.emit(&PluginEvent::Ready {
                name: self.records[i].meta.name.clone(),
            });
        }
        self.emit(&PluginEvent::LifecycleComplete { phase: "ready" });
        Ok(())
    }

    /// Drive the `shutdown` phase in reverse order
    ///
    /// Each plugin runs under `timeout`; failures and timeouts are logged
    /// and the sequence continues.
    pub async fn run_shutdown(&mut self, timeout: Duration) {
        self.emit(&PluginEvent::LifecycleStart { phase: "shutdown" });
        for i in self.order.clone().into_iter().rev() {
            let name = self.records[i].meta.name.clone();
            let (plugin, mut cx) = self.check_out(i);
            let result = tokio::time::timeout(timeout, plugin.on_shutdown(&mut cx)).await;
            // Storage goes back regardless of the outcome.
            self.records[i].storage = std::mem::take(&mut cx.storage);
            match result {
                Ok(Ok(())) => {
                    self.records[i].state = PluginState::Shutdown;
                    self.emit(&PluginEvent::Shutdown { name });
                }
                Ok(Err(err)) => {
                    tracing::error!(plugin = %name, "Plugin shutdown failed: {}", err);
                    self.records[i].state = PluginState::Error;
                    self.emit(&PluginEvent::Error {
                        name,
                        phase: "shutdown",
                        message: err.to_string(),
                    });
                }
                Err(_) => {
                    let err = Error::HookTimeout {
                        name: name.clone(),
                        timeout,
                    };
                    tracing::error!(plugin = %name, "{}", err);
                    self.records[i].state = PluginState::Error;
                    self.emit(&PluginEvent::Error {
                        name,
                        phase: "shutdown",
                        message: err.to_string(),
                    });
                }
            }
        }
        self.emit(&PluginEvent::LifecycleComplete { phase: "shutdown" });
    }

    fn check_out(&mut self, i: usize) -> (Arc<dyn Plugin>, PluginContext) {
        let known: Arc<HashSet<String>> =
            Arc::new(self.records.iter().map(|r| r.meta.name.clone()).collect());
        let record = &mut self.records[i];
        let cx = PluginContext {
            name: record.meta.name.clone(),
            config: record.config.clone(),
            storage: std::mem::take(&mut record.storage),
            exports: self.exports.clone(),
            known,
        };
        (record.plugin.clone(), cx)
    }

    fn check_in(
        &mut self,
        i: usize,
        cx: PluginContext,
        result: Result<()>,
        phase: &'static str,
        next_state: PluginState,
    ) -> Result<()> {
        self.records[i].storage = cx.storage;
        match result {
            Ok(()) => {
                self.records[i].state = next_state;
                Ok(())
            }
            Err(err) => {
                let name = self.records[i].meta.name.clone();
                self.records[i].state = PluginState::Error;
                self.emit(&PluginEvent::Error {
                    name: name.clone(),
                    phase,
                    message: err.to_string(),
                });
                Err(Error::PluginLifecycle {
                    name,
                    phase,
                    message: err.to_string(),
                })
            }
        }
    }

    fn emit(&self, event: &PluginEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field(
                "plugins",
                &self
                    .records
                    .iter()
                    .map(|r| (r.meta.name.as_str(), r.state))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Named {
        meta: PluginMeta,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for Named {
        fn meta(&self) -> PluginMeta {
            self.meta.clone()
        }

        async fn boot(&self, _cx: &mut PluginContext) -> Result<()> {
            self.log.lock().unwrap().push(format!("boot:{}", self.meta.name));
            Ok(())
        }

        async fn on_shutdown(&self, _cx: &mut PluginContext) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("shutdown:{}", self.meta.name));
            Ok(())
        }
    }

    fn add_named(manager: &mut PluginManager, log: &Arc<Mutex<Vec<String>>>, meta: PluginMeta) {
        manager
            .add(
                Arc::new(Named {
                    meta,
                    log: log.clone(),
                }),
                json!({}),
            )
            .unwrap();
    }

    #[test]
    fn test_dependency_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(&mut manager, &log, PluginMeta::new("c", "1.0").depends_on("b"));
        add_named(&mut manager, &log, PluginMeta::new("b", "1.0").depends_on("a"));
        add_named(&mut manager, &log, PluginMeta::new("a", "1.0"));

        manager.resolve().unwrap();
        assert_eq!(manager.resolved_order(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_priority_breaks_ties() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(&mut manager, &log, PluginMeta::new("late", "1.0").priority(PluginPriority::Low));
        add_named(
            &mut manager,
            &log,
            PluginMeta::new("infra", "1.0").priority(PluginPriority::Critical),
        );
        add_named(&mut manager, &log, PluginMeta::new("mid", "1.0"));

        manager.resolve().unwrap();
        assert_eq!(manager.resolved_order(), vec!["infra", "mid", "late"]);
    }

    #[test]
    fn test_insertion_order_breaks_equal_priority() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(&mut manager, &log, PluginMeta::new("first", "1.0"));
        add_named(&mut manager, &log, PluginMeta::new("second", "1.0"));
        manager.resolve().unwrap();
        assert_eq!(manager.resolved_order(), vec!["first", "second"]);
    }

    #[test]
    fn test_missing_required_dep_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(&mut manager, &log, PluginMeta::new("a", "1.0").depends_on("ghost"));
        let err = manager.resolve().unwrap_err();
        assert!(matches!(err, Error::PluginResolution(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_missing_optional_dep_is_tolerated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(
            &mut manager,
            &log,
            PluginMeta::new("a", "1.0").optionally_depends_on("ghost"),
        );
        manager.resolve().unwrap();
        assert_eq!(manager.resolved_order(), vec!["a"]);
    }

    #[test]
    fn test_cycle_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(&mut manager, &log, PluginMeta::new("a", "1.0").depends_on("b"));
        add_named(&mut manager, &log, PluginMeta::new("b", "1.0").depends_on("a"));
        let err = manager.resolve().unwrap_err();
        assert!(err.to_string().contains("cyclic"));
    }

    #[test]
    fn test_conflict_fails() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(&mut manager, &log, PluginMeta::new("a", "1.0").conflicts_with("b"));
        add_named(&mut manager, &log, PluginMeta::new("b", "1.0"));
        let err = manager.resolve().unwrap_err();
        assert!(err.to_string().contains("conflicts"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(&mut manager, &log, PluginMeta::new("a", "1.0"));
        let err = manager
            .add(
                Arc::new(Named {
                    meta: PluginMeta::new("a", "2.0"),
                    log: log.clone(),
                }),
                json!({}),
            )
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn test_boot_order_and_shutdown_reversal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        add_named(&mut manager, &log, PluginMeta::new("b", "1.0").depends_on("a"));
        add_named(&mut manager, &log, PluginMeta::new("a", "1.0"));

        manager.resolve().unwrap();
        manager.run_boot().await.unwrap();
        manager.run_shutdown(Duration::from_secs(1)).await;

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec!["boot:a", "boot:b", "shutdown:b", "shutdown:a"]
        );
        assert_eq!(manager.state("a"), Some(PluginState::Shutdown));
    }

    struct Exporting;

    #[async_trait]
    impl Plugin for Exporting {
        fn meta(&self) -> PluginMeta {
            PluginMeta::new("exporter", "1.0")
        }

        fn exports(&self, _cx: &PluginContext) -> Option<Arc<dyn Any + Send + Sync>> {
            Some(Arc::new("exported-api".to_string()))
        }
    }

    #[tokio::test]
    async fn test_exports_visible_after_boot() {
        let mut manager = PluginManager::new();
        manager.add(Arc::new(Exporting), json!({})).unwrap();
        manager.resolve().unwrap();

        assert!(manager.get_plugin("exporter").is_none());
        manager.run_boot().await.unwrap();
        let api = manager.get_plugin("exporter").unwrap();
        assert_eq!(
            api.downcast::<String>().unwrap().as_str(),
            "exported-api"
        );
    }

    struct SlowShutdown;

    #[async_trait]
    impl Plugin for SlowShutdown {
        fn meta(&self) -> PluginMeta {
            PluginMeta::new("slow", "1.0")
        }

        async fn on_shutdown(&self, _cx: &mut PluginContext) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_timeout_does_not_block_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new();
        manager.add(Arc::new(SlowShutdown), json!({})).unwrap();
        add_named(&mut manager, &log, PluginMeta::new("fast", "1.0"));

        manager.resolve().unwrap();
        manager.run_shutdown(Duration::from_millis(50)).await;

        // The slow plugin timed out but the fast one still ran
        assert_eq!(manager.state("slow"), Some(PluginState::Error));
        assert_eq!(manager.state("fast"), Some(PluginState::Shutdown));
        assert_eq!(log.lock().unwrap().clone(), vec!["shutdown:fast"]);
    }

    struct RejectingConfig;

    #[async_trait]
    impl Plugin for RejectingConfig {
        fn meta(&self) -> PluginMeta {
            PluginMeta::new("strict", "1.0")
        }

        fn validate_config(&self, config: &Value) -> Result<()> {
            if config.get("url").is_none() {
                return Err(Error::PluginResolution(
                    "strict plugin requires a 'url' config key".to_string(),
                ));
            }
            Ok(())
        }
    }

    #[test]
    fn test_validate_config_runs_at_add() {
        let mut manager = PluginManager::new();
        assert!(manager.add(Arc::new(RejectingConfig), json!({})).is_err());
        assert!(manager
            .add(Arc::new(RejectingConfig), json!({"url": "nats://x"}))
            .is_ok());
    }
}
