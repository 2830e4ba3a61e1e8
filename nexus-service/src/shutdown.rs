//! Graceful shutdown coordination
//!
//! The coordinator tracks in-flight requests, flips the health state to
//! draining when shutdown begins, and drives the drain → hooks → close
//! sequence under a total deadline. Shutdown begins at most once, whether
//! triggered by a signal, by user code, or by both.

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::ShutdownConfig;
use crate::error::Error;

/// Health status reported by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Accepting and serving requests
    Running,
    /// Shutdown has begun; in-flight requests are finishing
    Draining,
    /// The listener is closed
    Stopped,
}

const STATE_RUNNING: u8 = 0;
const STATE_DRAINING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// An in-flight request entry
#[derive(Debug, Clone)]
struct TrackedRequest {
    method: String,
    path: String,
    started: Instant,
}

/// Snapshot of an in-flight request, exposed for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRequest {
    /// Tracking id assigned at accept
    pub id: u64,
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Milliseconds since the request started
    pub elapsed_ms: u64,
}

/// User hook run during shutdown; higher priority runs first
pub struct ShutdownHook {
    /// Hook name, used in logs
    pub name: String,
    /// Ordering weight; higher runs first
    pub priority: i32,
    /// Per-hook timeout
    pub timeout: Duration,
    handler: Arc<dyn Fn() -> BoxFuture<'static, crate::error::Result<()>> + Send + Sync>,
}

impl ShutdownHook {
    /// Create a hook from an async closure
    pub fn new<F, Fut>(
        name: impl Into<String>,
        priority: i32,
        timeout: Duration,
        handler: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            timeout,
            handler: Arc::new(move || Box::pin(handler())),
        }
    }
}

impl std::fmt::Debug for ShutdownHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Outcome of the shutdown sequence
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Whether every in-flight request finished before the deadline
    pub drained: bool,
    /// Requests still active when the drain deadline elapsed
    pub active_at_timeout: Vec<ActiveRequest>,
    /// Names of hooks that failed or timed out
    pub hook_failures: Vec<String>,
}

/// Tracks in-flight requests and drives the shutdown sequence
pub struct ShutdownCoordinator {
    state: AtomicU8,
    begun: AtomicBool,
    finalized: AtomicBool,
    next_id: AtomicU64,
    active: DashMap<u64, TrackedRequest>,
    cancel: CancellationToken,
    hooks: Mutex<Vec<ShutdownHook>>,
    config: ShutdownConfig,
    on_complete: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with the given configuration
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            state: AtomicU8::new(STATE_RUNNING),
            begun: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            active: DashMap::new(),
            cancel: CancellationToken::new(),
            hooks: Mutex::new(Vec::new()),
            config,
            on_complete: Mutex::new(None),
        }
    }

    /// Current health state
    pub fn health_state(&self) -> HealthState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => HealthState::Running,
            STATE_DRAINING => HealthState::Draining,
            _ => HealthState::Stopped,
        }
    }

    /// Whether shutdown has begun
    pub fn is_draining(&self) -> bool {
        self.state.load(Ordering::SeqCst) != STATE_RUNNING
    }

    /// Token cancelled when shutdown begins; the accept loop selects on it
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `Retry-After` seconds advertised while draining
    pub fn retry_after_secs(&self) -> u64 {
        self.config.retry_after_secs
    }

    /// Register a shutdown hook
    pub fn add_hook(&self, hook: ShutdownHook) {
        let mut hooks = self
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        hooks.push(hook);
    }

    /// Install a callback invoked after the sequence completes
    pub fn on_complete(&self, callback: impl FnOnce() + Send + 'static) {
        let mut slot = self
            .on_complete
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Box::new(callback));
    }

    /// Record a request as in-flight; dropping the guard untracks it
    pub fn track_request(&self, method: &http::Method, path: &str) -> RequestGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.active.insert(
            id,
            TrackedRequest {
                method: method.to_string(),
                path: path.to_string(),
                started: Instant::now(),
            },
        );
        RequestGuard {
            id,
            coordinator: self,
        }
    }

    /// Number of in-flight requests
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Snapshot of the in-flight request list
    pub fn active_requests(&self) -> Vec<ActiveRequest> {
        self.active
            .iter()
            .map(|entry| ActiveRequest {
                id: *entry.key(),
                method: entry.value().method.clone(),
                path: entry.value().path.clone(),
                elapsed_ms: entry.value().started.elapsed().as_millis() as u64,
            })
            .collect()
    }

    /// Begin shutdown: flip to draining and stop the accept loop
    ///
    /// Idempotent; returns whether this call was the first trigger.
    pub fn begin(&self) -> bool {
        if self.begun.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.state.store(STATE_DRAINING, Ordering::SeqCst);
        tracing::info!("Shutdown initiated, draining in-flight requests");
        self.cancel.cancel();
        true
    }

    /// Run the drain → hooks → complete sequence
    ///
    /// Called exactly once by the server after the accept loop stops; later
    /// calls return an empty report.
    pub async fn finalize(&self) -> ShutdownReport {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return ShutdownReport::default();
        }

        let (drained, active_at_timeout) = self.drain().await;
        if drained {
            tracing::info!("All in-flight requests completed");
        } else {
            tracing::warn!(
                remaining = active_at_timeout.len(),
                "Drain deadline elapsed with requests still active"
            );
        }

        let hook_failures = self.run_hooks().await;
        self.state.store(STATE_STOPPED, Ordering::SeqCst);

        let callback = {
            let mut slot = self
                .on_complete
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };
        if let Some(callback) = callback {
            callback();
        }
        tracing::info!("Shutdown sequence complete");

        ShutdownReport {
            drained,
            active_at_timeout,
            hook_failures,
        }
    }

    async fn drain(&self) -> (bool, Vec<ActiveRequest>) {
        let deadline = Instant::now() + self.config.drain_deadline();
        loop {
            if self.active.is_empty() {
                return (true, Vec::new());
            }
            if Instant::now() >= deadline {
                return (false, self.active_requests());
            }
            tokio::time::sleep(self.config.drain_poll()).await;
        }
    }

    async fn run_hooks(&self) -> Vec<String> {
        let mut hooks = {
            let mut guard = self
                .hooks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        // Higher priority first; stable for equal priorities
        hooks.sort_by_key(|hook| std::cmp::Reverse(hook.priority));

        let mut failures = Vec::new();
        for hook in hooks {
            tracing::debug!(hook = %hook.name, priority = hook.priority, "Running shutdown hook");
            match tokio::time::timeout(hook.timeout, (hook.handler)()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::error!(hook = %hook.name, "Shutdown hook failed: {}", err);
                    failures.push(hook.name);
                }
                Err(_) => {
                    let err = Error::HookTimeout {
                        name: hook.name.clone(),
                        timeout: hook.timeout,
                    };
                    tracing::error!("{}", err);
                    failures.push(hook.name);
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.health_state())
            .field("active", &self.active.len())
            .finish()
    }
}

/// Untracks its request when dropped
pub struct RequestGuard<'a> {
    id: u64,
    coordinator: &'a ShutdownCoordinator,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.active.remove(&self.id);
    }
}

/// Wait for any configured shutdown signal
///
/// Unknown signal names are logged and skipped; with no usable signal this
/// future never resolves (shutdown can still be triggered programmatically).
pub async fn wait_for_signal(signals: &[String]) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut streams = Vec::new();
        for name in signals {
            let kind = match name.as_str() {
                "SIGTERM" => SignalKind::terminate(),
                "SIGINT" => SignalKind::interrupt(),
                "SIGQUIT" => SignalKind::quit(),
                "SIGHUP" => SignalKind::hangup(),
                other => {
                    tracing::warn!("Unsupported shutdown signal: {}", other);
                    continue;
                }
            };
            match signal(kind) {
                Ok(stream) => streams.push((name.clone(), stream)),
                Err(err) => {
                    tracing::error!("Failed to install {} handler: {}", name, err);
                }
            }
        }
        if streams.is_empty() {
            std::future::pending::<()>().await;
            return;
        }

        let mut waits = streams
            .iter_mut()
            .map(|(name, stream)| {
                let name = name.clone();
                Box::pin(async move {
                    stream.recv().await;
                    name
                })
            })
            .collect::<Vec<_>>();
        let (name, _, _) = futures::future::select_all(waits.drain(..)).await;
        tracing::info!("Received {}, starting graceful shutdown", name);
    }

    #[cfg(not(unix))]
    {
        let _ = signals;
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
    }
}
