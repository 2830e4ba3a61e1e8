//! Bounded object pools for contexts and response builders
//!
//! Acquire allocates when the pool is empty; release discards when the pool
//! is full. A context is only pooled once its handle is unique, so user code
//! holding a clone past the end of a request can never observe reuse.

use http::request::Parts;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::PoolConfig;
use crate::context::{Context, Ctx, RawBody};
use crate::response::ResponseBuilder;
use crate::store::StoreRegistry;

/// Pool usage counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStats {
    /// Objects allocated because the pool was empty
    pub created: u64,
    /// Objects served from the pool
    pub reused: u64,
}

impl PoolStats {
    /// Fraction of acquisitions served from the pool
    pub fn hit_rate(&self) -> f64 {
        let total = self.created + self.reused;
        if total == 0 {
            0.0
        } else {
            self.reused as f64 / total as f64
        }
    }
}

/// Bounded pool of [`ResponseBuilder`]s
pub struct ResponseBuilderPool {
    items: Mutex<Vec<ResponseBuilder>>,
    max: usize,
    created: AtomicU64,
    reused: AtomicU64,
}

impl ResponseBuilderPool {
    /// Create a pool holding at most `max` builders
    pub fn new(max: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            max,
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Take a reset builder, allocating if the pool is empty
    pub fn acquire(&self) -> ResponseBuilder {
        let popped = self
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        match popped {
            Some(builder) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                builder
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                ResponseBuilder::new()
            }
        }
    }

    /// Return a builder; it is reset before pooling, discarded when full
    pub fn release(&self, mut builder: ResponseBuilder) {
        builder.reset();
        let mut items = self
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if items.len() < self.max {
            items.push(builder);
        }
    }

    /// Usage counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }
}

/// Bounded pool of request [`Context`]s
pub struct ContextPool {
    items: Mutex<Vec<Ctx>>,
    max: usize,
    created: AtomicU64,
    reused: AtomicU64,
    registry: Arc<StoreRegistry>,
    body_limit: usize,
    builders: Arc<ResponseBuilderPool>,
}

impl ContextPool {
    /// Create a pool from configuration
    pub fn new(config: &PoolConfig, registry: Arc<StoreRegistry>, body_limit: usize) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            max: config.max_contexts,
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            registry,
            body_limit,
            builders: Arc::new(ResponseBuilderPool::new(config.max_response_builders)),
        }
    }

    /// Acquire a context for an inbound request
    pub fn acquire(&self, head: Parts, raw_body: RawBody, remote_addr: Option<SocketAddr>) -> Ctx {
        let builder = self.builders.acquire();
        let popped = self
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        if let Some(mut ctx) = popped {
            // Uniqueness was checked at release time, so this only fails if
            // a handle leaked after pooling; fall back to allocation then.
            if let Some(inner) = Arc::get_mut(&mut ctx) {
                inner.reinitialize(head, raw_body, remote_addr, builder);
                self.reused.fetch_add(1, Ordering::Relaxed);
                return ctx;
            }
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Arc::new(Context::new(
            head,
            raw_body,
            remote_addr,
            self.registry.clone(),
            self.body_limit,
            builder,
        ))
    }

    /// Dispose a context and return it to the pool
    ///
    /// The response builder goes back to its own pool; the context is only
    /// pooled when this is the last handle and the pool has room.
    pub fn release(&self, ctx: Ctx) {
        if let Some(builder) = ctx.take_builder() {
            self.builders.release(builder);
        }
        ctx.dispose();

        if Arc::strong_count(&ctx) != 1 {
            return;
        }
        let mut items = self
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if items.len() < self.max {
            items.push(ctx);
        }
    }

    /// Usage counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }

    /// The paired response-builder pool
    pub fn builder_pool(&self) -> &ResponseBuilderPool {
        &self.builders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Method;
    use serde_json::json;

    fn make_head(path: &str) -> Parts {
        http::Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn make_pool() -> ContextPool {
        ContextPool::new(
            &PoolConfig::default(),
            Arc::new(StoreRegistry::new()),
            1024,
        )
    }

    #[test]
    fn test_acquire_allocates_then_reuses() {
        let pool = make_pool();

        let ctx = pool.acquire(make_head("/a"), RawBody::None, None);
        assert_eq!(pool.stats().created, 1);
        pool.release(ctx);

        let ctx = pool.acquire(make_head("/b"), RawBody::None, None);
        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert!(stats.hit_rate() > 0.49);
        assert_eq!(ctx.path(), "/b");
    }

    #[test]
    fn test_reacquired_context_looks_fresh() {
        let pool = make_pool();

        let ctx = pool.acquire(make_head("/a?x=1"), RawBody::Full(Bytes::new()), None);
        ctx.set("key", json!("value"));
        ctx.set_params(vec![("id".to_string(), "1".to_string())]);
        ctx.status(http::StatusCode::CREATED);
        let _ = ctx.query();
        pool.release(ctx);

        let ctx = pool.acquire(make_head("/b"), RawBody::None, None);
        assert_eq!(ctx.get("key"), None);
        assert!(ctx.params().is_empty());
        assert!(ctx.query().is_empty());
        // Builder came back reset: helpers produce an unmodified 200
        let response = ctx.json(&json!({}));
        assert_eq!(response.status, http::StatusCode::OK);
    }

    #[test]
    fn test_context_held_elsewhere_is_not_pooled() {
        let pool = make_pool();

        let ctx = pool.acquire(make_head("/a"), RawBody::None, None);
        let leaked = ctx.clone();
        pool.release(ctx);

        // The leaked handle kept the context alive, so the next acquire
        // must allocate instead of reusing it.
        let ctx = pool.acquire(make_head("/b"), RawBody::None, None);
        assert_eq!(pool.stats().created, 2);
        assert_eq!(pool.stats().reused, 0);
        drop(leaked);
        drop(ctx);
    }

    #[test]
    fn test_builder_pool_reuses() {
        let pool = ResponseBuilderPool::new(4);
        let mut builder = pool.acquire();
        builder.set_status(http::StatusCode::ACCEPTED);
        pool.release(builder);

        let builder = pool.acquire();
        assert!(builder.is_pristine());
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_overflow_is_discarded() {
        let pool = ResponseBuilderPool::new(1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b); // over capacity, dropped
        let _ = pool.acquire();
        let _ = pool.acquire();
        let stats = pool.stats();
        assert_eq!(stats.created, 3);
        assert_eq!(stats.reused, 1);
    }
}
