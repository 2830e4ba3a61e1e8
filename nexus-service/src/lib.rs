//! # nexus-service
//!
//! Async HTTP application framework core: a radix-tree router, pooled
//! request contexts with lazy parsing, a composable middleware/hook
//! pipeline, a dependency-ordered plugin lifecycle, and graceful shutdown
//! with connection draining.
//!
//! ## Features
//!
//! - **Radix routing**: static, parameter, regex, inline-pattern, and
//!   wildcard segments with deterministic priority and backtracking
//! - **Pooled contexts**: per-request state reused across requests; URL,
//!   query, cookies, and body parse lazily on first access
//! - **Pipeline**: global and route middleware around validation, lifecycle
//!   hooks, and the handler, with well-defined error propagation
//! - **Plugins**: topologically ordered configure → register → boot →
//!   ready → shutdown phases with cross-plugin exports
//! - **API versioning**: path/header/query resolution with deprecation
//!   headers
//! - **Graceful shutdown**: signal handling, request draining, prioritized
//!   hooks under timeouts, 503 + `Retry-After` while draining
//!
//! ## Example
//!
//! ```rust,no_run
//! use nexus_service::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Build the application
//!     let mut builder = App::builder(config);
//!     builder.middleware(middleware::request_id());
//!     builder.get("/users/:id", |ctx: Ctx, _deps: Deps| async move {
//!         Ok(ctx.json(&json!({ "id": ctx.param("id") })))
//!     });
//!     let app = builder.build().await?;
//!
//!     // Run the server
//!     Server::new(app).serve().await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod context;
pub mod cookies;
pub mod deps;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod plugin;
pub mod response;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod validation;
pub mod versioning;

/// Commonly used types, re-exported for application binaries
pub mod prelude {
    pub use crate::app::{App, AppBuilder, RouteDef};
    pub use crate::config::Config;
    pub use crate::context::{Ctx, ParsedBody};
    pub use crate::cookies::{Cookie, SameSite};
    pub use crate::deps::Deps;
    pub use crate::error::{Error, Result};
    pub use crate::middleware;
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        error_hook, handler_fn, middleware_fn, stage_hook, transform_hook, Next,
    };
    pub use crate::plugin::{Plugin, PluginContext, PluginMeta, PluginPriority};
    pub use crate::response::Response;
    pub use crate::server::Server;
    pub use crate::shutdown::ShutdownHook;
    pub use crate::store::Store;
    pub use crate::validation::{Field, Schema};
    pub use crate::versioning::DeprecationInfo;
    pub use http::{Method, StatusCode};
}
