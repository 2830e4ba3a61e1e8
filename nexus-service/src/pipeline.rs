//! Request pipeline: middleware chain, lifecycle hooks, and the terminal
//!
//! A request flows through the global middleware, then the route middleware,
//! then the terminal sub-pipeline:
//!
//! ```text
//! M1 → M2 → … → { before_validation → validate → after_validation
//!                 → before_handler → handler → after_handler }
//! ```
//!
//! Every middleware receives `(ctx, next, deps)` and decides whether to call
//! `next.run(...)`; not calling it short-circuits the rest of the chain.
//! Stage hooks short-circuit by returning a response; transform hooks may
//! replace the response on the way out. Errors skip everything downstream
//! and surface at the dispatch frame, where `on_error` is consulted before
//! the application error handler.

use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::context::Ctx;
use crate::deps::Deps;
use crate::error::{Error, Result};
use crate::response::Response;
use crate::validation::Schema;

/// Boxed future returned by handlers and middleware
pub type HandlerFuture = BoxFuture<'static, Result<Response>>;

/// Terminal request handler
pub trait Handler: Send + Sync + 'static {
    /// Produce the response for a request
    fn call(&self, ctx: Ctx, deps: Deps) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn call(&self, ctx: Ctx, deps: Deps) -> HandlerFuture {
        Box::pin(self(ctx, deps))
    }
}

/// Shared handler handle stored on routes
pub type DynHandler = Arc<dyn Handler>;

/// Wrap a closure as a [`DynHandler`]
pub fn handler_fn<F, Fut>(f: F) -> DynHandler
where
    F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(f)
}

/// Middleware wrapping the rest of the pipeline
pub trait Middleware: Send + Sync + 'static {
    /// Handle the request, usually delegating to `next.run(ctx, deps)`
    fn handle(&self, ctx: Ctx, next: Next, deps: Deps) -> HandlerFuture;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Ctx, Next, Deps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    fn handle(&self, ctx: Ctx, next: Next, deps: Deps) -> HandlerFuture {
        Box::pin(self(ctx, next, deps))
    }
}

/// Shared middleware handle
pub type DynMiddleware = Arc<dyn Middleware>;

// Lets already-shared middleware (the built-ins) be passed wherever an
// `impl Middleware` is accepted.
impl Middleware for DynMiddleware {
    fn handle(&self, ctx: Ctx, next: Next, deps: Deps) -> HandlerFuture {
        (**self).handle(ctx, next, deps)
    }
}

/// Wrap a closure as a [`DynMiddleware`]
pub fn middleware_fn<F, Fut>(f: F) -> DynMiddleware
where
    F: Fn(Ctx, Next, Deps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(f)
}

/// Hook at a fixed stage; returning `Some(response)` short-circuits
pub type StageHook = Arc<dyn Fn(Ctx) -> BoxFuture<'static, Result<Option<Response>>> + Send + Sync>;

/// Hook that may transform an outgoing response
pub type TransformHook =
    Arc<dyn Fn(Ctx, Response) -> BoxFuture<'static, Result<Response>> + Send + Sync>;

/// Hook consulted when the pipeline fails; may yield a response
pub type ErrorHook =
    Arc<dyn Fn(Ctx, Arc<Error>) -> BoxFuture<'static, Option<Response>> + Send + Sync>;

/// Wrap a closure as a [`StageHook`]
pub fn stage_hook<F, Fut>(f: F) -> StageHook
where
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Response>>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Wrap a closure as a [`TransformHook`]
pub fn transform_hook<F, Fut>(f: F) -> TransformHook
where
    F: Fn(Ctx, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(move |ctx, response| Box::pin(f(ctx, response)))
}

/// Wrap a closure as an [`ErrorHook`]
pub fn error_hook<F, Fut>(f: F) -> ErrorHook
where
    F: Fn(Ctx, Arc<Error>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Response>> + Send + 'static,
{
    Arc::new(move |ctx, error| Box::pin(f(ctx, error)))
}

/// Lifecycle hooks wired into every request
#[derive(Clone, Default)]
pub struct Hooks {
    /// Runs before routing; may short-circuit the whole request
    pub on_request: Option<StageHook>,
    /// Runs before schema validation
    pub before_validation: Option<StageHook>,
    /// Runs after schema validation passed
    pub after_validation: Option<StageHook>,
    /// Runs immediately before the handler
    pub before_handler: Option<StageHook>,
    /// May transform the handler's response
    pub after_handler: Option<TransformHook>,
    /// May transform any outgoing response, just before it is written
    pub on_response: Option<TransformHook>,
    /// Consulted once per failed request before the application error handler
    pub on_error: Option<ErrorHook>,
}

impl Hooks {
    /// Whether any terminal-stage hook is installed
    pub fn has_terminal_hooks(&self) -> bool {
        self.before_validation.is_some()
            || self.after_validation.is_some()
            || self.before_handler.is_some()
            || self.after_handler.is_some()
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_request", &self.on_request.is_some())
            .field("before_validation", &self.before_validation.is_some())
            .field("after_validation", &self.after_validation.is_some())
            .field("before_handler", &self.before_handler.is_some())
            .field("after_handler", &self.after_handler.is_some())
            .field("on_response", &self.on_response.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Everything the router stores per registered route
#[derive(Clone)]
pub struct Route {
    /// Terminal handler
    pub handler: DynHandler,
    /// Route-level middleware, run after the global chain
    pub middlewares: Vec<DynMiddleware>,
    /// Optional validation schema
    pub schema: Option<Arc<Schema>>,
    /// Dependency names injected into this route (`None` = whole container)
    pub inject: Option<Arc<[String]>>,
    /// Free-form metadata for collaborators (docs generators, authz, …)
    pub meta: Option<Arc<Value>>,
    /// Response serializer definitions consumed by the external fast-path
    /// serializer; the core only carries them
    pub response_serializers: Option<Arc<Value>>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("middlewares", &self.middlewares.len())
            .field("schema", &self.schema.is_some())
            .field("inject", &self.inject)
            .finish()
    }
}

/// Continuation handed to middleware
///
/// `run` drives the remaining middleware and finally the terminal
/// sub-pipeline. Dropping it without calling `run` short-circuits.
pub struct Next {
    chain: Arc<[DynMiddleware]>,
    index: usize,
    terminal: Arc<Terminal>,
}

impl Next {
    /// Invoke the rest of the pipeline
    pub fn run(mut self, ctx: Ctx, deps: Deps) -> HandlerFuture {
        if self.index < self.chain.len() {
            let middleware = self.chain[self.index].clone();
            self.index += 1;
            middleware.handle(ctx, self, deps)
        } else {
            let terminal = self.terminal.clone();
            Box::pin(async move { terminal.run(ctx, deps).await })
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &(self.chain.len() - self.index))
            .finish()
    }
}

/// The validated-handler sub-pipeline at the end of the middleware chain
struct Terminal {
    hooks: Arc<Hooks>,
    schema: Option<Arc<Schema>>,
    handler: DynHandler,
}

impl Terminal {
    async fn run(&self, ctx: Ctx, deps: Deps) -> Result<Response> {
        if let Some(hook) = &self.hooks.before_validation {
            if let Some(response) = hook(ctx.clone()).await? {
                return Ok(response);
            }
        }

        if let Some(schema) = &self.schema {
            if let Err(report) = schema.check(&ctx).await? {
                return Ok(schema.failure_response(&report));
            }
        }

        if let Some(hook) = &self.hooks.after_validation {
            if let Some(response) = hook(ctx.clone()).await? {
                return Ok(response);
            }
        }

        if let Some(hook) = &self.hooks.before_handler {
            if let Some(response) = hook(ctx.clone()).await? {
                return Ok(response);
            }
        }

        let response = self.handler.call(ctx.clone(), deps).await?;

        match &self.hooks.after_handler {
            Some(hook) => hook(ctx, response).await,
            None => Ok(response),
        }
    }
}

/// Run a matched route through the pipeline
///
/// When there is no middleware, no schema, and no terminal hook, the handler
/// is invoked directly without building the chain.
pub async fn run(
    route: &Route,
    globals: &[DynMiddleware],
    hooks: Arc<Hooks>,
    ctx: Ctx,
    deps: Deps,
) -> Result<Response> {
    let no_middleware = globals.is_empty() && route.middlewares.is_empty();

    // Fast path: plain handler call.
    if no_middleware && route.schema.is_none() && !hooks.has_terminal_hooks() {
        return route.handler.call(ctx, deps).await;
    }

    let terminal = Arc::new(Terminal {
        hooks,
        schema: route.schema.clone(),
        handler: route.handler.clone(),
    });

    if no_middleware {
        return terminal.run(ctx, deps).await;
    }

    let chain: Arc<[DynMiddleware]> = globals
        .iter()
        .chain(route.middlewares.iter())
        .cloned()
        .collect::<Vec<_>>()
        .into();
    Next {
        chain,
        index: 0,
        terminal,
    }
    .run(ctx, deps)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, RawBody};
    use crate::deps::DependencyContainer;
    use crate::response::ResponseBuilder;
    use crate::store::StoreRegistry;
    use crate::validation::Field;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn make_ctx(body: &'static [u8]) -> Ctx {
        let (head, _) = http::Request::builder()
            .method(Method::POST)
            .uri("/test")
            .header("content-type", "application/json")
            .body(())
            .unwrap()
            .into_parts();
        Arc::new(Context::new(
            head,
            RawBody::Full(Bytes::from_static(body)),
            None,
            Arc::new(StoreRegistry::new()),
            1024,
            ResponseBuilder::new(),
        ))
    }

    fn make_deps() -> Deps {
        Deps::all(Arc::new(DependencyContainer::new()))
    }

    fn recording_middleware(log: Log, name: &'static str) -> DynMiddleware {
        middleware_fn(move |ctx: Ctx, next: Next, deps: Deps| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{}-pre", name));
                let result = next.run(ctx, deps).await;
                log.lock().unwrap().push(format!("{}-post", name));
                result
            }
        })
    }

    fn recording_handler(log: Log) -> DynHandler {
        handler_fn(move |ctx: Ctx, _deps: Deps| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("h".to_string());
                Ok(ctx.json(&json!({"ok": true})))
            }
        })
    }

    fn recording_stage(log: Log, name: &'static str) -> StageHook {
        stage_hook(move |_ctx: Ctx| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(name.to_string());
                Ok(None)
            }
        })
    }

    fn route(handler: DynHandler, middlewares: Vec<DynMiddleware>) -> Route {
        Route {
            handler,
            middlewares,
            schema: None,
            inject: None,
            meta: None,
            response_serializers: None,
        }
    }

    #[tokio::test]
    async fn test_full_observed_call_order() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = Hooks::default();
        hooks.before_validation = Some(recording_stage(log.clone(), "before_validation"));
        hooks.after_validation = Some(recording_stage(log.clone(), "after_validation"));
        hooks.before_handler = Some(recording_stage(log.clone(), "before_handler"));
        hooks.after_handler = Some(transform_hook({
            let log = log.clone();
            move |_ctx: Ctx, response: Response| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("after_handler".to_string());
                    Ok(response)
                }
            }
        }));

        let route = route(
            recording_handler(log.clone()),
            vec![recording_middleware(log.clone(), "b")],
        );
        let globals = vec![recording_middleware(log.clone(), "a")];

        let response = run(&route, &globals, Arc::new(hooks), make_ctx(b"{}"), make_deps())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let order = log.lock().unwrap().clone();
        assert_eq!(
            order,
            vec![
                "a-pre",
                "b-pre",
                "before_validation",
                "after_validation",
                "before_handler",
                "h",
                "after_handler",
                "b-post",
                "a-post",
            ]
        );
    }

    #[tokio::test]
    async fn test_middleware_order_without_hooks() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let route = route(
            recording_handler(log.clone()),
            vec![recording_middleware(log.clone(), "b")],
        );
        let globals = vec![recording_middleware(log.clone(), "a")];

        run(&route, &globals, Arc::new(Hooks::default()), make_ctx(b"{}"), make_deps())
            .await
            .unwrap();

        let order = log.lock().unwrap().clone();
        assert_eq!(order, vec!["a-pre", "b-pre", "h", "b-post", "a-post"]);
    }

    #[tokio::test]
    async fn test_hook_short_circuit_skips_handler() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = Hooks::default();
        hooks.before_handler = Some(stage_hook(|_ctx: Ctx| async {
            Ok(Some(Response::text(StatusCode::FORBIDDEN, "halted")))
        }));
        hooks.after_handler = Some(transform_hook({
            let log = log.clone();
            move |_ctx: Ctx, response: Response| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("after_handler".to_string());
                    Ok(response)
                }
            }
        }));

        let route = route(recording_handler(log.clone()), Vec::new());
        let response = run(&route, &[], Arc::new(hooks), make_ctx(b"{}"), make_deps())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::FORBIDDEN);
        // Neither the handler nor after_handler ran
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_middleware_short_circuit() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let gate = middleware_fn(|_ctx: Ctx, _next: Next, _deps: Deps| async {
            Ok(Response::text(StatusCode::UNAUTHORIZED, "denied"))
        });
        let route = route(
            recording_handler(log.clone()),
            vec![recording_middleware(log.clone(), "inner")],
        );
        let globals = vec![recording_middleware(log.clone(), "outer"), gate];

        let response = run(
            &route,
            &globals,
            Arc::new(Hooks::default()),
            make_ctx(b"{}"),
            make_deps(),
        )
        .await
        .unwrap();

        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        let order = log.lock().unwrap().clone();
        // The outer middleware still observes the response on the way out
        assert_eq!(order, vec!["outer-pre", "outer-post"]);
    }

    #[tokio::test]
    async fn test_validation_failure_returns_400_and_skips_handler() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let schema = Schema::new().body(Field::new("name").string().required().min_len(1));
        let mut r = route(recording_handler(log.clone()), Vec::new());
        r.schema = Some(Arc::new(schema));

        let response = run(
            &r,
            &[],
            Arc::new(Hooks::default()),
            make_ctx(br#"{"name":""}"#),
            make_deps(),
        )
        .await
        .unwrap();

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(log.lock().unwrap().is_empty());
        match response.body {
            crate::response::Body::Bytes(ref b) => {
                let body: serde_json::Value = serde_json::from_slice(b).unwrap();
                assert_eq!(body["success"], false);
                assert!(body["message"].as_str().unwrap().contains("name"));
            }
            ref other => panic!("expected buffered body, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_skips_remaining_pipeline() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let failing = handler_fn(|_ctx: Ctx, _deps: Deps| async {
            Err(Error::Internal("handler exploded".to_string()))
        });
        let route = route(failing, Vec::new());
        let globals = vec![recording_middleware(log.clone(), "outer")];
        let mut hooks = Hooks::default();
        hooks.after_handler = Some(transform_hook({
            let log = log.clone();
            move |_ctx: Ctx, response: Response| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("after_handler".to_string());
                    Ok(response)
                }
            }
        }));

        let result = run(&route, &globals, Arc::new(hooks), make_ctx(b"{}"), make_deps()).await;
        assert!(matches!(result, Err(Error::Internal(_))));
        // after_handler never ran; the middleware saw the error pass through
        let order = log.lock().unwrap().clone();
        assert_eq!(order, vec!["outer-pre", "outer-post"]);
    }

    #[tokio::test]
    async fn test_fast_path_direct_handler() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let route = route(recording_handler(log.clone()), Vec::new());
        let response = run(
            &route,
            &[],
            Arc::new(Hooks::default()),
            make_ctx(b"{}"),
            make_deps(),
        )
        .await
        .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(log.lock().unwrap().clone(), vec!["h"]);
    }
}
