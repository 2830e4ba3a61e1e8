//! Application wiring: builder, dispatch, and the request dataflow
//!
//! `AppBuilder` collects routes, middleware, hooks, plugins, dependencies,
//! and stores, then `build()` drives the plugin configure/register/boot
//! phases, applies version prefixes, freezes the router, and wires the
//! pools, metrics, and shutdown coordinator into an [`App`].
//!
//! Per request the app implements the core dataflow: acquire a pooled
//! context → `on_request` → resolve version → radix match → pipeline →
//! `on_response` → write → release.

use futures::future::BoxFuture;
use http::request::Parts;
use http::{header, HeaderValue, Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::Config;
use crate::context::{ContextPool, Ctx, RawBody};
use crate::deps::{DependencyContainer, Deps};
use crate::error::{Error, Result};
use crate::middleware::REQUEST_ID_KEY;
use crate::observability::{CheckStatus, HealthCheck, HealthResponse, Metrics};
use crate::pipeline::{
    self, handler_fn, DynHandler, DynMiddleware, ErrorHook, Hooks, Middleware, Route, StageHook,
    TransformHook,
};
use crate::plugin::{Plugin, PluginEventListener, PluginManager};
use crate::response::{HttpBody, Response};
use crate::router::RadixRouter;
use crate::shutdown::{HealthState, ShutdownCoordinator, ShutdownHook};
use crate::store::{Store, StoreRegistry};
use crate::validation::Schema;
use crate::versioning::{DeprecationInfo, Versioner};

/// Application-level error handler, replacing the default 500 policy
pub type ErrorHandler = Arc<dyn Fn(Ctx, Arc<Error>) -> BoxFuture<'static, Response> + Send + Sync>;

/// One route registration with its options
pub struct RouteDef {
    method: Method,
    path: String,
    handler: DynHandler,
    middlewares: Vec<DynMiddleware>,
    schema: Option<Arc<Schema>>,
    inject: Option<Arc<[String]>>,
    meta: Option<Arc<Value>>,
    response_serializers: Option<Arc<Value>>,
}

impl RouteDef {
    /// A route from a method, path, and handler closure
    pub fn new<F, Fut>(method: Method, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self {
            method,
            path: path.into(),
            handler: handler_fn(handler),
            middlewares: Vec::new(),
            schema: None,
            inject: None,
            meta: None,
            response_serializers: None,
        }
    }

    /// Attach route-level middleware (runs after the global chain)
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Attach a validation schema
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Restrict injected dependencies to the named subset
    #[must_use]
    pub fn inject<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.inject = Some(Arc::from(names));
        self
    }

    /// Attach free-form metadata for collaborators
    #[must_use]
    pub fn meta(mut self, value: Value) -> Self {
        self.meta = Some(Arc::new(value));
        self
    }

    /// Attach response serializer definitions for the external serializer
    #[must_use]
    pub fn response_serializers(mut self, value: Value) -> Self {
        self.response_serializers = Some(Arc::new(value));
        self
    }
}

/// Collects registrations and produces an [`App`]
pub struct AppBuilder {
    config: Config,
    routes: Vec<RouteDef>,
    middlewares: Vec<DynMiddleware>,
    hooks: Hooks,
    deps: DependencyContainer,
    stores: Arc<StoreRegistry>,
    plugins: PluginManager,
    versioner: Versioner,
    health_checks: Vec<(String, HealthCheck)>,
    fallback: Option<DynHandler>,
    error_handler: Option<ErrorHandler>,
    shutdown_hooks: Vec<ShutdownHook>,
    on_shutdown_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl AppBuilder {
    /// Start a builder from configuration
    pub fn new(config: Config) -> Self {
        let versioner = Versioner::from_config(&config.versioning);
        Self {
            config,
            routes: Vec::new(),
            middlewares: Vec::new(),
            hooks: Hooks::default(),
            deps: DependencyContainer::new(),
            stores: Arc::new(StoreRegistry::new()),
            plugins: PluginManager::new(),
            versioner,
            health_checks: Vec::new(),
            fallback: None,
            error_handler: None,
            shutdown_hooks: Vec::new(),
            on_shutdown_complete: None,
        }
    }

    /// The configuration this app was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable configuration access; plugins may adjust settings during
    /// their `configure` phase, before anything reads them
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Register a route with options
    pub fn route(&mut self, def: RouteDef) -> &mut Self {
        self.routes.push(def);
        self
    }

    /// Register a GET route
    pub fn get<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.route(RouteDef::new(Method::GET, path, handler))
    }

    /// Register a POST route
    pub fn post<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.route(RouteDef::new(Method::POST, path, handler))
    }

    /// Register a PUT route
    pub fn put<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.route(RouteDef::new(Method::PUT, path, handler))
    }

    /// Register a DELETE route
    pub fn delete<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.route(RouteDef::new(Method::DELETE, path, handler))
    }

    /// Register a PATCH route
    pub fn patch<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.route(RouteDef::new(Method::PATCH, path, handler))
    }

    /// Register a HEAD route
    pub fn head<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.route(RouteDef::new(Method::HEAD, path, handler))
    }

    /// Register an OPTIONS route
    pub fn options<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.route(RouteDef::new(Method::OPTIONS, path, handler))
    }

    /// Append global middleware (runs in registration order)
    pub fn middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Install the `on_request` hook
    pub fn on_request(&mut self, hook: StageHook) -> &mut Self {
        self.hooks.on_request = Some(hook);
        self
    }

    /// Install the `before_validation` hook
    pub fn before_validation(&mut self, hook: StageHook) -> &mut Self {
        self.hooks.before_validation = Some(hook);
        self
    }

    /// Install the `after_validation` hook
    pub fn after_validation(&mut self, hook: StageHook) -> &mut Self {
        self.hooks.after_validation = Some(hook);
        self
    }

    /// Install the `before_handler` hook
    pub fn before_handler(&mut self, hook: StageHook) -> &mut Self {
        self.hooks.before_handler = Some(hook);
        self
    }

    /// Install the `after_handler` hook
    pub fn after_handler(&mut self, hook: TransformHook) -> &mut Self {
        self.hooks.after_handler = Some(hook);
        self
    }

    /// Install the `on_response` hook
    pub fn on_response(&mut self, hook: TransformHook) -> &mut Self {
        self.hooks.on_response = Some(hook);
        self
    }

    /// Install the `on_error` hook
    pub fn on_error(&mut self, hook: ErrorHook) -> &mut Self {
        self.hooks.on_error = Some(hook);
        self
    }

    /// Register a dependency
    pub fn provide<T: std::any::Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> &mut Self {
        self.deps.provide(name, value);
        self
    }

    /// Register a store type for singleton and request-scoped access
    pub fn register_store<S: Store>(&mut self) -> &mut Self {
        self.stores.register::<S>();
        self
    }

    /// Add a plugin with its configuration
    pub fn plugin(&mut self, plugin: impl Plugin, config: Value) -> Result<&mut Self> {
        self.plugins.add(Arc::new(plugin), config)?;
        Ok(self)
    }

    /// Subscribe to plugin lifecycle events
    pub fn on_plugin_event(&mut self, listener: PluginEventListener) -> &mut Self {
        self.plugins.subscribe(listener);
        self
    }

    /// Register an additional API version
    pub fn register_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.versioner.register(version);
        self
    }

    /// Mark an API version as deprecated
    pub fn deprecate_version(
        &mut self,
        version: impl Into<String>,
        info: DeprecationInfo,
    ) -> &mut Self {
        self.versioner.deprecate(version, info);
        self
    }

    /// Add a named health check surfaced by the health endpoint
    pub fn health_check(
        &mut self,
        name: impl Into<String>,
        check: impl Fn() -> CheckStatus + Send + Sync + 'static,
    ) -> &mut Self {
        self.health_checks.push((name.into(), Arc::new(check)));
        self
    }

    /// Install a fallback handler for unmatched requests (replaces the 404)
    pub fn fallback<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Deps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        self.fallback = Some(handler_fn(handler));
        self
    }

    /// Replace the default application error handler
    pub fn error_handler<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Ctx, Arc<Error>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.error_handler = Some(Arc::new(move |ctx, error| Box::pin(handler(ctx, error))));
        self
    }

    /// Register a shutdown hook; higher priority runs first
    pub fn shutdown_hook(&mut self, hook: ShutdownHook) -> &mut Self {
        self.shutdown_hooks.push(hook);
        self
    }

    /// Callback invoked once the shutdown sequence has finished
    pub fn on_shutdown_complete(&mut self, callback: impl FnOnce() + Send + 'static) -> &mut Self {
        self.on_shutdown_complete = Some(Box::new(callback));
        self
    }

    /// Drive plugin configure/register/boot, freeze the router, and wire the
    /// runtime pieces together
    ///
    /// Any failure here aborts startup; the listener never opens.
    pub async fn build(mut self) -> Result<App> {
        let mut plugins = std::mem::take(&mut self.plugins);
        plugins.resolve()?;
        plugins.run_configure(&mut self).await?;
        plugins.run_register(&mut self).await?;

        let config = self.config.clone();
        let metrics = Arc::new(Metrics::new());
        let coordinator = Arc::new(ShutdownCoordinator::new(config.shutdown.clone()));
        for hook in self.shutdown_hooks.drain(..) {
            coordinator.add_hook(hook);
        }
        if let Some(callback) = self.on_shutdown_complete.take() {
            coordinator.on_complete(callback);
        }

        let body_limit = config.service.body_limit_mb * 1024 * 1024;
        let pool = Arc::new(ContextPool::new(
            &config.pool,
            self.stores.clone(),
            body_limit,
        ));

        // Routes land in the tree under their (possibly defaulted) version.
        let mut router = RadixRouter::new();
        let routes = std::mem::take(&mut self.routes);
        for def in routes {
            let expanded = self.versioner.expand_route_path(&def.path);
            router.insert(
                def.method.clone(),
                &expanded,
                Route {
                    handler: def.handler,
                    middlewares: def.middlewares,
                    schema: def.schema,
                    inject: def.inject,
                    meta: def.meta,
                    response_serializers: def.response_serializers,
                },
            )?;
        }
        tracing::info!(routes = router.len(), "Router initialized");

        let ops_routes = self.build_ops_routes(&router, &metrics, &coordinator, &pool);

        plugins.run_boot().await?;

        let plugin_count = plugins.len();
        let plugins = Arc::new(tokio::sync::Mutex::new(plugins));
        if plugin_count > 0 {
            let per_plugin = config.shutdown.hook_timeout();
            let hook_plugins = plugins.clone();
            coordinator.add_hook(ShutdownHook::new(
                "plugins",
                i32::MIN,
                per_plugin * (plugin_count as u32 + 1),
                move || {
                    let plugins = hook_plugins.clone();
                    async move {
                        plugins.lock().await.run_shutdown(per_plugin).await;
                        Ok(())
                    }
                },
            ));
        }

        let expose_detail = !config.is_production();
        Ok(App {
            inner: Arc::new(AppInner {
                config,
                router,
                middlewares: self.middlewares,
                hooks: Arc::new(self.hooks),
                deps: Arc::new(self.deps),
                stores: self.stores,
                versioner: self.versioner,
                pool,
                metrics,
                coordinator,
                plugins,
                ops_routes,
                fallback: self.fallback,
                error_handler: self.error_handler,
                expose_detail,
            }),
        })
    }

    /// Build the health and metrics handlers, skipping any path an
    /// application route already binds
    fn build_ops_routes(
        &mut self,
        router: &RadixRouter<Route>,
        metrics: &Arc<Metrics>,
        coordinator: &Arc<ShutdownCoordinator>,
        pool: &Arc<ContextPool>,
    ) -> HashMap<(Method, String), DynHandler> {
        let mut ops_routes = HashMap::new();
        if !self.config.observability.enabled {
            return ops_routes;
        }

        let health_path = self.config.observability.health_path.clone();
        if router.contains(&Method::GET, &self.versioner.expand_route_path(&health_path)) {
            tracing::warn!(
                path = %health_path,
                "Health endpoint not registered: an application route binds this path"
            );
        } else {
            let coordinator = coordinator.clone();
            let checks: Arc<[(String, HealthCheck)]> =
                Arc::from(std::mem::take(&mut self.health_checks));
            let handler = handler_fn(move |_ctx: Ctx, _deps: Deps| {
                let coordinator = coordinator.clone();
                let checks = checks.clone();
                async move {
                    let state = coordinator.health_state();
                    let mut results = HashMap::new();
                    let mut all_healthy = true;
                    for (name, check) in checks.iter() {
                        let status = check();
                        all_healthy &= status.healthy;
                        results.insert(name.clone(), status);
                    }
                    let status = if state == HealthState::Running && all_healthy {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok(Response::json(status, &HealthResponse::new(state, results)))
                }
            });
            ops_routes.insert((Method::GET, health_path), handler);
        }

        let metrics_path = self.config.observability.metrics_path.clone();
        if router.contains(&Method::GET, &self.versioner.expand_route_path(&metrics_path)) {
            tracing::warn!(
                path = %metrics_path,
                "Metrics endpoint not registered: an application route binds this path"
            );
        } else {
            let metrics = metrics.clone();
            let coordinator = coordinator.clone();
            let pool = pool.clone();
            let handler = handler_fn(move |ctx: Ctx, _deps: Deps| {
                let metrics = metrics.clone();
                let coordinator = coordinator.clone();
                let pool = pool.clone();
                async move {
                    let contexts = pool.stats();
                    let builders = pool.builder_pool().stats();
                    let active = coordinator.active_count();
                    if ctx.query().get("format") == Some("json") {
                        Ok(Response::json(
                            StatusCode::OK,
                            &metrics.snapshot(active, contexts, builders),
                        ))
                    } else {
                        Ok(Response::text(
                            StatusCode::OK,
                            metrics.render_prometheus(active, contexts, builders),
                        ))
                    }
                }
            });
            ops_routes.insert((Method::GET, metrics_path), handler);
        }

        ops_routes
    }
}

struct AppInner {
    config: Config,
    router: RadixRouter<Route>,
    middlewares: Vec<DynMiddleware>,
    hooks: Arc<Hooks>,
    deps: Arc<DependencyContainer>,
    stores: Arc<StoreRegistry>,
    versioner: Versioner,
    pool: Arc<ContextPool>,
    metrics: Arc<Metrics>,
    coordinator: Arc<ShutdownCoordinator>,
    plugins: Arc<tokio::sync::Mutex<PluginManager>>,
    ops_routes: HashMap<(Method, String), DynHandler>,
    fallback: Option<DynHandler>,
    error_handler: Option<ErrorHandler>,
    expose_detail: bool,
}

/// The assembled application; cheap to clone, shared with every connection
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    /// Start building an application
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// The configuration this app runs with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Current health state
    pub fn health_state(&self) -> HealthState {
        self.inner.coordinator.health_state()
    }

    /// The shutdown coordinator
    pub fn shutdown_coordinator(&self) -> Arc<ShutdownCoordinator> {
        self.inner.coordinator.clone()
    }

    /// The store registry
    pub fn stores(&self) -> Arc<StoreRegistry> {
        self.inner.stores.clone()
    }

    /// The metrics registry
    pub fn metrics(&self) -> Arc<Metrics> {
        self.inner.metrics.clone()
    }

    /// The plugin manager (for `ready`/diagnostics; locked)
    pub(crate) fn plugins(&self) -> Arc<tokio::sync::Mutex<PluginManager>> {
        self.inner.plugins.clone()
    }

    /// Trigger graceful shutdown programmatically
    pub fn shutdown(&self) {
        self.inner.coordinator.begin();
    }

    /// Handle one hyper request (called by the server per connection)
    pub async fn handle(
        &self,
        req: hyper::Request<hyper::body::Incoming>,
        remote_addr: Option<SocketAddr>,
    ) -> hyper::Response<HttpBody> {
        let (parts, body) = req.into_parts();
        self.handle_request(parts, RawBody::Hyper(body), remote_addr)
            .await
            .into_hyper()
    }

    /// Handle one request given its parts
    ///
    /// Public so applications and tests can exercise dispatch without a
    /// socket.
    pub async fn handle_request(
        &self,
        parts: Parts,
        body: RawBody,
        remote_addr: Option<SocketAddr>,
    ) -> Response {
        let inner = &self.inner;
        inner.metrics.record_request();

        // Infrastructure endpoints stay reachable while draining so load
        // balancers observe the draining health status.
        let is_ops = inner
            .ops_routes
            .contains_key(&(parts.method.clone(), parts.uri.path().to_string()));
        if !is_ops && inner.coordinator.is_draining() {
            inner.metrics.record_draining_rejection();
            let response = draining_response(inner.coordinator.retry_after_secs());
            inner.metrics.record_response(response.status);
            return response;
        }

        let guard = inner
            .coordinator
            .track_request(&parts.method, parts.uri.path());
        let ctx = inner.pool.acquire(parts, body, remote_addr);

        let mut response = match self.try_dispatch(ctx.clone()).await {
            Ok(response) => response,
            Err(error) => self.error_response(ctx.clone(), error).await,
        };

        if let Some(version) = ctx.version() {
            inner.versioner.apply_deprecation_headers(&version, &mut response);
        }

        if let Some(hook) = &inner.hooks.on_response {
            match hook(ctx.clone(), response).await {
                Ok(transformed) => response = transformed,
                Err(error) => {
                    tracing::error!("on_response hook failed: {}", error);
                    response = error.to_response(inner.expose_detail);
                }
            }
        }

        inner.metrics.record_response(response.status);
        inner.pool.release(ctx);
        drop(guard);
        response
    }

    async fn try_dispatch(&self, ctx: Ctx) -> Result<Response> {
        let inner = &self.inner;

        // Infrastructure endpoints bypass versioning and the pipeline.
        if let Some(handler) = inner
            .ops_routes
            .get(&(ctx.method().clone(), ctx.path().to_string()))
        {
            return handler.call(ctx.clone(), Deps::all(inner.deps.clone())).await;
        }

        if let Some(hook) = &inner.hooks.on_request {
            if let Some(response) = hook(ctx.clone()).await? {
                return Ok(response);
            }
        }

        let resolution = inner.versioner.resolve(&ctx);
        ctx.set_version(resolution.resolved.clone());

        // A version without its own route for this path falls back to the
        // default version's registration; the context keeps the resolved
        // version either way.
        let matched = inner
            .router
            .find(ctx.method(), &resolution.match_path)
            .or_else(|| {
                inner
                    .versioner
                    .fallback_match_path(&resolution)
                    .and_then(|path| inner.router.find(ctx.method(), &path))
            });

        match matched {
            Some(matched) => {
                ctx.set_params(matched.params);
                let route = matched.value.clone();
                let deps = match &route.inject {
                    Some(names) => Deps::subset(inner.deps.clone(), names.clone()),
                    None => Deps::all(inner.deps.clone()),
                };
                pipeline::run(&route, &inner.middlewares, inner.hooks.clone(), ctx, deps).await
            }
            None => {
                if let Some(fallback) = &inner.fallback {
                    return fallback.call(ctx.clone(), Deps::all(inner.deps.clone())).await;
                }
                if inner
                    .router
                    .path_exists_under_other_method(ctx.method(), &resolution.match_path)
                {
                    Err(Error::MethodNotAllowed(ctx.path().to_string()))
                } else {
                    Err(Error::NotFound(ctx.path().to_string()))
                }
            }
        }
    }

    /// Outer error frame: intentional responses pass through, `on_error` is
    /// consulted once, then the application error handler runs
    async fn error_response(&self, ctx: Ctx, error: Error) -> Response {
        if let Error::Response(response) = error {
            return *response;
        }

        let error = Arc::new(error);
        if let Some(hook) = &self.inner.hooks.on_error {
            if let Some(response) = hook(ctx.clone(), error.clone()).await {
                return response;
            }
        }
        if let Some(handler) = &self.inner.error_handler {
            return handler(ctx.clone(), error.clone()).await;
        }

        let request_id = ctx
            .get(REQUEST_ID_KEY)
            .and_then(|v| v.as_str().map(String::from));
        let status = error.status();
        if status.is_server_error() {
            tracing::error!(
                method = %ctx.method(),
                path = %ctx.path(),
                request_id = ?request_id,
                "Request failed: {}",
                error
            );
        } else {
            tracing::debug!(
                method = %ctx.method(),
                path = %ctx.path(),
                request_id = ?request_id,
                "Request rejected: {}",
                error
            );
        }
        error.to_response(self.inner.expose_detail)
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("service", &self.inner.config.service.name)
            .field("routes", &self.inner.router.len())
            .field("state", &self.health_state())
            .finish()
    }
}

/// The 503 sent to requests arriving while the server drains
fn draining_response(retry_after_secs: u64) -> Response {
    let mut response = Response::json(
        StatusCode::SERVICE_UNAVAILABLE,
        &json!({
            "error": "Service Unavailable",
            "message": "Server is shutting down",
            "retryAfter": retry_after_secs,
        }),
    );
    response
        .headers
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
        response.headers.insert(header::RETRY_AFTER, value);
    }
    response
}
