//! Per-request context with lazy parsing and pooled reuse
//!
//! A [`Context`] is created (or reacquired from the pool) when a connection
//! delivers a request and released after the response is written. Everything
//! beyond the method and path is computed on first access: the URL object,
//! query map, cookie map, and body never cost anything for handlers that do
//! not touch them.

mod body;
mod pool;

pub use body::{ParsedBody, RawBody};
pub use pool::{ContextPool, PoolStats, ResponseBuilderPool};

use http::header::HeaderMap;
use http::request::Parts;
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tokio::sync::OnceCell;
use url::Url;

use crate::cookies;
use crate::error::{Error, Result};
use crate::response::{Response, ResponseBuilder};
use crate::store::{RequestStores, Store, StoreInstance, StoreRegistry};
use crate::versioning::{ResolvedVersion, VersionSource};

/// Shared handle to a request context
///
/// Middleware, hooks, and handlers receive clones of this handle; the pool
/// only reuses a context once every clone has been dropped.
pub type Ctx = Arc<Context>;

/// Parsed query string with repeated-key support
#[derive(Debug, Default, Clone)]
pub struct Query {
    map: HashMap<String, Vec<String>>,
}

impl Query {
    fn parse(raw: Option<&str>) -> Self {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(raw) = raw {
            for (key, value) in url::form_urlencoded::parse(raw.as_bytes()) {
                map.entry(key.into_owned())
                    .or_default()
                    .push(value.into_owned());
            }
        }
        Self { map }
    }

    /// First value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    /// All values for a key
    pub fn all(&self, key: &str) -> &[String] {
        self.map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the key appeared at all
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the query string was absent or empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over keys and their values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Per-request state shared through [`Ctx`]
pub struct Context {
    // Fixed for the lifetime of one request; rewritten by the pool.
    method: Method,
    path: String,
    head: Parts,
    remote_addr: Option<SocketAddr>,

    registry: Arc<StoreRegistry>,
    body_limit: usize,

    raw_body: Mutex<RawBody>,

    // Lazy, memoized on first access.
    url: OnceLock<Option<Url>>,
    query: OnceLock<Query>,
    cookies: OnceLock<HashMap<String, String>>,
    parsed_body: OnceCell<std::result::Result<ParsedBody, String>>,

    // Written by the router and versioner.
    params: RwLock<Vec<(String, String)>>,
    version: RwLock<Option<ResolvedVersion>>,

    // Mutable user area.
    values: RwLock<HashMap<String, Value>>,
    request_stores: RequestStores,

    // Pooled response customization.
    builder: Mutex<Option<ResponseBuilder>>,
}

impl Context {
    /// Create a context for a request
    pub fn new(
        head: Parts,
        raw_body: RawBody,
        remote_addr: Option<SocketAddr>,
        registry: Arc<StoreRegistry>,
        body_limit: usize,
        builder: ResponseBuilder,
    ) -> Self {
        Self {
            method: head.method.clone(),
            path: head.uri.path().to_string(),
            head,
            remote_addr,
            registry,
            body_limit,
            raw_body: Mutex::new(raw_body),
            url: OnceLock::new(),
            query: OnceLock::new(),
            cookies: OnceLock::new(),
            parsed_body: OnceCell::new(),
            params: RwLock::new(Vec::new()),
            version: RwLock::new(None),
            values: RwLock::new(HashMap::new()),
            request_stores: RequestStores::default(),
            builder: Mutex::new(Some(builder)),
        }
    }

    /// Reset a pooled context for a new request without reallocating the
    /// collections it already carries
    pub(crate) fn reinitialize(
        &mut self,
        head: Parts,
        raw_body: RawBody,
        remote_addr: Option<SocketAddr>,
        builder: ResponseBuilder,
    ) {
        self.method = head.method.clone();
        self.path = head.uri.path().to_string();
        self.head = head;
        self.remote_addr = remote_addr;
        *self.raw_body.get_mut().unwrap_or_else(|p| p.into_inner()) = raw_body;
        self.url = OnceLock::new();
        self.query = OnceLock::new();
        self.cookies = OnceLock::new();
        self.parsed_body = OnceCell::new();
        self.params.get_mut().unwrap_or_else(|p| p.into_inner()).clear();
        *self.version.get_mut().unwrap_or_else(|p| p.into_inner()) = None;
        self.values.get_mut().unwrap_or_else(|p| p.into_inner()).clear();
        self.request_stores.dispose();
        *self.builder.get_mut().unwrap_or_else(|p| p.into_inner()) = Some(builder);
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path as received (before version rewriting)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// A header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Peer address of the connection, when known
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Full request URL, built lazily from the `Host` header
    pub fn url(&self) -> Option<&Url> {
        self.url
            .get_or_init(|| {
                let host = self.header("host").unwrap_or("localhost");
                let query = self
                    .head
                    .uri
                    .query()
                    .map(|q| format!("?{}", q))
                    .unwrap_or_default();
                Url::parse(&format!("http://{}{}{}", host, self.path, query)).ok()
            })
            .as_ref()
    }

    /// Parsed query string, computed on first access
    pub fn query(&self) -> &Query {
        self.query
            .get_or_init(|| Query::parse(self.head.uri.query()))
    }

    /// Cookies from the `Cookie` header, computed on first access
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies.get_or_init(|| {
            self.header("cookie")
                .map(cookies::parse_cookie_header)
                .unwrap_or_default()
        })
    }

    /// A single cookie value
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    /// Read and parse the request body
    ///
    /// The underlying read happens exactly once; concurrent callers await the
    /// same in-flight parse and all observe the memoized result. Fails with
    /// [`Error::BodyParse`] on malformed or oversized input.
    pub async fn body(&self) -> Result<ParsedBody> {
        let content_type = self.header("content-type").map(str::to_string);
        let result = self
            .parsed_body
            .get_or_init(|| async {
                let raw = {
                    let mut guard = self
                        .raw_body
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    std::mem::replace(&mut *guard, RawBody::None)
                };
                let bytes = body::read_raw(raw, self.body_limit).await?;
                body::parse_bytes(&bytes, content_type.as_deref())
            })
            .await;
        result.clone().map_err(Error::BodyParse)
    }

    /// Route parameters captured by the router
    pub fn params(&self) -> Vec<(String, String)> {
        self.params
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// A single route parameter
    pub fn param(&self, name: &str) -> Option<String> {
        self.params
            .read()
            .ok()
            .and_then(|p| p.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()))
    }

    /// Install the router's parameter captures
    pub fn set_params(&self, params: Vec<(String, String)>) {
        if let Ok(mut slot) = self.params.write() {
            *slot = params;
        }
    }

    /// Resolved API version, once versioning has run
    pub fn version(&self) -> Option<String> {
        self.version
            .read()
            .ok()
            .and_then(|v| v.as_ref().map(|r| r.version.clone()))
    }

    /// Where the version came from
    pub fn version_source(&self) -> Option<VersionSource> {
        self.version
            .read()
            .ok()
            .and_then(|v| v.as_ref().map(|r| r.source))
    }

    /// Record the versioner's resolution
    pub fn set_version(&self, resolved: ResolvedVersion) {
        if let Ok(mut slot) = self.version.write() {
            *slot = Some(resolved);
        }
    }

    /// Store a request-scoped value
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
    }

    /// Read a request-scoped value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().ok().and_then(|v| v.get(key).cloned())
    }

    /// The process-wide singleton instance of a registered store
    pub fn store<S: Store>(&self) -> Result<Arc<StoreInstance>> {
        self.registry.singleton::<S>()
    }

    /// The request-scoped instance of a registered store, created lazily
    pub fn request_store<S: Store>(&self) -> Result<Arc<StoreInstance>> {
        self.request_stores.get_or_create::<S>(&self.registry)
    }

    // ------------------------------------------------------------------
    // Response construction
    // ------------------------------------------------------------------

    /// Record a status override for the outgoing response
    pub fn status(&self, status: StatusCode) {
        self.with_builder(|b| b.set_status(status));
    }

    /// Record a response header
    pub fn set_header(&self, name: http::header::HeaderName, value: http::header::HeaderValue) {
        self.with_builder(|b| b.set_header(name, value));
    }

    /// Record a `Set-Cookie` for the outgoing response
    pub fn set_cookie(&self, cookie: cookies::Cookie) {
        self.with_builder(|b| b.add_cookie(cookie));
    }

    /// JSON response (200 unless overridden via [`Context::status`])
    pub fn json<T: Serialize>(&self, value: &T) -> Response {
        self.apply_builder(Response::json(StatusCode::OK, value))
    }

    /// JSON response with an explicit status
    pub fn json_with_status<T: Serialize>(&self, status: StatusCode, value: &T) -> Response {
        self.apply_builder(Response::json(status, value))
    }

    /// HTML response
    pub fn html(&self, body: impl Into<String>) -> Response {
        self.apply_builder(Response::html(StatusCode::OK, body))
    }

    /// Plain-text response
    pub fn text(&self, body: impl Into<String>) -> Response {
        self.apply_builder(Response::text(StatusCode::OK, body))
    }

    /// Redirect response
    pub fn redirect(&self, location: &str) -> Response {
        self.apply_builder(Response::redirect(location))
    }

    /// Streaming response
    pub fn stream(
        &self,
        content_type: &str,
        stream: futures::stream::BoxStream<'static, std::io::Result<bytes::Bytes>>,
    ) -> Response {
        self.apply_builder(Response::stream(StatusCode::OK, content_type, stream))
    }

    fn with_builder(&self, f: impl FnOnce(&mut ResponseBuilder)) {
        let mut guard = self
            .builder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(guard.get_or_insert_with(ResponseBuilder::new));
    }

    /// Apply any recorded customization onto a response
    pub fn apply_builder(&self, response: Response) -> Response {
        let guard = self
            .builder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            // Hot path: nothing recorded, pre-cached headers pass through.
            Some(builder) if !builder.is_pristine() => builder.apply(response),
            _ => response,
        }
    }

    /// Detach the pooled response builder (returned to its own pool)
    pub(crate) fn take_builder(&self) -> Option<ResponseBuilder> {
        self.builder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Clear request-scoped state; called once before release
    pub fn dispose(&self) {
        self.request_stores.dispose();
        if let Ok(mut params) = self.params.write() {
            params.clear();
        }
        if let Ok(mut values) = self.values.write() {
            values.clear();
        }
        if let Ok(mut version) = self.version.write() {
            *version = None;
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("version", &self.version())
            .finish()
    }
}
