//! API version resolution and deprecation support
//!
//! Versions live in the routing tree as a leading path segment. Routes
//! registered without a version are automatically prefixed with the default
//! version, and each request resolves its version through the configured
//! strategies before the router runs:
//!
//! 1. **path** — the first path segment names a registered version.
//! 2. **header** — the configured header carries a registered version.
//! 3. **query** — the configured query parameter carries a registered version.
//! 4. Otherwise the default version applies.
//!
//! For header/query/default resolution the path used for matching is
//! rewritten to `/{version}{original_path}`. The resolution source is
//! recorded on the context for observability.

use http::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::{VersionStrategy, VersioningConfig};
use crate::context::Context;
use crate::response::Response;

/// Where a request's version was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionSource {
    /// Leading path segment
    Path,
    /// Configured request header
    Header,
    /// Configured query parameter
    Query,
    /// No strategy resolved; the default version applied
    Default,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::Header => write!(f, "header"),
            Self::Query => write!(f, "query"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// A resolved version recorded on the context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// The version identifier, e.g. `v2`
    pub version: String,
    /// Which strategy produced it
    pub source: VersionSource,
}

/// Outcome of version resolution for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Version and source, to record on the context
    pub resolved: ResolvedVersion,
    /// Path handed to the router (rewritten unless resolved from the path)
    pub match_path: String,
    /// The path with the version segment removed; used to retry the match
    /// under the default version when the resolved one has no such route
    pub rest_path: String,
}

/// Deprecation information for an API version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeprecationInfo {
    /// The recommended replacement version
    pub replacement: String,
    /// Sunset date in RFC 3339 format (when the version will be removed)
    pub sunset_date: Option<String>,
    /// Optional deprecation message
    pub message: Option<String>,
}

impl DeprecationInfo {
    /// Create a new deprecation info
    pub fn new(replacement: impl Into<String>) -> Self {
        Self {
            replacement: replacement.into(),
            sunset_date: None,
            message: None,
        }
    }

    /// Set the sunset date (RFC 3339 format)
    #[must_use]
    pub fn with_sunset_date(mut self, date: impl Into<String>) -> Self {
        self.sunset_date = Some(date.into());
        self
    }

    /// Set a custom deprecation message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Generate deprecation header value
    fn deprecation_header(&self, version: &str) -> String {
        format!("version=\"{}\"", version)
    }

    /// Generate Link header value pointing to the replacement version
    fn link_header(&self) -> String {
        format!("</{}/>; rel=\"successor-version\"", self.replacement)
    }
}

/// Resolves the API version for each request and rewrites the match path
#[derive(Debug)]
pub struct Versioner {
    strategies: Vec<VersionStrategy>,
    header: String,
    query_param: String,
    default_version: String,
    registered: HashSet<String>,
    deprecations: HashMap<String, DeprecationInfo>,
}

impl Versioner {
    /// Build a versioner from configuration
    ///
    /// The default version is always part of the registered set.
    pub fn from_config(config: &VersioningConfig) -> Self {
        let mut registered: HashSet<String> = config.versions.iter().cloned().collect();
        registered.insert(config.default_version.clone());
        Self {
            strategies: config.strategies.clone(),
            header: config.header.to_lowercase(),
            query_param: config.query_param.clone(),
            default_version: config.default_version.clone(),
            registered,
            deprecations: HashMap::new(),
        }
    }

    /// Register an additional version
    pub fn register(&mut self, version: impl Into<String>) {
        self.registered.insert(version.into());
    }

    /// Whether a version is registered
    pub fn is_registered(&self, version: &str) -> bool {
        self.registered.contains(version)
    }

    /// The default version
    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    /// Mark a version as deprecated
    pub fn deprecate(&mut self, version: impl Into<String>, info: DeprecationInfo) {
        self.deprecations.insert(version.into(), info);
    }

    /// Deprecation info for a version, if any
    pub fn deprecation_for(&self, version: &str) -> Option<&DeprecationInfo> {
        self.deprecations.get(version)
    }

    /// Prefix a registration path with the default version unless it already
    /// starts with a registered version segment
    pub fn expand_route_path(&self, path: &str) -> String {
        if let Some(first) = first_segment(path) {
            if self.registered.contains(first) {
                return path.to_string();
            }
        }
        if path == "/" || path.is_empty() {
            format!("/{}", self.default_version)
        } else {
            format!("/{}{}", self.default_version, path)
        }
    }

    /// Resolve the version for a request, trying strategies in configured
    /// order and falling back to the default
    pub fn resolve(&self, ctx: &Context) -> Resolution {
        for strategy in &self.strategies {
            match strategy {
                VersionStrategy::Path => {
                    if let Some(first) = first_segment(ctx.path()) {
                        if self.registered.contains(first) {
                            let rest = ctx
                                .path()
                                .trim_start_matches('/')
                                .strip_prefix(first)
                                .map(|rest| {
                                    if rest.is_empty() {
                                        "/".to_string()
                                    } else {
                                        rest.to_string()
                                    }
                                })
                                .unwrap_or_else(|| "/".to_string());
                            return Resolution {
                                resolved: ResolvedVersion {
                                    version: first.to_string(),
                                    source: VersionSource::Path,
                                },
                                // The path already carries the version.
                                match_path: ctx.path().to_string(),
                                rest_path: rest,
                            };
                        }
                    }
                }
                VersionStrategy::Header => {
                    if let Some(value) = ctx.header(&self.header) {
                        let value = value.trim();
                        if self.registered.contains(value) {
                            return self.rewritten(ctx, value, VersionSource::Header);
                        }
                    }
                }
                VersionStrategy::Query => {
                    if let Some(value) = ctx.query().get(&self.query_param) {
                        if self.registered.contains(value) {
                            let version = value.to_string();
                            return self.rewritten(ctx, &version, VersionSource::Query);
                        }
                    }
                }
            }
        }
        let default = self.default_version.clone();
        self.rewritten(ctx, &default, VersionSource::Default)
    }

    fn rewritten(&self, ctx: &Context, version: &str, source: VersionSource) -> Resolution {
        let path = ctx.path();
        let match_path = if path == "/" || path.is_empty() {
            format!("/{}", version)
        } else {
            format!("/{}{}", version, path)
        };
        Resolution {
            resolved: ResolvedVersion {
                version: version.to_string(),
                source,
            },
            match_path,
            rest_path: if path.is_empty() {
                "/".to_string()
            } else {
                path.to_string()
            },
        }
    }

    /// Match path to retry under the default version, when the resolved
    /// version carried no route for this path
    ///
    /// Returns `None` when the request already resolved to the default.
    pub fn fallback_match_path(&self, resolution: &Resolution) -> Option<String> {
        if resolution.resolved.version == self.default_version {
            return None;
        }
        let rest = &resolution.rest_path;
        Some(if rest == "/" {
            format!("/{}", self.default_version)
        } else {
            format!("/{}{}", self.default_version, rest)
        })
    }

    /// Attach deprecation headers when the request was served under a
    /// deprecated version
    pub fn apply_deprecation_headers(&self, version: &str, response: &mut Response) {
        let Some(info) = self.deprecations.get(version) else {
            return;
        };

        // Deprecation header (RFC 8594)
        if let Ok(value) = HeaderValue::from_str(&info.deprecation_header(version)) {
            response
                .headers
                .insert(HeaderName::from_static("deprecation"), value);
        }

        // Sunset header if configured (RFC 8594)
        if let Some(ref sunset) = info.sunset_date {
            if let Ok(value) = HeaderValue::from_str(sunset) {
                response
                    .headers
                    .insert(HeaderName::from_static("sunset"), value);
            }
        }

        // Link header pointing to the replacement version
        if let Ok(value) = HeaderValue::from_str(&info.link_header()) {
            response.headers.insert(http::header::LINK, value);
        }

        // Custom warning header if a message is provided
        if let Some(ref message) = info.message {
            let warning = format!(
                "299 - \"API version {} is deprecated. Please migrate to version {}. {}\"",
                version, info.replacement, message
            );
            if let Ok(value) = HeaderValue::from_str(&warning) {
                response.headers.insert(http::header::WARNING, value);
            }
        }
    }
}

fn first_segment(path: &str) -> Option<&str> {
    path.split('/').find(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RawBody;
    use crate::response::ResponseBuilder;
    use crate::store::StoreRegistry;
    use http::{Method, StatusCode};
    use std::sync::Arc;

    fn versioner() -> Versioner {
        Versioner::from_config(&VersioningConfig {
            strategies: vec![VersionStrategy::Path, VersionStrategy::Header],
            header: "api-version".to_string(),
            query_param: "version".to_string(),
            default_version: "v1".to_string(),
            versions: vec!["v1".to_string(), "v2".to_string()],
        })
    }

    fn ctx(path: &str, headers: &[(&str, &str)]) -> Context {
        let mut builder = http::Request::builder().method(Method::POST).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (head, _) = builder.body(()).unwrap().into_parts();
        Context::new(
            head,
            RawBody::None,
            None,
            Arc::new(StoreRegistry::new()),
            1024,
            ResponseBuilder::new(),
        )
    }

    #[test]
    fn test_unversioned_path_falls_back_to_default() {
        let resolution = versioner().resolve(&ctx("/login", &[]));
        assert_eq!(resolution.resolved.version, "v1");
        assert_eq!(resolution.resolved.source, VersionSource::Default);
        assert_eq!(resolution.match_path, "/v1/login");
    }

    #[test]
    fn test_path_strategy_consumes_version_segment() {
        let resolution = versioner().resolve(&ctx("/v2/login", &[]));
        assert_eq!(resolution.resolved.version, "v2");
        assert_eq!(resolution.resolved.source, VersionSource::Path);
        assert_eq!(resolution.match_path, "/v2/login");
    }

    #[test]
    fn test_header_strategy_rewrites_path() {
        let resolution = versioner().resolve(&ctx("/login", &[("api-version", "v2")]));
        assert_eq!(resolution.resolved.version, "v2");
        assert_eq!(resolution.resolved.source, VersionSource::Header);
        assert_eq!(resolution.match_path, "/v2/login");
    }

    #[test]
    fn test_unregistered_header_version_is_ignored() {
        let resolution = versioner().resolve(&ctx("/login", &[("api-version", "v9")]));
        assert_eq!(resolution.resolved.version, "v1");
        assert_eq!(resolution.resolved.source, VersionSource::Default);
    }

    #[test]
    fn test_query_strategy() {
        let mut versioner = versioner();
        versioner.strategies = vec![VersionStrategy::Query];
        let resolution = versioner.resolve(&ctx("/login?version=v2", &[]));
        assert_eq!(resolution.resolved.version, "v2");
        assert_eq!(resolution.resolved.source, VersionSource::Query);
        assert_eq!(resolution.match_path, "/v2/login");
    }

    #[test]
    fn test_strategy_order_is_respected() {
        // Path wins over a conflicting header when listed first
        let resolution = versioner().resolve(&ctx("/v1/login", &[("api-version", "v2")]));
        assert_eq!(resolution.resolved.version, "v1");
        assert_eq!(resolution.resolved.source, VersionSource::Path);
    }

    #[test]
    fn test_expand_route_path() {
        let versioner = versioner();
        assert_eq!(versioner.expand_route_path("/login"), "/v1/login");
        assert_eq!(versioner.expand_route_path("/v2/login"), "/v2/login");
        assert_eq!(versioner.expand_route_path("/"), "/v1");
    }

    #[test]
    fn test_root_path_rewrite() {
        let resolution = versioner().resolve(&ctx("/", &[]));
        assert_eq!(resolution.match_path, "/v1");
    }

    #[test]
    fn test_fallback_match_path() {
        let versioner = versioner();

        let resolution = versioner.resolve(&ctx("/v2/login", &[]));
        assert_eq!(resolution.rest_path, "/login");
        assert_eq!(
            versioner.fallback_match_path(&resolution).as_deref(),
            Some("/v1/login")
        );

        let resolution = versioner.resolve(&ctx("/login", &[("api-version", "v2")]));
        assert_eq!(
            versioner.fallback_match_path(&resolution).as_deref(),
            Some("/v1/login")
        );

        // Already on the default version: nothing to fall back to
        let resolution = versioner.resolve(&ctx("/login", &[]));
        assert_eq!(versioner.fallback_match_path(&resolution), None);
    }

    #[test]
    fn test_deprecation_headers() {
        let mut versioner = versioner();
        versioner.deprecate(
            "v1",
            DeprecationInfo::new("v2")
                .with_sunset_date("2026-12-31T23:59:59Z")
                .with_message("Please migrate soon"),
        );

        let mut response = Response::with_status(StatusCode::OK);
        versioner.apply_deprecation_headers("v1", &mut response);
        assert_eq!(
            response.headers.get("deprecation").unwrap(),
            "version=\"v1\""
        );
        assert_eq!(
            response.headers.get("sunset").unwrap(),
            "2026-12-31T23:59:59Z"
        );
        assert_eq!(
            response.headers.get(http::header::LINK).unwrap(),
            "</v2/>; rel=\"successor-version\""
        );
        assert!(response
            .headers
            .get(http::header::WARNING)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("deprecated"));

        // Non-deprecated versions get no headers
        let mut clean = Response::with_status(StatusCode::OK);
        versioner.apply_deprecation_headers("v2", &mut clean);
        assert!(clean.headers.get("deprecation").is_none());
    }
}
