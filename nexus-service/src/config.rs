//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: NEXUS_)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/nexus-service/{service_name}/config.toml
//! 4. System directory: /etc/nexus-service/{service_name}/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// API versioning configuration
    #[serde(default)]
    pub versioning: VersioningConfig,

    /// Graceful shutdown configuration
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Object pool configuration
    #[serde(default)]
    pub pool: PoolConfig,

    /// Observability endpoint configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Request body size limit in megabytes
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

/// API versioning configuration
///
/// Strategies are tried in listed order; the default version applies when
/// none of them resolves a registered version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Resolution strategies in priority order
    #[serde(default = "default_strategies")]
    pub strategies: Vec<VersionStrategy>,

    /// Header consulted by the `header` strategy
    #[serde(default = "default_version_header")]
    pub header: String,

    /// Query parameter consulted by the `query` strategy
    #[serde(default = "default_version_query_param")]
    pub query_param: String,

    /// Version assumed when no strategy resolves
    #[serde(default = "default_version")]
    pub default_version: String,

    /// Registered versions; unregistered versions fall through to the default
    #[serde(default = "default_versions")]
    pub versions: Vec<String>,
}

/// Version resolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStrategy {
    /// First path segment carries the version
    Path,
    /// A request header carries the version
    Header,
    /// A query parameter carries the version
    Query,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            header: default_version_header(),
            query_param: default_version_query_param(),
            default_version: default_version(),
            versions: default_versions(),
        }
    }
}

/// Graceful shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Total drain deadline in seconds
    #[serde(default = "default_drain_deadline_secs")]
    pub drain_deadline_secs: u64,

    /// Poll interval while draining, in milliseconds
    #[serde(default = "default_drain_poll_ms")]
    pub drain_poll_ms: u64,

    /// `Retry-After` value advertised on draining 503 responses, in seconds
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    /// Per-hook timeout in seconds, used when a hook doesn't set its own
    #[serde(default = "default_hook_timeout_secs")]
    pub hook_timeout_secs: u64,

    /// Final grace period after hooks, in seconds
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Signals that trigger shutdown
    #[serde(default = "default_signals")]
    pub signals: Vec<String>,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_deadline_secs: default_drain_deadline_secs(),
            drain_poll_ms: default_drain_poll_ms(),
            retry_after_secs: default_retry_after_secs(),
            hook_timeout_secs: default_hook_timeout_secs(),
            grace_secs: default_grace_secs(),
            signals: default_signals(),
        }
    }
}

impl ShutdownConfig {
    /// Total drain deadline
    pub fn drain_deadline(&self) -> Duration {
        Duration::from_secs(self.drain_deadline_secs)
    }

    /// Poll interval while draining
    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms)
    }

    /// Default per-hook timeout
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }
}

/// Object pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum pooled request contexts; overflow is discarded
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,

    /// Maximum pooled response builders
    #[serde(default = "default_max_response_builders")]
    pub max_response_builders: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_contexts: default_max_contexts(),
            max_response_builders: default_max_response_builders(),
        }
    }
}

/// Observability endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Whether to register the built-in health/metrics endpoints
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Health endpoint path
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            health_path: default_health_path(),
            metrics_path: default_metrics_path(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_body_limit_mb() -> usize {
    10 // 10 MB
}

fn default_strategies() -> Vec<VersionStrategy> {
    vec![VersionStrategy::Path, VersionStrategy::Header]
}

fn default_version_header() -> String {
    "api-version".to_string()
}

fn default_version_query_param() -> String {
    "version".to_string()
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_versions() -> Vec<String> {
    vec!["v1".to_string()]
}

fn default_drain_deadline_secs() -> u64 {
    30
}

fn default_drain_poll_ms() -> u64 {
    50
}

fn default_retry_after_secs() -> u64 {
    30
}

fn default_hook_timeout_secs() -> u64 {
    10
}

fn default_grace_secs() -> u64 {
    5
}

fn default_signals() -> Vec<String> {
    vec!["SIGTERM".to_string(), "SIGINT".to_string()]
}

fn default_max_contexts() -> usize {
    1024
}

fn default_max_response_builders() -> usize {
    1024
}

fn default_health_path() -> String {
    "/__nexus/health".to_string()
}

fn default_metrics_path() -> String {
    "/__nexus/metrics".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/nexus-service/{service_name}/config.toml
    /// 3. System directory: /etc/nexus-service/{service_name}/config.toml
    ///
    /// Environment variables (NEXUS_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "nexus-service".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Merge config files in reverse order (lowest priority first)
        // so that higher priority files override lower ones
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        // Environment variables have highest priority
        figment = figment.merge(Env::prefixed("NEXUS_").split("_"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    /// Useful for testing or non-standard deployments.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("NEXUS_").split("_"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service
    ///
    /// Returns paths in priority order (highest first):
    /// 1. Current working directory
    /// 2. XDG config directory
    /// 3. System directory
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("config.toml"));

        let xdg_dirs = xdg::BaseDirectories::with_prefix("nexus-service");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(
            PathBuf::from("/etc/nexus-service")
                .join(service_name)
                .join("config.toml"),
        );

        paths
    }

    /// Whether the service runs in production mode
    ///
    /// Controls error detail exposure: 500 bodies carry the underlying
    /// message only outside production.
    pub fn is_production(&self) -> bool {
        self.service.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "nexus-service".to_string(),
                host: default_host(),
                port: default_port(),
                log_level: default_log_level(),
                environment: default_environment(),
                body_limit_mb: default_body_limit_mb(),
            },
            versioning: VersioningConfig::default(),
            shutdown: ShutdownConfig::default(),
            pool: PoolConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
