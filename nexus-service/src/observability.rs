//! Tracing initialization and request metrics
//!
//! The metrics registry is deliberately small: request/response counters,
//! the live request gauge, and pool statistics, rendered either as
//! Prometheus text or as a JSON snapshot by the built-in endpoint. Anything
//! richer (exporters, tracing transports) belongs to external collaborators
//! subscribing through middleware and plugin events.

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::context::PoolStats;
use crate::error::Result;
use crate::shutdown::HealthState;

/// Initialize tracing with a JSON subscriber
///
/// The filter comes from `service.log_level`; an already-installed global
/// subscriber (tests, embedding applications) is left in place.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();

    let result = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    match result {
        Ok(()) => tracing::info!("Tracing initialized for service: {}", config.service.name),
        Err(_) => tracing::debug!("Tracing subscriber already installed"),
    }
    Ok(())
}

/// Request counters shared across the application
#[derive(Debug, Default)]
pub struct Metrics {
    requests_total: AtomicU64,
    responses_2xx: AtomicU64,
    responses_3xx: AtomicU64,
    responses_4xx: AtomicU64,
    responses_5xx: AtomicU64,
    draining_rejections: AtomicU64,
    started_at: Option<DateTime<Utc>>,
}

impl Metrics {
    /// Create a registry stamped with the current time
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Count an accepted request
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an outgoing response by status class
    pub fn record_response(&self, status: StatusCode) {
        let counter = match status.as_u16() {
            200..=299 => &self.responses_2xx,
            300..=399 => &self.responses_3xx,
            400..=499 => &self.responses_4xx,
            _ => &self.responses_5xx,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request rejected because the server is draining
    pub fn record_draining_rejection(&self) {
        self.draining_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since the registry was created
    pub fn uptime_secs(&self) -> i64 {
        self.started_at
            .map(|t| (Utc::now() - t).num_seconds())
            .unwrap_or(0)
    }

    /// Total requests observed so far
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Render the Prometheus text exposition
    pub fn render_prometheus(
        &self,
        active_requests: usize,
        contexts: PoolStats,
        builders: PoolStats,
    ) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str("# HELP nexus_requests_total Requests received\n");
        out.push_str("# TYPE nexus_requests_total counter\n");
        out.push_str(&format!(
            "nexus_requests_total {}\n",
            self.requests_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP nexus_responses_total Responses sent, by status class\n");
        out.push_str("# TYPE nexus_responses_total counter\n");
        for (class, counter) in [
            ("2xx", &self.responses_2xx),
            ("3xx", &self.responses_3xx),
            ("4xx", &self.responses_4xx),
            ("5xx", &self.responses_5xx),
        ] {
            out.push_str(&format!(
                "nexus_responses_total{{class=\"{}\"}} {}\n",
                class,
                counter.load(Ordering::Relaxed)
            ));
        }

        out.push_str("# HELP nexus_draining_rejections_total Requests refused while draining\n");
        out.push_str("# TYPE nexus_draining_rejections_total counter\n");
        out.push_str(&format!(
            "nexus_draining_rejections_total {}\n",
            self.draining_rejections.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP nexus_active_requests In-flight requests\n");
        out.push_str("# TYPE nexus_active_requests gauge\n");
        out.push_str(&format!("nexus_active_requests {}\n", active_requests));

        for (pool, stats) in [("context", contexts), ("response_builder", builders)] {
            out.push_str(&format!(
                "nexus_pool_created_total{{pool=\"{}\"}} {}\n",
                pool, stats.created
            ));
            out.push_str(&format!(
                "nexus_pool_reused_total{{pool=\"{}\"}} {}\n",
                pool, stats.reused
            ));
            out.push_str(&format!(
                "nexus_pool_hit_rate{{pool=\"{}\"}} {:.4}\n",
                pool,
                stats.hit_rate()
            ));
        }

        out.push_str("# HELP nexus_uptime_seconds Seconds since startup\n");
        out.push_str("# TYPE nexus_uptime_seconds gauge\n");
        out.push_str(&format!("nexus_uptime_seconds {}\n", self.uptime_secs()));
        out
    }

    /// JSON snapshot of the same data
    pub fn snapshot(
        &self,
        active_requests: usize,
        contexts: PoolStats,
        builders: PoolStats,
    ) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            uptime_seconds: self.uptime_secs(),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            responses: ResponseCounts {
                status_2xx: self.responses_2xx.load(Ordering::Relaxed),
                status_3xx: self.responses_3xx.load(Ordering::Relaxed),
                status_4xx: self.responses_4xx.load(Ordering::Relaxed),
                status_5xx: self.responses_5xx.load(Ordering::Relaxed),
            },
            draining_rejections: self.draining_rejections.load(Ordering::Relaxed),
            active_requests,
            pools: PoolSnapshots {
                contexts: PoolSnapshot::from(contexts),
                response_builders: PoolSnapshot::from(builders),
            },
        }
    }
}

/// Serializable metrics snapshot served by the JSON metrics endpoint
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    /// Snapshot time, RFC 3339
    pub timestamp: String,
    /// Seconds since startup
    pub uptime_seconds: i64,
    /// Requests received
    pub requests_total: u64,
    /// Responses by status class
    pub responses: ResponseCounts,
    /// Requests refused while draining
    pub draining_rejections: u64,
    /// In-flight requests
    pub active_requests: usize,
    /// Pool statistics
    pub pools: PoolSnapshots,
}

/// Response counters by status class
#[derive(Debug, Serialize)]
pub struct ResponseCounts {
    /// 2xx responses
    #[serde(rename = "2xx")]
    pub status_2xx: u64,
    /// 3xx responses
    #[serde(rename = "3xx")]
    pub status_3xx: u64,
    /// 4xx responses
    #[serde(rename = "4xx")]
    pub status_4xx: u64,
    /// 5xx responses
    #[serde(rename = "5xx")]
    pub status_5xx: u64,
}

/// Per-pool statistics with the derived hit rate
#[derive(Debug, Serialize)]
pub struct PoolSnapshot {
    /// Objects allocated
    pub created: u64,
    /// Objects served from the pool
    pub reused: u64,
    /// reused / (created + reused)
    pub hit_rate: f64,
}

impl From<PoolStats> for PoolSnapshot {
    fn from(stats: PoolStats) -> Self {
        Self {
            created: stats.created,
            reused: stats.reused,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Both pools, in one snapshot
#[derive(Debug, Serialize)]
pub struct PoolSnapshots {
    /// Request context pool
    pub contexts: PoolSnapshot,
    /// Response builder pool
    pub response_builders: PoolSnapshot,
}

/// Health endpoint payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `running`, `draining`, or `stopped`
    pub status: HealthState,
    /// Report time, RFC 3339
    pub timestamp: String,
    /// Named check results
    pub checks: HashMap<String, CheckStatus>,
}

impl HealthResponse {
    /// Build a payload for the current state
    pub fn new(status: HealthState, checks: HashMap<String, CheckStatus>) -> Self {
        Self {
            status,
            timestamp: Utc::now().to_rfc3339(),
            checks,
        }
    }
}

/// Individual health check result
#[derive(Debug, Clone, Serialize)]
pub struct CheckStatus {
    /// Whether the check passed
    pub healthy: bool,
    /// Optional detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckStatus {
    /// A passing check
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
        }
    }

    /// A failing check with a reason
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
        }
    }
}

/// Health check callback registered on the application
pub type HealthCheck = std::sync::Arc<dyn Fn() -> CheckStatus + Send + Sync>;
