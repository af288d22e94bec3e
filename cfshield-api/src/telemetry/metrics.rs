//! Prometheus Metrics Definitions
//!
//! Defines all cfshield metrics with their labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Upstream call latency buckets (seconds). The upstream is slow; the tail
/// goes up to the client timeout.
const UPSTREAM_LATENCY_BUCKETS: &[f64] = &[0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance - initialized once at first use
pub static METRICS: Lazy<ApiResult<CfShieldMetrics>> = Lazy::new(CfShieldMetrics::new);

/// The registered metrics, or `None` if registration failed.
///
/// Registration failure is logged once by the caller that first sees it and
/// otherwise only disables recording.
pub fn metrics() -> Option<&'static CfShieldMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all cfshield metrics.
#[derive(Clone)]
pub struct CfShieldMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Cache lookups - labels: resource, outcome (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Upstream calls - labels: method, outcome (ok/failed/error)
    pub upstream_calls_total: CounterVec,

    /// Upstream call duration histogram - labels: method
    pub upstream_call_duration_seconds: HistogramVec,

    /// Rate-limit decisions - labels: scope, outcome (admitted/denied)
    pub rate_limit_decisions_total: CounterVec,
}

impl CfShieldMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "cfshield_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "cfshield_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            cache_lookups_total: register_counter_vec!(
                "cfshield_cache_lookups_total",
                "Cache lookups by resource and outcome",
                &["resource", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register cache_lookups_total: {}", e)))?,

            upstream_calls_total: register_counter_vec!(
                "cfshield_upstream_calls_total",
                "Upstream API calls by method and outcome",
                &["method", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upstream_calls_total: {}", e)))?,

            upstream_call_duration_seconds: register_histogram_vec!(
                "cfshield_upstream_call_duration_seconds",
                "Upstream API call duration in seconds",
                &["method"],
                UPSTREAM_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register upstream_call_duration_seconds: {}", e)))?,

            rate_limit_decisions_total: register_counter_vec!(
                "cfshield_rate_limit_decisions_total",
                "Rate limiter decisions by scope and outcome",
                &["scope", "outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register rate_limit_decisions_total: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a cache lookup for a resource kind.
    pub fn record_cache_lookup(&self, resource: &str, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[resource, outcome])
            .inc();
    }

    /// Record one upstream call.
    pub fn record_upstream_call(&self, method: &str, outcome: &str, duration_secs: f64) {
        self.upstream_calls_total
            .with_label_values(&[method, outcome])
            .inc();
        self.upstream_call_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    /// Record a rate-limit decision.
    pub fn record_rate_limit(&self, scope: &str, admitted: bool) {
        let outcome = if admitted { "admitted" } else { "denied" };
        self.rate_limit_decisions_total
            .with_label_values(&[scope, outcome])
            .inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    if let Err(e) = METRICS.as_ref() {
        tracing::error!(error = %e, "Metrics registration failed");
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
