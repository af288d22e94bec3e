//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Every request runs inside an `http_request` span, is counted in the
//! Prometheus request metrics and logs one completion line.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::metrics;

/// Every path the router serves. Anything else shares one metric label.
const ROUTED_PATHS: [&str; 12] = [
    "/api/codeforces/user",
    "/api/codeforces/rating",
    "/api/codeforces/submissions",
    "/api/codeforces/problems",
    "/api/codeforces/contests",
    "/api/codeforces/contest",
    "/api/cache",
    "/api/cache/stats",
    "/health/ping",
    "/health/live",
    "/health/ready",
    "/metrics",
];

const UNMATCHED_PATH: &str = "/{unmatched}";

/// Normalize a path for metric labels.
///
/// Routes carry their parameters in the query string, so a routed path is
/// used as is. Unrouted paths collapse into [`UNMATCHED_PATH`].
fn normalize_path(path: &str) -> &str {
    if ROUTED_PATHS.contains(&path) {
        path
    } else {
        UNMATCHED_PATH
    }
}

/// Observability middleware for Axum.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = normalize_path(&path).to_string();

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %route,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Some(metrics) = metrics() {
        metrics.record_http_request(
            method.as_str(),
            &route,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_normalize_known_paths() {
        assert_eq!(normalize_path("/api/codeforces/rating"), "/api/codeforces/rating");
        assert_eq!(normalize_path("/api/cache"), "/api/cache");
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }

    #[test]
    fn test_normalize_unknown_paths() {
        assert_eq!(normalize_path("/wp-admin/setup.php"), "/{unmatched}");
        assert_eq!(normalize_path("/"), "/{unmatched}");
        assert_eq!(normalize_path("/api/cache/other"), "/{unmatched}");
        assert_eq!(normalize_path("/health/"), "/{unmatched}");
    }

    #[test]
    fn test_unrouted_prefixed_paths_share_one_label() {
        let labels: HashSet<String> = (0..1000)
            .map(|i| format!("/api/codeforces/scan{}", i))
            .map(|path| normalize_path(&path).to_string())
            .collect();
        assert_eq!(labels.len(), 1);
        assert!(labels.contains(UNMATCHED_PATH));
    }
}
