//! Health Check Endpoints
//!
//! Provides Kubernetes-compatible health check endpoints:
//! - /health/ping - Simple liveness check
//! - /health/ready - Cache connectivity check
//! - /health/live - Process alive check
//!
//! The service keeps serving without its cache, so readiness reports a cache
//! outage as `degraded` and still answers 200.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use cfshield_storage::{CacheStore, ConnectionState};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub cache: CacheHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check (cache connectivity)
pub async fn readiness(
    State(cache): State<CacheStore>,
    State(start_time): State<Instant>,
) -> impl IntoResponse {
    let cache_health = check_cache(&cache).await;

    let message = match cache_health.status {
        HealthStatus::Healthy => None,
        HealthStatus::Degraded => Some("Cache unavailable, serving uncached".to_string()),
    };

    let response = HealthResponse {
        status: cache_health.status,
        message,
        details: Some(HealthDetails {
            cache: cache_health,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: start_time.elapsed().as_secs(),
        }),
    };

    (StatusCode::OK, Json(response))
}

async fn check_cache(cache: &CacheStore) -> CacheHealth {
    let start = Instant::now();
    let reachable = cache.ping().await;
    let latency_ms = reachable.then(|| start.elapsed().as_millis() as u64);

    let stats = cache.stats();
    CacheHealth {
        status: if reachable {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        state: stats.state,
        backend: stats.backend.map(str::to_string),
        latency_ms,
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router (no rate limiting, no token)
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfshield_test_utils::TestStore;

    #[test]
    fn test_health_response_serialization() -> Result<(), serde_json::Error> {
        let response = HealthResponse {
            status: HealthStatus::Degraded,
            message: None,
            details: None,
        };
        let json = serde_json::to_string(&response)?;
        assert_eq!(json, r#"{"status":"degraded"}"#);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_cache_reports_state() {
        let store = TestStore::new();
        let healthy = check_cache(&store.store).await;
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert_eq!(healthy.state, ConnectionState::Connected);
        assert_eq!(healthy.backend.as_deref(), Some("memory"));
        assert!(healthy.latency_ms.is_some());

        store.backend.set_reachable(false);
        let degraded = check_cache(&store.store).await;
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert_eq!(degraded.state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disabled_cache_is_degraded() {
        let health = check_cache(&CacheStore::disabled()).await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.backend.is_none());
        assert!(health.latency_ms.is_none());
    }
}
