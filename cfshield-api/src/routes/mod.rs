//! REST API Routes Module
//!
//! Includes:
//! - Cached Codeforces proxy routes under /api/codeforces (rate limited)
//! - Cache administration under /api/cache (admin token)
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics at /metrics
//! - CORS support for the browser dashboard

pub mod cache;
pub mod codeforces;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::constants::{HEADER_ADMIN_TOKEN, HEADER_CACHE_STATUS};
use crate::middleware::{
    admin_token_middleware, rate_limit_middleware, AdminTokenState, RateLimitScope,
    RateLimitState,
};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Create the complete API router.
///
/// Execution order for a proxy request:
/// CORS -> Observability -> proxy budget -> (user-info budget) -> Handler
pub fn create_api_router(state: AppState) -> Router {
    let config = state.config.clone();

    let proxy_limit = RateLimitState::new(
        state.limiter.clone(),
        config.proxy_rate_limit,
        RateLimitScope::Proxy,
    )
    .with_enabled(config.rate_limit_enabled);

    let user_info_limit = RateLimitState::new(
        state.limiter.clone(),
        config.user_info_rate_limit,
        RateLimitScope::UserInfo,
    )
    .with_enabled(config.rate_limit_enabled);

    let proxy_routes = codeforces::create_router(user_info_limit)
        .layer(from_fn_with_state(proxy_limit, rate_limit_middleware));

    let admin_routes = cache::create_router().layer(from_fn_with_state(
        AdminTokenState::new(config.admin_token.clone()),
        admin_token_middleware,
    ));

    let cors = build_cors_layer(&config);

    Router::new()
        .nest("/api/codeforces", proxy_routes)
        .nest("/api/cache", admin_routes)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(from_fn(observability_middleware))
        .layer(cors)
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(HEADER_ADMIN_TOKEN),
        ])
        .expose_headers([
            HeaderName::from_static(HEADER_CACHE_STATUS),
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderName::from_static("retry-after"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
