//! Rate Limiting Middleware
//!
//! Per-IP sliding-window budgets backed by the shared cache store. The broad
//! proxy budget wraps every `/api/codeforces` route; the tighter user-info
//! budget is layered on the multi-handle user route only.
//!
//! Admitted responses carry `X-RateLimit-*` headers. When two budgets apply,
//! the innermost one (the tighter budget) owns the headers. A denial returns
//! 429 with `Retry-After`.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use cfshield_core::Clock;
use cfshield_storage::{RateLimitDecision, RateLimiter};

use crate::config::RateBudget;
use crate::constants::{
    HEADER_RATE_LIMIT_LIMIT, HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET,
};
use crate::error::ApiError;
use crate::telemetry::metrics;

/// Which budget a middleware instance enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// Every proxy route.
    Proxy,
    /// The multi-handle user-info route.
    UserInfo,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Proxy => "proxy",
            RateLimitScope::UserInfo => "user_info",
        }
    }

    /// Limiter identifier for a client in this scope.
    pub fn identifier(&self, client: &str) -> String {
        format!("{}:{}", self.as_str(), client)
    }
}

/// State for one rate limiting middleware instance.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: RateLimiter,
    budget: RateBudget,
    scope: RateLimitScope,
    enabled: bool,
}

impl RateLimitState {
    pub fn new(limiter: RateLimiter, budget: RateBudget, scope: RateLimitScope) -> Self {
        Self {
            limiter,
            budget,
            scope,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }
}

/// Error type for rate limit middleware.
#[derive(Debug)]
pub struct RateLimitError {
    pub decision: RateLimitDecision,
    /// Seconds until a slot frees up
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(Some(self.retry_after));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error)).into_response();

        let headers = response.headers_mut();
        insert_rate_limit_headers(headers, &self.decision, true);
        headers.insert(
            HeaderName::from_static("retry-after"),
            HeaderValue::from(self.retry_after),
        );

        response
    }
}

/// Write the `X-RateLimit-*` headers. Without `overwrite`, headers already
/// set by an inner budget are kept.
fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision, overwrite: bool) {
    let values = [
        (HEADER_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit)),
        (HEADER_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining)),
        (HEADER_RATE_LIMIT_RESET, HeaderValue::from(decision.reset_epoch_secs())),
    ];
    for (name, value) in values {
        let name = HeaderName::from_static(name);
        if overwrite || !headers.contains_key(&name) {
            headers.insert(name, value);
        }
    }
}

/// Extract the client IP, considering proxy headers.
///
/// Precedence: first entry of `X-Forwarded-For`, then `X-Real-IP`, then the
/// socket peer. Requests with none of these share the `unknown` bucket.
pub fn extract_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    // X-Forwarded-For can contain multiple IPs, take the first one
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
            return ip.to_string();
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|h| h.to_str().ok()) {
        if let Ok(ip) = real_ip.trim().parse::<IpAddr>() {
            return ip.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Rate limiting middleware.
///
/// The limiter itself fails open, so an unreachable cache never turns into
/// rejected requests.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let client = extract_client_ip(request.headers(), connect_info.map(|ConnectInfo(addr)| addr));
    let decision = state
        .limiter
        .rate_limit(
            &state.scope.identifier(&client),
            state.budget.limit,
            state.budget.window_secs,
        )
        .await;

    if let Some(metrics) = metrics() {
        metrics.record_rate_limit(state.scope.as_str(), decision.success);
    }

    if !decision.success {
        let now = state.limiter.store().clock().now_millis();
        let retry_after = decision.retry_after_secs(now);
        tracing::info!(
            scope = state.scope.as_str(),
            client = %client,
            retry_after,
            "Rate limit exceeded"
        );
        return Err(RateLimitError {
            decision,
            retry_after,
        });
    }

    let mut response = next.run(request).await;
    insert_rate_limit_headers(response.headers_mut(), &decision, false);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use cfshield_storage::CacheStore;
    use cfshield_test_utils::TestStore;
    use tower::ServiceExt; // for `oneshot`

    fn test_app(store: &TestStore, limit: u32) -> Router {
        let state = RateLimitState::new(
            store.limiter(),
            RateBudget::new(limit, 60),
            RateLimitScope::Proxy,
        );
        Router::new()
            .route("/limited", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware))
    }

    fn request_from(ip: &str) -> Result<axum::http::Request<Body>, String> {
        axum::http::Request::builder()
            .uri("/limited")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .map_err(|e| e.to_string())
    }

    fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_admitted_requests_carry_headers() -> Result<(), String> {
        let store = TestStore::new();
        let app = test_app(&store, 3);

        let response = app
            .oneshot(request_from("203.0.113.7")?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-limit"), Some("3"));
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some("2"));
        assert!(header(&response, "x-ratelimit-reset").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_429() -> Result<(), String> {
        let store = TestStore::new();
        let app = test_app(&store, 2);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request_from("203.0.113.7")?)
                .await
                .map_err(|e| format!("Request failed: {:?}", e))?;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(request_from("203.0.113.7")?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(header(&response, "x-ratelimit-remaining"), Some("0"));
        assert_eq!(header(&response, "retry-after"), Some("60"));

        // Another client still has its own budget.
        let response = app
            .oneshot(request_from("198.51.100.1")?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_store_fails_open() -> Result<(), String> {
        let state = RateLimitState::new(
            RateLimiter::new(CacheStore::disabled()),
            RateBudget::new(1, 60),
            RateLimitScope::Proxy,
        );
        let app = Router::new()
            .route("/limited", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware));

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(request_from("203.0.113.7")?)
                .await
                .map_err(|e| format!("Request failed: {:?}", e))?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(header(&response, "x-ratelimit-remaining"), Some("1"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_middleware_skips_headers() -> Result<(), String> {
        let store = TestStore::new();
        let state = RateLimitState::new(
            store.limiter(),
            RateBudget::new(1, 60),
            RateLimitScope::Proxy,
        )
        .with_enabled(false);
        let app = Router::new()
            .route("/limited", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(state, rate_limit_middleware));

        let response = app
            .oneshot(request_from("203.0.113.7")?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, "x-ratelimit-limit").is_none());
        assert!(store.backend.is_empty());
        Ok(())
    }

    #[test]
    fn test_extract_client_ip_precedence() {
        let peer: SocketAddr = ([10, 0, 0, 9], 4000).into();
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers, None), "unknown");
        assert_eq!(extract_client_ip(&headers, Some(peer)), "10.0.0.9");

        headers.insert("x-real-ip", HeaderValue::from_static("192.0.2.5"));
        assert_eq!(extract_client_ip(&headers, Some(peer)), "192.0.2.5");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(extract_client_ip(&headers, Some(peer)), "203.0.113.7");

        headers.insert("x-forwarded-for", HeaderValue::from_static("garbage"));
        assert_eq!(extract_client_ip(&headers, Some(peer)), "192.0.2.5");
    }

    #[test]
    fn test_scope_identifiers() {
        assert_eq!(RateLimitScope::Proxy.identifier("1.2.3.4"), "proxy:1.2.3.4");
        assert_eq!(
            RateLimitScope::UserInfo.identifier("1.2.3.4"),
            "user_info:1.2.3.4"
        );
    }
}
