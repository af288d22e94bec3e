//! API Configuration Module
//!
//! Configuration for CORS, rate limiting, the cache connection and the
//! upstream client. Loaded from environment variables with defaults that
//! work for local development.

use std::time::Duration;

use cfshield_storage::RedisConfig;

use crate::constants::{
    DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_PROXY_RATE_LIMIT, DEFAULT_PROXY_RATE_WINDOW_SECS,
    DEFAULT_REDIS_CONNECT_TIMEOUT_MS, DEFAULT_UPSTREAM_TIMEOUT_MS, DEFAULT_USER_INFO_RATE_LIMIT,
    DEFAULT_USER_INFO_RATE_WINDOW_SECS,
};

/// One rate-limit budget: `limit` requests per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub limit: u32,
    pub window_secs: u64,
}

impl RateBudget {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,

    /// Per-IP budget across every proxy route.
    pub proxy_rate_limit: RateBudget,

    /// Tighter per-IP budget for the multi-handle user endpoint.
    pub user_info_rate_limit: RateBudget,

    // ========================================================================
    // Cache Configuration
    // ========================================================================
    /// Redis URL. `None` runs the service uncached.
    pub redis_url: Option<String>,

    pub redis_connect_timeout: Duration,

    // ========================================================================
    // Upstream Configuration
    // ========================================================================
    pub upstream_timeout: Duration,

    // ========================================================================
    // Admin
    // ========================================================================
    /// Token required in `X-Admin-Token` for the cache endpoints. `None`
    /// leaves them open.
    pub admin_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            rate_limit_enabled: true,
            proxy_rate_limit: RateBudget::new(
                DEFAULT_PROXY_RATE_LIMIT,
                DEFAULT_PROXY_RATE_WINDOW_SECS,
            ),
            user_info_rate_limit: RateBudget::new(
                DEFAULT_USER_INFO_RATE_LIMIT,
                DEFAULT_USER_INFO_RATE_WINDOW_SECS,
            ),
            redis_url: None,
            redis_connect_timeout: Duration::from_millis(DEFAULT_REDIS_CONNECT_TIMEOUT_MS),
            upstream_timeout: Duration::from_millis(DEFAULT_UPSTREAM_TIMEOUT_MS),
            admin_token: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CFSHIELD_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `CFSHIELD_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `CFSHIELD_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `CFSHIELD_PROXY_RATE_LIMIT` / `CFSHIELD_PROXY_RATE_WINDOW_SECS` (default: 20 / 60)
    /// - `CFSHIELD_USER_INFO_RATE_LIMIT` / `CFSHIELD_USER_INFO_RATE_WINDOW_SECS` (default: 10 / 60)
    /// - `CFSHIELD_REDIS_URL`: Cache connection string (absent = caching disabled)
    /// - `CFSHIELD_REDIS_CONNECT_TIMEOUT_MS` (default: 1000)
    /// - `CFSHIELD_UPSTREAM_TIMEOUT_MS` (default: 10000)
    /// - `CFSHIELD_ADMIN_TOKEN`: Guards the cache admin endpoints when set
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("CFSHIELD_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let rate_limit_enabled = std::env::var("CFSHIELD_RATE_LIMIT_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let proxy_rate_limit = RateBudget::new(
            env_parse("CFSHIELD_PROXY_RATE_LIMIT").unwrap_or(defaults.proxy_rate_limit.limit),
            env_parse("CFSHIELD_PROXY_RATE_WINDOW_SECS")
                .unwrap_or(defaults.proxy_rate_limit.window_secs),
        );

        let user_info_rate_limit = RateBudget::new(
            env_parse("CFSHIELD_USER_INFO_RATE_LIMIT")
                .unwrap_or(defaults.user_info_rate_limit.limit),
            env_parse("CFSHIELD_USER_INFO_RATE_WINDOW_SECS")
                .unwrap_or(defaults.user_info_rate_limit.window_secs),
        );

        Self {
            cors_origins,
            cors_max_age_secs: env_parse("CFSHIELD_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled,
            proxy_rate_limit,
            user_info_rate_limit,
            redis_url: env_non_empty("CFSHIELD_REDIS_URL"),
            redis_connect_timeout: env_parse("CFSHIELD_REDIS_CONNECT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.redis_connect_timeout),
            upstream_timeout: env_parse("CFSHIELD_UPSTREAM_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.upstream_timeout),
            admin_token: env_non_empty("CFSHIELD_ADMIN_TOKEN"),
        }
    }

    /// Redis settings, if a URL is configured.
    pub fn redis_config(&self) -> Option<RedisConfig> {
        self.redis_url.as_ref().map(|url| {
            RedisConfig::new(url.clone()).with_connect_timeout(self.redis_connect_timeout)
        })
    }
}
