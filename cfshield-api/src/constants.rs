//! Constants for the cfshield API
//!
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// UPSTREAM
// ============================================================================

/// Base URL of the upstream read API.
pub const CODEFORCES_API_BASE: &str = "https://codeforces.com/api";

/// Default upstream request timeout in milliseconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// CACHE
// ============================================================================

/// Default Redis connect timeout in milliseconds.
pub const DEFAULT_REDIS_CONNECT_TIMEOUT_MS: u64 = 1_000;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Requests per window per client IP across all proxy routes.
pub const DEFAULT_PROXY_RATE_LIMIT: u32 = 20;

/// Window for the proxy budget, in seconds.
pub const DEFAULT_PROXY_RATE_WINDOW_SECS: u64 = 60;

/// Requests per window per client IP on the multi-handle user endpoint.
pub const DEFAULT_USER_INFO_RATE_LIMIT: u32 = 10;

/// Window for the user-info budget, in seconds.
pub const DEFAULT_USER_INFO_RATE_WINDOW_SECS: u64 = 60;

// ============================================================================
// PARAMETER LIMITS
// ============================================================================

/// Maximum handles in one `user.info` call.
pub const MAX_HANDLES_PER_REQUEST: usize = 10_000;

/// Maximum `count` for paginated resources.
pub const MAX_PAGE_COUNT: u32 = 10_000;

// ============================================================================
// HEADERS
// ============================================================================

pub const HEADER_CACHE_STATUS: &str = "x-cache";
pub const HEADER_RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const HEADER_ADMIN_TOKEN: &str = "x-admin-token";
