//! Sliding-window rate limiter backed by the cache store.
//!
//! Each identifier owns a sorted set `ratelimit:{identifier}` whose scores
//! are request timestamps in epoch milliseconds. A check prunes everything
//! at or before `now - window`, counts what is left and, if under the limit,
//! records the current request.
//!
//! The limiter fails open: if the store is unavailable or any command fails
//! the request is admitted. The prune, count and add steps are separate
//! round trips, so concurrent requests for one identifier can slightly
//! over-admit.

use serde::Serialize;
use uuid::Uuid;

use crate::cache::CacheStore;

/// Key prefix for rate-limit windows.
pub const RATE_LIMIT_KEY_PREFIX: &str = "ratelimit:";

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request is admitted.
    pub success: bool,
    /// Configured maximum for the window.
    pub limit: u32,
    /// Requests left in the current window after this one.
    pub remaining: u32,
    /// Epoch millis at which another request will be admitted.
    pub reset: i64,
}

impl RateLimitDecision {
    fn admitted(limit: u32, remaining: u32, reset: i64) -> Self {
        Self {
            success: true,
            limit,
            remaining,
            reset,
        }
    }

    fn denied(limit: u32, reset: i64) -> Self {
        Self {
            success: false,
            limit,
            remaining: 0,
            reset,
        }
    }

    /// Whole seconds until `reset`, at least 1. Used for `Retry-After`.
    pub fn retry_after_secs(&self, now_millis: i64) -> u64 {
        let wait_ms = (self.reset - now_millis).max(0) as u64;
        wait_ms.div_ceil(1000).max(1)
    }

    /// `reset` as epoch seconds, for the `X-RateLimit-Reset` header.
    pub fn reset_epoch_secs(&self) -> i64 {
        self.reset.div_euclid(1000)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    store: CacheStore,
}

impl RateLimiter {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Check and record one request for `identifier`.
    ///
    /// Never fails; store problems admit the request.
    pub async fn rate_limit(
        &self,
        identifier: &str,
        limit: u32,
        window_seconds: u64,
    ) -> RateLimitDecision {
        let now = self.store.clock().now_millis();
        let window_ms = (window_seconds as i64).saturating_mul(1000);
        let fail_open = RateLimitDecision::admitted(limit, limit, now + window_ms);

        let Some(backend) = self.store.available_backend() else {
            return fail_open;
        };

        let key = format!("{}{}", RATE_LIMIT_KEY_PREFIX, identifier);
        let window_start = now - window_ms;

        let pruned = backend
            .zrem_range_by_score(&key, i64::MIN, window_start)
            .await;
        if self.store.observe("ZREMRANGEBYSCORE", pruned).is_none() {
            return fail_open;
        }

        let counted = backend.zcard(&key).await;
        let Some(count) = self.store.observe("ZCARD", counted) else {
            return fail_open;
        };

        if count >= limit as u64 {
            let oldest = backend.zoldest_score(&key).await;
            let reset = match self.store.observe("ZRANGE", oldest) {
                Some(Some(oldest)) => oldest + window_ms,
                _ => now + window_ms,
            };
            tracing::debug!(identifier, limit, count, "Rate limit exceeded");
            return RateLimitDecision::denied(limit, reset);
        }

        let member = format!("{}-{}", now, Uuid::now_v7());
        let added = backend.zadd(&key, now, &member).await;
        if self.store.observe("ZADD", added).is_none() {
            return fail_open;
        }
        let expired = backend.expire(&key, window_seconds.max(1)).await;
        self.store.observe("EXPIRE", expired);

        let remaining = (limit as u64).saturating_sub(count + 1) as u32;
        RateLimitDecision::admitted(limit, remaining, now + window_ms)
    }
}
