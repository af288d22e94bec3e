//! Store backend trait.
//!
//! The operations are the small subset of a Redis-like store that the cache
//! and the rate limiter need: string values with expiry, plus a sorted set of
//! integer scores for the sliding-window log.

use async_trait::async_trait;
use cfshield_core::CacheBackendError;

/// Result type for backend operations.
pub type CacheResult<T> = Result<T, CacheBackendError>;

/// Key-value store with TTL and sorted-set support.
///
/// Implementations must be safe to share across tasks. Each method is one
/// store round trip; callers compose them and accept that a sequence of
/// calls is not atomic.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Short backend name for logs and stats.
    fn name(&self) -> &'static str;

    /// Round-trip check.
    async fn ping(&self) -> CacheResult<()>;

    /// Read a string value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a string value that expires after `ttl_seconds`.
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()>;

    /// Remove a key. Returns whether a key was removed.
    async fn del(&self, key: &str) -> CacheResult<bool>;

    /// Remove sorted-set members with `min <= score <= max`. Returns the count removed.
    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> CacheResult<u64>;

    /// Number of members in a sorted set (0 when absent).
    async fn zcard(&self, key: &str) -> CacheResult<u64>;

    /// Add a member with the given score.
    async fn zadd(&self, key: &str, score: i64, member: &str) -> CacheResult<()>;

    /// Set a key's expiry. No-op when the key does not exist.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<()>;

    /// Lowest score in a sorted set, if any.
    async fn zoldest_score(&self, key: &str) -> CacheResult<Option<i64>>;
}
