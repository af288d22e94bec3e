//! cfshield Storage - Cache Store Adapter and Rate Limiter
//!
//! Everything that touches the key-value store lives here:
//! - [`StoreBackend`] implementations (Redis, in-memory)
//! - [`CacheStore`], the fail-soft adapter the request path talks to
//! - read-through composition of cache lookup, fetch and population
//! - [`RateLimiter`], a sliding-window log over the same store
//!
//! Store failures never escape this crate. Reads degrade to misses, writes
//! to no-ops, and rate-limit checks to admits.

pub mod cache;
pub mod rate_limit;

pub use cache::{
    CacheRead, CacheResult, CacheSource, CacheStats, CacheStore, ConnectionState, InMemoryBackend,
    RecordedWrite, RedisBackend, RedisConfig, StoreBackend, DEFAULT_PROBE_INTERVAL,
};
pub use rate_limit::{RateLimitDecision, RateLimiter};
