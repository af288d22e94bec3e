//! Cache layer with fail-soft semantics.
//!
//! The request path only ever sees [`CacheStore`]. It owns one optional
//! [`StoreBackend`] and tracks whether that backend is reachable; while it is
//! not, every operation short-circuits so the service runs uncached instead
//! of failing.
//!
//! # Example
//!
//! ```ignore
//! let store = CacheStore::connect(Some(RedisConfig::new("redis://localhost:6379"))).await;
//!
//! let read = store
//!     .read_through(&CacheKey::rating("tourist"), || upstream.user_rating("tourist"))
//!     .await?;
//!
//! if read.was_cache_miss() {
//!     tracing::debug!("populated from upstream");
//! }
//! ```

pub mod memory_backend;
pub mod read_through;
pub mod redis_backend;
pub mod store;
pub mod traits;

pub use memory_backend::{InMemoryBackend, RecordedWrite};
pub use read_through::{CacheRead, CacheSource};
pub use redis_backend::{RedisBackend, RedisConfig};
pub use store::{CacheStats, CacheStore, ConnectionState, DEFAULT_PROBE_INTERVAL};
pub use traits::{CacheResult, StoreBackend};
