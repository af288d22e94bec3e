//! The fail-soft Cache Store Adapter.
//!
//! [`CacheStore`] is the only cache handle the rest of the system holds. It
//! is cheap to clone and tracks backend reachability explicitly:
//!
//! ```text
//!             connect ok                 connection error
//! Connecting ───────────► Connected ─────────────────────► Disconnected
//!     ▲                                                        │
//!     └──────────── probe_interval elapsed (one probe) ────────┘
//! ```
//!
//! While `Disconnected`, every operation returns immediately: reads are
//! misses, writes and deletes do nothing. Once the probe interval has passed
//! since the last failure, exactly one operation is let through as a probe;
//! if it succeeds the store is `Connected` again, and if the probing
//! operation is cancelled before it completes the store falls back to
//! `Disconnected` and waits another interval. After [`CacheStore::shutdown`]
//! the store stays `Disconnected` for good.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cfshield_core::{CacheBackendError, CacheKey, Clock, SystemClock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::redis_backend::{RedisBackend, RedisConfig};
use super::traits::{CacheResult, StoreBackend};

/// Delay between a connection failure and the next probe.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Reachability of the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Point-in-time counters for the admin and health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Backend name, or `None` when caching is disabled.
    pub backend: Option<&'static str>,
    pub state: ConnectionState,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

struct StoreInner {
    backend: Option<Arc<dyn StoreBackend>>,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
    closed: AtomicBool,
    last_failure_ms: AtomicI64,
    probe_epoch: AtomicU64,
    probe_interval_ms: i64,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Shared, fail-soft handle to the cache.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.inner.backend.as_ref().map(|b| b.name()))
            .field("state", &self.state())
            .finish()
    }
}

/// Access to the backend for one logical operation.
///
/// A lease taken while probing a disconnected backend abandons the probe on
/// drop unless an outcome was recorded first.
pub(crate) struct BackendLease<'a> {
    store: &'a CacheStore,
    backend: &'a Arc<dyn StoreBackend>,
    probe: Option<u64>,
}

impl Deref for BackendLease<'_> {
    type Target = dyn StoreBackend;

    fn deref(&self) -> &Self::Target {
        &**self.backend
    }
}

impl Drop for BackendLease<'_> {
    fn drop(&mut self) {
        if let Some(probe) = self.probe {
            self.store.abandon_probe(probe);
        }
    }
}

impl CacheStore {
    fn build(
        backend: Option<Arc<dyn StoreBackend>>,
        clock: Arc<dyn Clock>,
        state: ConnectionState,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend,
                clock,
                state: AtomicU8::new(state as u8),
                closed: AtomicBool::new(false),
                last_failure_ms: AtomicI64::new(0),
                probe_epoch: AtomicU64::new(0),
                probe_interval_ms: DEFAULT_PROBE_INTERVAL.as_millis() as i64,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
        }
    }

    /// A store with no backend. Every read misses.
    pub fn disabled() -> Self {
        Self::build(None, Arc::new(SystemClock), ConnectionState::Disconnected)
    }

    /// Wrap an already-connected backend.
    pub fn with_backend(backend: Arc<dyn StoreBackend>, clock: Arc<dyn Clock>) -> Self {
        Self::build(Some(backend), clock, ConnectionState::Connected)
    }

    /// Override the probe interval. Only meaningful before the store is shared.
    pub fn with_probe_interval(self, interval: Duration) -> Self {
        let inner = match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.probe_interval_ms = interval.as_millis() as i64;
                inner
            }
            Err(shared) => return Self { inner: shared },
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Connect to Redis, or fall back to a disabled store.
    ///
    /// Never fails: a missing URL or an unreachable server leaves the service
    /// running uncached.
    pub async fn connect(config: Option<RedisConfig>) -> Self {
        let Some(config) = config else {
            tracing::info!("No cache URL configured, caching disabled");
            return Self::disabled();
        };

        tracing::info!(state = ConnectionState::Connecting.as_str(), "Connecting to cache");
        match RedisBackend::connect(&config).await {
            Ok(backend) => {
                tracing::info!("Cache connected");
                Self::with_backend(Arc::new(backend), Arc::new(SystemClock))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache connection failed, caching disabled");
                Self::disabled()
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    pub fn is_available(&self) -> bool {
        self.inner.backend.is_some()
            && !self.inner.closed.load(Ordering::SeqCst)
            && self.state() == ConnectionState::Connected
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            backend: self.inner.backend.as_ref().map(|b| b.name()),
            state: self.state(),
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            errors: self.inner.errors.load(Ordering::Relaxed),
        }
    }

    /// Read and deserialize a cached value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_string(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                self.inner.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Read a cached value as untyped JSON.
    pub async fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        self.get::<serde_json::Value>(key).await
    }

    /// Store a value under `key` with the TTL of its resource kind.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                self.record_error("SET", &CacheBackendError::from(e));
                return;
            }
        };
        let Some(backend) = self.available_backend() else {
            return;
        };
        let result = backend
            .set_ex(key.as_str(), &payload, key.ttl_seconds())
            .await;
        if self.observe("SET", result).is_some() {
            tracing::debug!(key = key.as_str(), ttl = key.ttl_seconds(), "Cache populated");
        }
    }

    /// Remove an exact key. Returns whether something was removed.
    pub async fn delete(&self, key: &str) -> bool {
        let Some(backend) = self.available_backend() else {
            return false;
        };
        let result = backend.del(key).await;
        self.observe("DEL", result).unwrap_or(false)
    }

    /// Round-trip check used by readiness probes.
    ///
    /// Goes through the same gating as any other operation, so while
    /// disconnected it only reaches the backend once per probe interval.
    pub async fn ping(&self) -> bool {
        let Some(backend) = self.available_backend() else {
            return false;
        };
        let result = backend.ping().await;
        self.observe("PING", result).is_some()
    }

    /// Stop using the backend. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner
                .state
                .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
            tracing::info!("Cache store shut down");
        }
    }

    async fn get_string(&self, key: &str) -> Option<String> {
        let Some(backend) = self.available_backend() else {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let result = backend.get(key).await;
        match self.observe("GET", result).flatten() {
            Some(raw) => Some(raw),
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// The backend to use for the next operation, if any.
    ///
    /// While disconnected this hands out the backend to a single caller once
    /// the probe interval has elapsed, moving the state to `Connecting`. The
    /// returned lease puts the store back to `Disconnected` if it is dropped
    /// before any outcome was observed, so a cancelled probe cannot leave the
    /// store stuck in `Connecting`.
    pub(crate) fn available_backend(&self) -> Option<BackendLease<'_>> {
        let backend = self.inner.backend.as_ref()?;
        if self.inner.closed.load(Ordering::SeqCst) {
            return None;
        }
        match self.state() {
            ConnectionState::Connected => Some(BackendLease {
                store: self,
                backend,
                probe: None,
            }),
            ConnectionState::Connecting => None,
            ConnectionState::Disconnected => {
                let since_failure = self.inner.clock.now_millis()
                    - self.inner.last_failure_ms.load(Ordering::SeqCst);
                if since_failure < self.inner.probe_interval_ms {
                    return None;
                }
                self.inner
                    .state
                    .compare_exchange(
                        ConnectionState::Disconnected as u8,
                        ConnectionState::Connecting as u8,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .ok()?;
                let probe = self.inner.probe_epoch.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!(probe, "Probing cache backend");
                Some(BackendLease {
                    store: self,
                    backend,
                    probe: Some(probe),
                })
            }
        }
    }

    /// Called when a probe lease is dropped. Only the probe that moved the
    /// store to `Connecting` may move it back.
    fn abandon_probe(&self, probe: u64) {
        if self.inner.probe_epoch.load(Ordering::SeqCst) != probe {
            return;
        }
        let abandoned = self
            .inner
            .state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Disconnected as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if abandoned {
            self.inner
                .last_failure_ms
                .store(self.inner.clock.now_millis(), Ordering::SeqCst);
            tracing::debug!(probe, "Cache probe abandoned before completing");
        }
    }

    /// Record the outcome of a backend call and update the state machine.
    pub(crate) fn observe<T>(&self, command: &str, result: CacheResult<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.mark_reachable();
                Some(value)
            }
            Err(err) => {
                if err.is_connection() {
                    self.mark_unreachable();
                } else {
                    self.mark_reachable();
                }
                self.record_error(command, &err);
                None
            }
        }
    }

    fn mark_reachable(&self) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let previous = self
            .inner
            .state
            .swap(ConnectionState::Connected as u8, Ordering::SeqCst);
        if previous != ConnectionState::Connected as u8 {
            tracing::info!("Cache backend reachable again");
        }
    }

    fn mark_unreachable(&self) {
        self.inner
            .last_failure_ms
            .store(self.inner.clock.now_millis(), Ordering::SeqCst);
        let previous = self
            .inner
            .state
            .swap(ConnectionState::Disconnected as u8, Ordering::SeqCst);
        if previous == ConnectionState::Connected as u8 {
            tracing::warn!("Cache backend unreachable, serving uncached");
        }
    }

    fn record_error(&self, command: &str, err: &CacheBackendError) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(command, error = %err, "Cache operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_backend::InMemoryBackend;
    use cfshield_core::ManualClock;

    fn store() -> (Arc<ManualClock>, Arc<InMemoryBackend>, CacheStore) {
        let clock = Arc::new(ManualClock::new(0));
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        let store = CacheStore::with_backend(backend.clone(), clock.clone());
        (clock, backend, store)
    }

    #[tokio::test]
    async fn test_disabled_store_always_misses() {
        let store = CacheStore::disabled();
        store.set(&CacheKey::rating("tourist"), &vec![1, 2, 3]).await;
        assert_eq!(store.get::<Vec<i32>>("cf:rating:tourist").await, None);
        assert!(!store.delete("cf:rating:tourist").await);
        assert!(!store.is_available());
        assert_eq!(store.stats().backend, None);
    }

    #[tokio::test]
    async fn test_set_uses_kind_ttl() {
        let (_, backend, store) = store();
        let key = CacheKey::contest_standings(1900, None);
        store.set(&key, &serde_json::json!({"rows": []})).await;
        assert_eq!(backend.ttl_of(key.as_str()), Some(300));
    }

    #[tokio::test]
    async fn test_hit_and_miss_counters() {
        let (_, _, store) = store();
        let key = CacheKey::rating("tourist");
        assert_eq!(store.get::<Vec<i32>>(key.as_str()).await, None);
        store.set(&key, &vec![7]).await;
        assert_eq!(store.get::<Vec<i32>>(key.as_str()).await, Some(vec![7]));

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let (_, _, store) = store();
        let key = CacheKey::rating("tourist");
        store.set(&key, "not a list").await;
        assert_eq!(store.get::<Vec<i32>>(key.as_str()).await, None);
        assert_eq!(store.stats().errors, 1);
        assert!(store.is_available());
    }

    #[tokio::test]
    async fn test_connection_error_degrades_then_probe_recovers() {
        let (clock, backend, store) = store();
        let key = CacheKey::rating("tourist");
        store.set(&key, &vec![1]).await;

        backend.set_reachable(false);
        assert_eq!(store.get::<Vec<i32>>(key.as_str()).await, None);
        assert_eq!(store.state(), ConnectionState::Disconnected);

        // Before the interval elapses nothing reaches the backend.
        backend.set_reachable(true);
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get::<Vec<i32>>(key.as_str()).await, None);
        assert_eq!(store.state(), ConnectionState::Disconnected);

        clock.advance(DEFAULT_PROBE_INTERVAL);
        assert_eq!(store.get::<Vec<i32>>(key.as_str()).await, Some(vec![1]));
        assert_eq!(store.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_failed_probe_restarts_interval() {
        let (clock, backend, store) = store();
        backend.set_reachable(false);
        assert!(!store.ping().await);

        clock.advance(DEFAULT_PROBE_INTERVAL);
        assert!(!store.ping().await);
        assert_eq!(store.state(), ConnectionState::Disconnected);

        backend.set_reachable(true);
        assert!(!store.ping().await);
        clock.advance(DEFAULT_PROBE_INTERVAL);
        assert!(store.ping().await);
    }

    #[tokio::test]
    async fn test_dropped_recovery_attempt_returns_to_disconnected() {
        let (clock, backend, store) = store();
        backend.set_reachable(false);
        assert!(!store.ping().await);

        clock.advance(DEFAULT_PROBE_INTERVAL);
        let lease = store.available_backend();
        assert!(lease.is_some());
        assert_eq!(store.state(), ConnectionState::Connecting);
        assert!(store.available_backend().is_none());
        drop(lease);
        assert_eq!(store.state(), ConnectionState::Disconnected);

        // The abandoned probe restarts the interval.
        backend.set_reachable(true);
        assert!(!store.ping().await);
        clock.advance(DEFAULT_PROBE_INTERVAL);
        assert!(store.ping().await);
        assert_eq!(store.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_completed_recovery_is_not_undone_by_drop() {
        let (clock, backend, store) = store();
        backend.set_reachable(false);
        assert!(!store.ping().await);
        backend.set_reachable(true);
        clock.advance(DEFAULT_PROBE_INTERVAL);

        if let Some(lease) = store.available_backend() {
            let result = lease.ping().await;
            assert!(store.observe("PING", result).is_some());
        }
        assert_eq!(store.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_custom_probe_interval() {
        let clock = Arc::new(ManualClock::new(0));
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        let store = CacheStore::with_backend(backend.clone(), clock.clone())
            .with_probe_interval(Duration::from_millis(100));

        backend.set_reachable(false);
        assert!(!store.ping().await);
        backend.set_reachable(true);
        clock.advance(Duration::from_millis(100));
        assert!(store.ping().await);
    }

    #[tokio::test]
    async fn test_shutdown_is_final() {
        let (clock, backend, store) = store();
        store.shutdown();
        store.shutdown();
        assert_eq!(store.state(), ConnectionState::Disconnected);

        clock.advance(DEFAULT_PROBE_INTERVAL * 10);
        store.set(&CacheKey::rating("tourist"), &vec![1]).await;
        assert!(backend.recorded_writes().is_empty());
        assert!(!store.ping().await);
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_noop() {
        let (_, _, store) = store();
        assert!(!store.delete("cf:rating:nobody").await);
        assert!(store.is_available());
    }

    #[tokio::test]
    async fn test_connect_without_url_is_disabled() {
        let store = CacheStore::connect(None).await;
        assert_eq!(store.state(), ConnectionState::Disconnected);
        assert!(!store.is_available());
    }
}
