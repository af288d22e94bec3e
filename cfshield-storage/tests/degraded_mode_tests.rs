//! Cache and limiter behavior across backend outages.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cfshield_core::{CacheKey, Clock, ManualClock, ResourceKind};
use cfshield_storage::{
    CacheResult, CacheStore, ConnectionState, InMemoryBackend, RateLimiter, StoreBackend,
    DEFAULT_PROBE_INTERVAL,
};
use proptest::prelude::*;

struct Harness {
    clock: Arc<ManualClock>,
    backend: Arc<InMemoryBackend>,
    store: CacheStore,
    limiter: RateLimiter,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
    let store = CacheStore::with_backend(backend.clone(), clock.clone());
    let limiter = RateLimiter::new(store.clone());
    Harness {
        clock,
        backend,
        store,
        limiter,
    }
}

#[tokio::test]
async fn every_kind_expires_after_its_ttl() {
    let h = harness();
    let keys = [
        CacheKey::user_info(&["tourist"]),
        CacheKey::user_status("tourist", 1, Some(10)),
        CacheKey::rating("tourist"),
        CacheKey::problems::<&str>(&[]),
        CacheKey::contests(false),
        CacheKey::contest_standings(1, None),
    ];

    for key in &keys {
        h.store.set(key, &serde_json::json!({"k": key.as_str()})).await;
        assert_eq!(h.backend.ttl_of(key.as_str()), Some(key.kind().ttl_seconds()));
    }

    // Walk the TTL table in ascending order and check which keys survive.
    let mut ttls: Vec<u64> = ResourceKind::ALL.iter().map(|k| k.ttl_seconds()).collect();
    ttls.sort_unstable();
    ttls.dedup();
    let start = h.clock.now_millis();
    for ttl in ttls {
        h.clock.set(start + (ttl as i64) * 1000);
        for key in &keys {
            let live = h.store.get_raw(key.as_str()).await.is_some();
            assert_eq!(live, key.ttl_seconds() > ttl, "key {} at {}s", key, ttl);
        }
    }
}

#[tokio::test]
async fn outage_degrades_cache_and_limiter_together() {
    let h = harness();
    let key = CacheKey::rating("petr");
    h.store.set(&key, &vec![1, 2, 3]).await;

    h.backend.set_reachable(false);
    assert_eq!(h.store.get::<Vec<i32>>(key.as_str()).await, None);
    assert_eq!(h.store.state(), ConnectionState::Disconnected);

    for _ in 0..50 {
        assert!(h.limiter.rate_limit("10.0.0.1", 2, 60).await.success);
    }

    h.backend.set_reachable(true);
    h.clock.advance(DEFAULT_PROBE_INTERVAL);
    assert_eq!(
        h.store.get::<Vec<i32>>(key.as_str()).await,
        Some(vec![1, 2, 3])
    );
    assert!(h.store.is_available());

    assert!(h.limiter.rate_limit("10.0.0.1", 2, 60).await.success);
    assert!(h.limiter.rate_limit("10.0.0.1", 2, 60).await.success);
    assert!(!h.limiter.rate_limit("10.0.0.1", 2, 60).await.success);
}

/// In-memory backend whose reads can be made to hang forever.
struct StallingBackend {
    inner: Arc<InMemoryBackend>,
    stall_reads: AtomicBool,
    reads: AtomicUsize,
}

impl StallingBackend {
    fn new(inner: Arc<InMemoryBackend>) -> Self {
        Self {
            inner,
            stall_reads: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl StoreBackend for StallingBackend {
    fn name(&self) -> &'static str {
        "stalling"
    }

    async fn ping(&self) -> CacheResult<()> {
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.stall_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()> {
        self.inner.set_ex(key, value, ttl_seconds).await
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        self.inner.del(key).await
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> CacheResult<u64> {
        self.inner.zrem_range_by_score(key, min, max).await
    }

    async fn zcard(&self, key: &str) -> CacheResult<u64> {
        self.inner.zcard(key).await
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> CacheResult<()> {
        self.inner.zadd(key, score, member).await
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<()> {
        self.inner.expire(key, ttl_seconds).await
    }

    async fn zoldest_score(&self, key: &str) -> CacheResult<Option<i64>> {
        self.inner.zoldest_score(key).await
    }
}

#[tokio::test]
async fn cancelled_recovery_read_does_not_wedge_store() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let memory = Arc::new(InMemoryBackend::with_clock(clock.clone()));
    let backend = Arc::new(StallingBackend::new(memory.clone()));
    let store = CacheStore::with_backend(backend.clone(), clock.clone());
    let key = CacheKey::rating("tourist");
    store.set(&key, &vec![1]).await;

    memory.set_reachable(false);
    assert!(!store.ping().await);
    assert_eq!(store.state(), ConnectionState::Disconnected);

    // The recovery read hangs and the caller gives up on it.
    memory.set_reachable(true);
    backend.stall_reads.store(true, Ordering::SeqCst);
    clock.advance(DEFAULT_PROBE_INTERVAL);
    let attempt = tokio::time::timeout(Duration::from_millis(50), store.get_raw(key.as_str())).await;
    assert!(attempt.is_err());
    assert_eq!(store.state(), ConnectionState::Disconnected);

    backend.stall_reads.store(false, Ordering::SeqCst);
    let reads_before = backend.reads.load(Ordering::SeqCst);
    clock.advance(DEFAULT_PROBE_INTERVAL);
    assert_eq!(store.get::<Vec<i32>>(key.as_str()).await, Some(vec![1]));
    assert_eq!(backend.reads.load(Ordering::SeqCst), reads_before + 1);
    assert_eq!(store.state(), ConnectionState::Connected);
    assert!(store.is_available());
}

#[tokio::test]
async fn admin_delete_forces_a_miss() {
    let h = harness();
    let key = CacheKey::problems(&["dp", "greedy"]);
    h.store.set(&key, &serde_json::json!({"problems": []})).await;
    assert!(h.store.get_raw("cf:problems:dp;greedy").await.is_some());

    assert!(h.store.delete("cf:problems:dp;greedy").await);
    assert!(h.store.get_raw("cf:problems:dp;greedy").await.is_none());
    assert!(!h.store.delete("cf:problems:dp;greedy").await);
}

#[tokio::test]
async fn stats_track_outcomes() {
    let h = harness();
    let key = CacheKey::contests(true);
    let _ = h.store.get_raw(key.as_str()).await;
    h.store.set(&key, &Vec::<u8>::new()).await;
    let _ = h.store.get_raw(key.as_str()).await;

    let stats = h.store.stats();
    assert_eq!(stats.backend, Some("memory"));
    assert_eq!(stats.state, ConnectionState::Connected);
    assert_eq!((stats.hits, stats.misses, stats.errors), (1, 1, 0));
}

proptest! {
    #[test]
    fn limiter_never_admits_more_than_limit(limit in 1u32..20, attempts in 1usize..60) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let admitted = rt.block_on(async {
            let h = harness();
            let mut admitted = 0u32;
            for _ in 0..attempts {
                if h.limiter.rate_limit("prop", limit, 60).await.success {
                    admitted += 1;
                }
                h.clock.advance(Duration::from_millis(10));
            }
            admitted
        });
        prop_assert_eq!(admitted as usize, attempts.min(limit as usize));
    }
}
