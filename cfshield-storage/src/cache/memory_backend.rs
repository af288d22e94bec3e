//! In-process store backend.
//!
//! Behaves like the subset of Redis the cache uses, with expiry evaluated
//! lazily against an injected [`Clock`]. Used by tests and by single-node
//! deployments that do not want a Redis dependency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cfshield_core::{CacheBackendError, Clock, SystemClock};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::traits::{CacheResult, StoreBackend};

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    /// Members kept sorted by score, then member.
    Sorted(Vec<(i64, String)>),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: StoredValue,
    expires_at: Option<i64>,
}

impl MemoryEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A `SET ... EX` observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub key: String,
    pub ttl_seconds: u64,
}

pub struct InMemoryBackend {
    entries: DashMap<String, MemoryEntry>,
    clock: Arc<dyn Clock>,
    reachable: AtomicBool,
    writes: Mutex<Vec<RecordedWrite>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            reachable: AtomicBool::new(true),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the store going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Every string write so far, in order.
    pub fn recorded_writes(&self) -> Vec<RecordedWrite> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }

    /// TTL of the most recent string write to `key`.
    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.recorded_writes()
            .into_iter()
            .rev()
            .find(|w| w.key == key)
            .map(|w| w.ttl_seconds)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_reachable(&self) -> CacheResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheBackendError::unavailable("in-memory store marked unreachable"))
        }
    }

    /// Drop `key` if it has expired.
    fn purge_expired(&self, key: &str) {
        let now = self.clock.now_millis();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }

    fn wrong_type(command: &str) -> CacheBackendError {
        CacheBackendError::command(
            command,
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        )
    }

    fn expiry_from_now(&self, ttl_seconds: u64) -> i64 {
        self.clock
            .now_millis()
            .saturating_add((ttl_seconds as i64).saturating_mul(1000))
    }
}

#[async_trait]
impl StoreBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check_reachable()
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check_reachable()?;
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                StoredValue::Text(text) => Ok(Some(text.clone())),
                StoredValue::Sorted(_) => Err(Self::wrong_type("GET")),
            },
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()> {
        self.check_reachable()?;
        if ttl_seconds == 0 {
            return Err(CacheBackendError::command(
                "SETEX",
                "invalid expire time in 'setex' command",
            ));
        }
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: StoredValue::Text(value.to_string()),
                expires_at: Some(self.expiry_from_now(ttl_seconds)),
            },
        );
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(RecordedWrite {
                key: key.to_string(),
                ttl_seconds,
            });
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        self.check_reachable()?;
        self.purge_expired(key);
        Ok(self.entries.remove(key).is_some())
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> CacheResult<u64> {
        self.check_reachable()?;
        self.purge_expired(key);
        let mut removed = 0u64;
        let mut now_empty = false;
        if let Some(mut entry) = self.entries.get_mut(key) {
            match &mut entry.value {
                StoredValue::Sorted(members) => {
                    let before = members.len();
                    members.retain(|(score, _)| *score < min || *score > max);
                    removed = (before - members.len()) as u64;
                    now_empty = members.is_empty();
                }
                StoredValue::Text(_) => return Err(Self::wrong_type("ZREMRANGEBYSCORE")),
            }
        }
        // Redis deletes a sorted set once its last member is gone.
        if now_empty {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> CacheResult<u64> {
        self.check_reachable()?;
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                StoredValue::Sorted(members) => Ok(members.len() as u64),
                StoredValue::Text(_) => Err(Self::wrong_type("ZCARD")),
            },
        }
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> CacheResult<()> {
        self.check_reachable()?;
        self.purge_expired(key);
        match self.entries.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(MemoryEntry {
                    value: StoredValue::Sorted(vec![(score, member.to_string())]),
                    expires_at: None,
                });
                Ok(())
            }
            Entry::Occupied(mut slot) => match &mut slot.get_mut().value {
                StoredValue::Sorted(members) => {
                    members.retain(|(_, m)| m != member);
                    let item = (score, member.to_string());
                    let at = members.partition_point(|existing| *existing < item);
                    members.insert(at, item);
                    Ok(())
                }
                StoredValue::Text(_) => Err(Self::wrong_type("ZADD")),
            },
        }
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<()> {
        self.check_reachable()?;
        self.purge_expired(key);
        let expires_at = self.expiry_from_now(ttl_seconds);
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn zoldest_score(&self, key: &str) -> CacheResult<Option<i64>> {
        self.check_reachable()?;
        self.purge_expired(key);
        match self.entries.get(key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                StoredValue::Sorted(members) => Ok(members.first().map(|(score, _)| *score)),
                StoredValue::Text(_) => Err(Self::wrong_type("ZRANGE")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfshield_core::ManualClock;
    use std::time::Duration;

    fn backend() -> (Arc<ManualClock>, InMemoryBackend) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let backend = InMemoryBackend::with_clock(clock.clone());
        (clock, backend)
    }

    #[tokio::test]
    async fn test_set_ex_expires_after_ttl() -> CacheResult<()> {
        let (clock, backend) = backend();
        backend.set_ex("k", "v", 10).await?;
        assert_eq!(backend.get("k").await?, Some("v".to_string()));

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(backend.get("k").await?, Some("v".to_string()));

        clock.advance(Duration::from_millis(1));
        assert_eq!(backend.get("k").await?, None);
        assert_eq!(backend.ttl_of("k"), Some(10));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let (_, backend) = backend();
        let err = backend.set_ex("k", "v", 0).await.unwrap_err();
        assert!(!err.is_connection());
        assert!(backend.recorded_writes().is_empty());
    }

    #[tokio::test]
    async fn test_sorted_set_operations() -> CacheResult<()> {
        let (_, backend) = backend();
        backend.zadd("z", 30, "c").await?;
        backend.zadd("z", 10, "a").await?;
        backend.zadd("z", 20, "b").await?;
        assert_eq!(backend.zcard("z").await?, 3);
        assert_eq!(backend.zoldest_score("z").await?, Some(10));

        assert_eq!(backend.zrem_range_by_score("z", 0, 20).await?, 2);
        assert_eq!(backend.zcard("z").await?, 1);
        assert_eq!(backend.zoldest_score("z").await?, Some(30));

        // Re-adding a member moves it instead of duplicating it.
        backend.zadd("z", 5, "c").await?;
        assert_eq!(backend.zcard("z").await?, 1);
        assert_eq!(backend.zoldest_score("z").await?, Some(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_emptied_sorted_set_is_removed() -> CacheResult<()> {
        let (_, backend) = backend();
        backend.zadd("z", 1, "a").await?;
        backend.zrem_range_by_score("z", 0, 1).await?;
        assert!(backend.is_empty());
        assert_eq!(backend.zoldest_score("z").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_expire_applies_to_sorted_sets() -> CacheResult<()> {
        let (clock, backend) = backend();
        backend.zadd("z", 1, "a").await?;
        backend.expire("z", 2).await?;
        clock.advance(Duration::from_secs(2));
        assert_eq!(backend.zcard("z").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_type_is_command_error() -> CacheResult<()> {
        let (_, backend) = backend();
        backend.set_ex("k", "v", 60).await?;
        let err = backend.zcard("k").await.unwrap_err();
        assert!(matches!(err, CacheBackendError::Command { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_unavailable() -> CacheResult<()> {
        let (_, backend) = backend();
        backend.set_reachable(false);
        assert!(backend.ping().await.unwrap_err().is_connection());
        assert!(backend.get("k").await.unwrap_err().is_connection());

        backend.set_reachable(true);
        backend.ping().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_del_reports_presence() -> CacheResult<()> {
        let (_, backend) = backend();
        backend.set_ex("k", "v", 60).await?;
        assert!(backend.del("k").await?);
        assert!(!backend.del("k").await?);
        Ok(())
    }
}
