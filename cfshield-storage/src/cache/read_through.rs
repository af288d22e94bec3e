//! Read-through composition: cache lookup, upstream fetch, population.

use std::future::Future;

use cfshield_core::CacheKey;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::store::CacheStore;

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Cache,
    Upstream,
}

impl CacheSource {
    /// Value for the `X-Cache` response header.
    pub fn header_value(&self) -> &'static str {
        match self {
            CacheSource::Cache => "HIT",
            CacheSource::Upstream => "MISS",
        }
    }
}

/// A value plus where it was served from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    source: CacheSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            source: CacheSource::Cache,
        }
    }

    pub fn from_upstream(value: T) -> Self {
        Self {
            value,
            source: CacheSource::Upstream,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn source(&self) -> CacheSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == CacheSource::Cache
    }

    pub fn was_cache_miss(&self) -> bool {
        self.source == CacheSource::Upstream
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CacheRead<U> {
        CacheRead {
            value: f(self.value),
            source: self.source,
        }
    }
}

impl CacheStore {
    /// Serve `key` from the cache, or call `fetch` and cache its result.
    ///
    /// Fetch errors are returned untouched and nothing is written for them.
    /// Concurrent misses on the same key each call `fetch`.
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        fetch: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key.as_str()).await {
            tracing::debug!(key = key.as_str(), "Cache hit");
            return Ok(CacheRead::from_cache(cached));
        }

        tracing::debug!(key = key.as_str(), "Cache miss, fetching from upstream");
        let value = fetch().await?;
        self.set(key, &value).await;
        Ok(CacheRead::from_upstream(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_backend::InMemoryBackend;
    use cfshield_core::{ManualClock, UpstreamError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn store() -> (Arc<InMemoryBackend>, CacheStore) {
        let clock = Arc::new(ManualClock::new(0));
        let backend = Arc::new(InMemoryBackend::with_clock(clock.clone()));
        (backend.clone(), CacheStore::with_backend(backend, clock))
    }

    #[tokio::test]
    async fn test_miss_then_hit() -> Result<(), UpstreamError> {
        let (backend, store) = store();
        let key = CacheKey::rating("tourist");
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let fetch = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, UpstreamError>(vec![1500, 1600])
        };

        let first = store.read_through(&key, fetch).await?;
        assert!(first.was_cache_miss());
        assert_eq!(first.source().header_value(), "MISS");
        assert_eq!(backend.ttl_of(key.as_str()), Some(3600));

        let second = store.read_through(&key, fetch).await?;
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), vec![1500, 1600]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let (backend, store) = store();
        let key = CacheKey::rating("nobody");

        let result = store
            .read_through(&key, || async {
                Err::<Vec<i32>, _>(UpstreamError::failed(Some("handle: not found".into())))
            })
            .await;

        assert!(result.is_err());
        assert!(backend.recorded_writes().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_store_always_fetches() -> Result<(), UpstreamError> {
        let store = CacheStore::disabled();
        let key = CacheKey::contests(false);
        for _ in 0..2 {
            let read = store
                .read_through(&key, || async { Ok::<_, UpstreamError>(vec!["round".to_string()]) })
                .await?;
            assert!(read.was_cache_miss());
        }
        Ok(())
    }
}
