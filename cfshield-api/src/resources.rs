//! Cached Resources
//!
//! One method per upstream resource. Each derives the cache key from the
//! validated parameters, serves a hit straight from the cache, and on a miss
//! calls the upstream once and stores the result under the resource TTL.
//! Upstream failures are returned as API errors and never cached.

use std::future::Future;
use std::sync::Arc;

use cfshield_core::{
    CacheKey, CodeforcesApi, Contest, ProblemSet, RatingChange, Standings, Submission,
    UpstreamResult, User,
};
use cfshield_storage::{CacheRead, CacheStore};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ApiResult;
use crate::telemetry::metrics;
use crate::validation::{ProblemsParams, StandingsParams, SubmissionsParams, UserInfoParams};

/// Standings are always fetched from the first row.
const STANDINGS_FROM: u32 = 1;

/// Cache-fronted access to the upstream resources.
#[derive(Clone)]
pub struct CodeforcesService {
    cache: CacheStore,
    upstream: Arc<dyn CodeforcesApi>,
}

impl CodeforcesService {
    pub fn new(cache: CacheStore, upstream: Arc<dyn CodeforcesApi>) -> Self {
        Self { cache, upstream }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    async fn cached<T, F, Fut>(&self, key: CacheKey, fetch: F) -> ApiResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        let read = self.cache.read_through(&key, fetch).await;

        if let Some(metrics) = metrics() {
            // Failed fetches are still misses.
            let hit = matches!(&read, Ok(r) if r.was_cache_hit());
            metrics.record_cache_lookup(key.kind().as_str(), hit);
        }

        Ok(read?)
    }

    pub async fn user_info(&self, params: &UserInfoParams) -> ApiResult<CacheRead<Vec<User>>> {
        let key = CacheKey::user_info(params.handles.as_slice());
        self.cached(key, || self.upstream.user_info(&params.handles))
            .await
    }

    pub async fn rating(&self, handle: &str) -> ApiResult<CacheRead<Vec<RatingChange>>> {
        let key = CacheKey::rating(handle);
        self.cached(key, || self.upstream.user_rating(handle)).await
    }

    pub async fn submissions(
        &self,
        params: &SubmissionsParams,
    ) -> ApiResult<CacheRead<Vec<Submission>>> {
        let key = CacheKey::user_status(&params.handle, params.from, params.count);
        self.cached(key, || {
            self.upstream
                .user_status(&params.handle, params.from, params.count)
        })
        .await
    }

    pub async fn problems(&self, params: &ProblemsParams) -> ApiResult<CacheRead<ProblemSet>> {
        let key = CacheKey::problems(params.tags.as_slice());
        self.cached(key, || self.upstream.problemset(&params.tags))
            .await
    }

    pub async fn contests(&self, gym: bool) -> ApiResult<CacheRead<Vec<Contest>>> {
        let key = CacheKey::contests(gym);
        self.cached(key, || self.upstream.contest_list(gym)).await
    }

    pub async fn standings(&self, params: &StandingsParams) -> ApiResult<CacheRead<Standings>> {
        let key = CacheKey::contest_standings(params.contest_id, params.count);
        self.cached(key, || {
            self.upstream
                .contest_standings(params.contest_id, STANDINGS_FROM, params.count)
        })
        .await
    }
}
