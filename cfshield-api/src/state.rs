//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use cfshield_core::CodeforcesApi;
use cfshield_storage::{CacheStore, RateLimiter};

use crate::config::ApiConfig;
use crate::resources::CodeforcesService;

/// Application-wide state shared across all routes.
///
/// Built once at startup. The cache store is shared by the resource service
/// and the rate limiter, so an outage degrades both together.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub cache: CacheStore,
    pub limiter: RateLimiter,
    pub codeforces: CodeforcesService,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ApiConfig, cache: CacheStore, upstream: Arc<dyn CodeforcesApi>) -> Self {
        Self {
            config: Arc::new(config),
            limiter: RateLimiter::new(cache.clone()),
            codeforces: CodeforcesService::new(cache.clone(), upstream),
            cache,
            start_time: Instant::now(),
        }
    }
}

macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<AppState> for $type {
            fn from_ref(state: &AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}

impl_from_ref!(Arc<ApiConfig>, config);
impl_from_ref!(CacheStore, cache);
impl_from_ref!(RateLimiter, limiter);
impl_from_ref!(CodeforcesService, codeforces);
impl_from_ref!(Instant, start_time);
