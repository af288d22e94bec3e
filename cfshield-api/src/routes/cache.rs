//! Cache Administration Routes
//!
//! Exact-key inspection and purge, plus store statistics. Mounted under
//! `/api/cache` behind the admin token guard.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use cfshield_storage::{CacheStats, CacheStore};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::validation::CacheKeyQuery;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryResponse {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDeleteResponse {
    pub key: String,
    /// `false` when nothing was stored under the key.
    pub deleted: bool,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/cache?key= - Stored value for an exact key
pub async fn get_entry(
    State(cache): State<CacheStore>,
    Query(query): Query<CacheKeyQuery>,
) -> ApiResult<Json<CacheEntryResponse>> {
    let key = query.validate()?;
    match cache.get_raw(&key).await {
        Some(value) => Ok(Json(CacheEntryResponse { key, value })),
        None => Err(ApiError::key_not_found(&key)),
    }
}

/// DELETE /api/cache?key= - Purge an exact key
pub async fn delete_entry(
    State(cache): State<CacheStore>,
    Query(query): Query<CacheKeyQuery>,
) -> ApiResult<Json<CacheDeleteResponse>> {
    let key = query.validate()?;
    let deleted = cache.delete(&key).await;
    tracing::info!(key = %key, deleted, "Cache entry purged");
    Ok(Json(CacheDeleteResponse { key, deleted }))
}

/// GET /api/cache/stats - Counters and connection state
pub async fn stats(State(cache): State<CacheStore>) -> impl IntoResponse {
    let stats: CacheStats = cache.stats();
    Json(stats)
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_entry).delete(delete_entry))
        .route("/stats", get(stats))
}
