//! Codeforces Proxy Routes
//!
//! Cached read-only views of the upstream API, mounted under
//! `/api/codeforces`. Every response says whether it was served from the
//! cache through the `X-Cache` header.

use axum::{
    extract::{Query, State},
    http::{HeaderName, HeaderValue},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cfshield_core::{Contest, ProblemSet, RatingChange, Standings, Submission, User};
use cfshield_storage::CacheRead;
use serde::Serialize;

use crate::constants::HEADER_CACHE_STATUS;
use crate::error::ApiResult;
use crate::middleware::{rate_limit_middleware, RateLimitState};
use crate::resources::CodeforcesService;
use crate::state::AppState;
use crate::validation::{
    ContestsQuery, HandleQuery, ProblemsQuery, StandingsQuery, SubmissionsQuery, UserInfoQuery,
};

/// JSON response tagged with its cache source.
pub struct CachedJson<T>(pub CacheRead<T>);

impl<T: Serialize> IntoResponse for CachedJson<T> {
    fn into_response(self) -> Response {
        let source = self.0.source();
        let mut response = Json(self.0.into_value()).into_response();
        response.headers_mut().insert(
            HeaderName::from_static(HEADER_CACHE_STATUS),
            HeaderValue::from_static(source.header_value()),
        );
        response
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/codeforces/user?handles=h1;h2 - Info for one or more users
pub async fn user_info(
    State(service): State<CodeforcesService>,
    Query(query): Query<UserInfoQuery>,
) -> ApiResult<CachedJson<Vec<User>>> {
    let params = query.validate()?;
    Ok(CachedJson(service.user_info(&params).await?))
}

/// GET /api/codeforces/rating?handle=h - Rating history
pub async fn rating(
    State(service): State<CodeforcesService>,
    Query(query): Query<HandleQuery>,
) -> ApiResult<CachedJson<Vec<RatingChange>>> {
    let handle = query.validate()?;
    Ok(CachedJson(service.rating(&handle).await?))
}

/// GET /api/codeforces/submissions?handle=h&from=&count= - Submission page
pub async fn submissions(
    State(service): State<CodeforcesService>,
    Query(query): Query<SubmissionsQuery>,
) -> ApiResult<CachedJson<Vec<Submission>>> {
    let params = query.validate()?;
    Ok(CachedJson(service.submissions(&params).await?))
}

/// GET /api/codeforces/problems?tags=t1;t2 - Problem set
pub async fn problems(
    State(service): State<CodeforcesService>,
    Query(query): Query<ProblemsQuery>,
) -> ApiResult<CachedJson<ProblemSet>> {
    let params = query.validate()?;
    Ok(CachedJson(service.problems(&params).await?))
}

/// GET /api/codeforces/contests?gym=bool - Contest list
pub async fn contests(
    State(service): State<CodeforcesService>,
    Query(query): Query<ContestsQuery>,
) -> ApiResult<CachedJson<Vec<Contest>>> {
    let gym = query.validate()?;
    Ok(CachedJson(service.contests(gym).await?))
}

/// GET /api/codeforces/contest?id=&count= - Contest standings
pub async fn standings(
    State(service): State<CodeforcesService>,
    Query(query): Query<StandingsQuery>,
) -> ApiResult<CachedJson<Standings>> {
    let params = query.validate()?;
    Ok(CachedJson(service.standings(&params).await?))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the proxy router. `user_info_limit` guards the multi-handle route
/// on top of whatever budget the caller layers over the whole router.
pub fn create_router(user_info_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/user",
            get(user_info).layer(from_fn_with_state(user_info_limit, rate_limit_middleware)),
        )
        .route("/rating", get(rating))
        .route("/submissions", get(submissions))
        .route("/problems", get(problems))
        .route("/contests", get(contests))
        .route("/contest", get(standings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfshield_test_utils::fixtures;

    #[test]
    fn test_cached_json_sets_header() {
        let hit = CachedJson(CacheRead::from_cache(fixtures::rating_history("tourist"))).into_response();
        assert_eq!(
            hit.headers().get("x-cache").and_then(|v| v.to_str().ok()),
            Some("HIT")
        );

        let miss = CachedJson(CacheRead::from_upstream(vec![fixtures::contest(1)])).into_response();
        assert_eq!(
            miss.headers().get("x-cache").and_then(|v| v.to_str().ok()),
            Some("MISS")
        );
    }
}
