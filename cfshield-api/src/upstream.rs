//! Upstream Client
//!
//! `reqwest`-backed implementation of [`CodeforcesApi`]. One HTTP call per
//! method, no retries. The response body is decoded as an envelope whatever
//! the HTTP status, since the upstream reports `FAILED` with a 400.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use cfshield_core::{
    decode_envelope, key::LIST_SEPARATOR, CodeforcesApi, Contest, ProblemSet, RatingChange,
    Standings, Submission, UpstreamError, UpstreamResult, User,
};
use serde::de::DeserializeOwned;

use crate::constants::CODEFORCES_API_BASE;
use crate::error::{ApiError, ApiResult};
use crate::telemetry::metrics;

/// HTTP client for the Codeforces read API.
#[derive(Debug, Clone)]
pub struct CodeforcesClient {
    http: reqwest::Client,
    base_url: String,
}

impl CodeforcesClient {
    /// Client against the public API with the given request timeout.
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        Self::with_base_url(CODEFORCES_API_BASE, timeout)
    }

    /// Client against another base URL. Trailing slashes are ignored.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cfshield/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::internal_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: &[(&str, String)],
    ) -> UpstreamResult<T> {
        let start = Instant::now();
        let result = self.send::<T>(method, params).await;
        let elapsed = start.elapsed();

        let outcome = match &result {
            Ok(_) => "ok",
            Err(UpstreamError::Failed { .. }) => "failed",
            Err(_) => "error",
        };
        if let Some(metrics) = metrics() {
            metrics.record_upstream_call(method, outcome, elapsed.as_secs_f64());
        }

        tracing::debug!(
            method,
            outcome,
            duration_ms = elapsed.as_millis() as u64,
            "Upstream call finished"
        );
        result
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> UpstreamResult<T> {
        let response = self
            .http
            .get(self.method_url(method))
            .query(params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::debug!(method, status = status.as_u16(), "Upstream returned non-2xx status");
        }
        decode_envelope(&body)
    }
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport {
        reason: err.to_string(),
    }
}

fn join_list(items: &[String]) -> String {
    items.join(&LIST_SEPARATOR.to_string())
}

fn page_params(from: u32, count: Option<u32>) -> Vec<(&'static str, String)> {
    let mut params = vec![("from", from.to_string())];
    if let Some(count) = count {
        params.push(("count", count.to_string()));
    }
    params
}

#[async_trait]
impl CodeforcesApi for CodeforcesClient {
    async fn user_info(&self, handles: &[String]) -> UpstreamResult<Vec<User>> {
        self.call("user.info", &[("handles", join_list(handles))])
            .await
    }

    async fn user_rating(&self, handle: &str) -> UpstreamResult<Vec<RatingChange>> {
        self.call("user.rating", &[("handle", handle.to_string())])
            .await
    }

    async fn user_status(
        &self,
        handle: &str,
        from: u32,
        count: Option<u32>,
    ) -> UpstreamResult<Vec<Submission>> {
        let mut params = vec![("handle", handle.to_string())];
        params.extend(page_params(from, count));
        self.call("user.status", &params).await
    }

    async fn problemset(&self, tags: &[String]) -> UpstreamResult<ProblemSet> {
        if tags.is_empty() {
            return self.call("problemset.problems", &[]).await;
        }
        self.call("problemset.problems", &[("tags", join_list(tags))])
            .await
    }

    async fn contest_list(&self, gym: bool) -> UpstreamResult<Vec<Contest>> {
        self.call("contest.list", &[("gym", gym.to_string())])
            .await
    }

    async fn contest_standings(
        &self,
        contest_id: u64,
        from: u32,
        count: Option<u32>,
    ) -> UpstreamResult<Standings> {
        let mut params = vec![("contestId", contest_id.to_string())];
        params.extend(page_params(from, count));
        self.call("contest.standings", &params).await
    }
}
