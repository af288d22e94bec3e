//! Upstream contract: the response envelope and the client trait.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{UpstreamError, UpstreamResult};
use crate::types::{Contest, ProblemSet, RatingChange, Standings, Submission, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvelopeStatus {
    Ok,
    Failed,
}

/// The upstream's own response shape: `{status, result?, comment?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamEnvelope {
    pub status: EnvelopeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl UpstreamEnvelope {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            status: EnvelopeStatus::Ok,
            result: Some(result),
            comment: None,
        }
    }

    pub fn failed(comment: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Failed,
            result: None,
            comment: Some(comment.into()),
        }
    }

    /// Collapse the envelope into a typed result.
    ///
    /// Never yields a partial value: a failed status, a missing result or a
    /// result of the wrong shape are all errors.
    pub fn into_result<T: DeserializeOwned>(self) -> UpstreamResult<T> {
        match (self.status, self.result) {
            (EnvelopeStatus::Failed, _) => Err(UpstreamError::failed(self.comment)),
            (EnvelopeStatus::Ok, None) => Err(UpstreamError::MissingResult),
            (EnvelopeStatus::Ok, Some(result)) => {
                serde_json::from_value(result).map_err(|e| UpstreamError::Decode {
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Decode a raw response body into a typed result.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> UpstreamResult<T> {
    let envelope: UpstreamEnvelope =
        serde_json::from_slice(body).map_err(|e| UpstreamError::Decode {
            reason: format!("invalid envelope: {}", e),
        })?;
    envelope.into_result()
}

/// Typed operations of the upstream read API.
///
/// Implementations perform exactly one upstream call per method and never
/// retry; failures go straight back to the caller.
#[async_trait]
pub trait CodeforcesApi: Send + Sync {
    /// `user.info` for one or more handles.
    async fn user_info(&self, handles: &[String]) -> UpstreamResult<Vec<User>>;

    /// `user.rating` for a single handle.
    async fn user_rating(&self, handle: &str) -> UpstreamResult<Vec<RatingChange>>;

    /// `user.status`, paginated with a 1-based `from`.
    async fn user_status(
        &self,
        handle: &str,
        from: u32,
        count: Option<u32>,
    ) -> UpstreamResult<Vec<Submission>>;

    /// `problemset.problems`, optionally filtered by tags.
    async fn problemset(&self, tags: &[String]) -> UpstreamResult<ProblemSet>;

    /// `contest.list`.
    async fn contest_list(&self, gym: bool) -> UpstreamResult<Vec<Contest>>;

    /// `contest.standings`.
    async fn contest_standings(
        &self,
        contest_id: u64,
        from: u32,
        count: Option<u32>,
    ) -> UpstreamResult<Standings>;
}
