//! Error types for cfshield operations

use thiserror::Error;

/// Caller-supplied parameters that are missing or malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required parameter missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Parameter {field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::RequiredFieldMissing {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Generic comment used when the upstream fails without explaining why.
pub const GENERIC_UPSTREAM_FAILURE: &str = "Upstream request failed";

/// Failures talking to the third-party API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    /// The upstream answered with `status: FAILED`.
    #[error("{comment}")]
    Failed { comment: String },

    /// The upstream answered `OK` but carried no `result`.
    #[error("Upstream response is missing its result")]
    MissingResult,

    /// The body was not an envelope, or `result` did not match the expected shape.
    #[error("Failed to decode upstream response: {reason}")]
    Decode { reason: String },

    /// Network, TLS or timeout failure before a body was received.
    #[error("Upstream unreachable: {reason}")]
    Transport { reason: String },
}

impl UpstreamError {
    /// Build a `Failed` error, falling back to a generic message.
    pub fn failed(comment: Option<String>) -> Self {
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| GENERIC_UPSTREAM_FAILURE.to_string());
        Self::Failed { comment }
    }

    /// Whether the failure means the requested handle or user does not exist.
    ///
    /// The upstream reports these as e.g. `handle: User with handle foo not found`.
    pub fn is_not_found(&self) -> bool {
        match self {
            UpstreamError::Failed { comment } => comment.to_lowercase().contains("not found"),
            _ => false,
        }
    }
}

/// Result type for upstream calls.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Cache store failures. These never leave the storage layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheBackendError {
    /// The store could not be reached (connection refused, dropped, timed out).
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    /// The store was reachable but rejected the command.
    #[error("Cache command {command} failed: {reason}")]
    Command { command: String, reason: String },

    /// A stored value could not be (de)serialized.
    #[error("Cache value serialization failed: {reason}")]
    Serialization { reason: String },
}

impl CacheBackendError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Connection-level errors flip the store into degraded mode.
    pub fn is_connection(&self) -> bool {
        matches!(self, CacheBackendError::Unavailable { .. })
    }
}

impl From<serde_json::Error> for CacheBackendError {
    fn from(err: serde_json::Error) -> Self {
        CacheBackendError::Serialization {
            reason: err.to_string(),
        }
    }
}
