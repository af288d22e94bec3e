//! Error Types for the cfshield API
//!
//! This module defines error handling for the HTTP layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversions from the core validation and upstream errors
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.
//! Cache backend errors never reach this layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cfshield_core::{UpstreamError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Admin endpoint called without a valid admin token
    Unauthorized,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Required query parameter is missing
    MissingField,

    /// Parameter value is out of valid range
    InvalidRange,

    /// Parameter format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// The upstream does not know the requested handle
    HandleNotFound,

    /// Admin lookup for a key that is not cached
    KeyNotFound,

    // ========================================================================
    // Throttling (429)
    // ========================================================================
    /// Request rate limit exceeded
    TooManyRequests,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// The upstream failed for a reason other than an unknown handle
    UpstreamFailed,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::ValidationFailed
            | ErrorCode::MissingField
            | ErrorCode::InvalidRange
            | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,

            ErrorCode::HandleNotFound | ErrorCode::KeyNotFound => StatusCode::NOT_FOUND,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::UpstreamFailed | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required parameter '{}' is missing", field),
        )
    }

    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidRange,
            format!("Parameter '{}' must be between {} and {}", field, min, max),
        )
    }

    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Parameter '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn handle_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HandleNotFound, message)
    }

    pub fn key_not_found(key: &str) -> Self {
        Self::new(ErrorCode::KeyNotFound, format!("Key '{}' is not cached", key))
    }

    pub fn upstream_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamFailed, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded. Retry after {} seconds", secs),
            None => "Rate limit exceeded".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(&field),
            ValidationError::InvalidValue { field, reason } => {
                ApiError::invalid_format(&field, &reason)
            }
            ValidationError::OutOfRange { field, min, max } => {
                ApiError::invalid_range(&field, min, max)
            }
        }
    }
}

/// Unknown handles become 404; every other upstream failure is a 500 that
/// still carries the upstream's own message.
impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        if err.is_not_found() {
            return ApiError::handle_not_found(err.to_string());
        }
        tracing::warn!(error = %err, "Upstream request failed");
        ApiError::upstream_failed(err.to_string())
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::HandleNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::TooManyRequests.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::UpstreamFailed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_not_found_maps_to_404() {
        let err: ApiError =
            UpstreamError::failed(Some("handle: User with handle zz not found".into())).into();
        assert_eq!(err.code, ErrorCode::HandleNotFound);
        assert_eq!(err.message, "handle: User with handle zz not found");
    }

    #[test]
    fn test_other_upstream_failures_map_to_500() {
        let err: ApiError = UpstreamError::failed(Some("Call limit exceeded".into())).into();
        assert_eq!(err.code, ErrorCode::UpstreamFailed);
        assert_eq!(err.message, "Call limit exceeded");

        let err: ApiError = UpstreamError::failed(None).into();
        assert_eq!(err.message, "Upstream request failed");

        let err: ApiError = UpstreamError::Transport {
            reason: "timeout".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_errors_map_to_400() {
        let err: ApiError = ValidationError::missing("handle").into();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("handle"));

        let err: ApiError = ValidationError::OutOfRange {
            field: "count".into(),
            min: 1,
            max: 10_000,
        }
        .into();
        assert_eq!(err.code, ErrorCode::InvalidRange);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::handle_not_found("handle: nobody not found");
        let json = serde_json::to_string(&err)?;
        assert!(json.contains("HANDLE_NOT_FOUND"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::upstream_failed("boom");
        let display = format!("{}", err);
        assert!(display.contains("UpstreamFailed"));
        assert!(display.contains("boom"));
    }
}
