//! Admin token guard for the cache inspection endpoints.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::constants::HEADER_ADMIN_TOKEN;
use crate::error::ApiError;

#[derive(Clone)]
pub struct AdminTokenState {
    token: Option<Arc<str>>,
}

impl AdminTokenState {
    /// `None` leaves the guarded routes open.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.map(Arc::from),
        }
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        match (&self.token, presented) {
            (None, _) => true,
            (Some(expected), Some(presented)) => {
                presented.len() == expected.len()
                    && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
            }
            (Some(_), None) => false,
        }
    }
}

/// Reject requests whose `X-Admin-Token` does not match the configured token.
pub async fn admin_token_middleware(
    State(state): State<AdminTokenState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(HEADER_ADMIN_TOKEN)
        .and_then(|v| v.to_str().ok());

    if !state.accepts(presented) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(ApiError::unauthorized("Missing or invalid admin token"));
    }

    Ok(next.run(request).await)
}
