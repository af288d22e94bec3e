//! Middleware for the cfshield API.

pub mod admin;
pub mod rate_limit;

pub use admin::{admin_token_middleware, AdminTokenState};
pub use rate_limit::{
    extract_client_ip, rate_limit_middleware, RateLimitError, RateLimitScope, RateLimitState,
};
