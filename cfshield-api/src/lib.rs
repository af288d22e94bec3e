//! cfshield API - Caching and Rate-Limiting Proxy for the Codeforces API
//!
//! HTTP layer of the shield: the `reqwest` upstream client, the cached
//! resource service, rate-limit and admin middleware, and the Axum router
//! that ties them to a shared [`AppState`].

pub mod config;
pub mod constants;
pub mod error;
pub mod middleware;
pub mod resources;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod upstream;
pub mod validation;

// Re-export commonly used types
pub use config::{ApiConfig, RateBudget};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use resources::CodeforcesService;
pub use routes::create_api_router;
pub use state::AppState;
pub use upstream::CodeforcesClient;
