//! cfshield Telemetry - Observability Infrastructure
//!
//! Structured JSON logging through `tracing-subscriber` and Prometheus
//! metrics for the HTTP, cache, upstream and rate-limit paths.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, CfShieldMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracing, DEFAULT_LOG_FILTER};
