//! cfshield API Server Entry Point
//!
//! Bootstraps configuration, connects the cache and starts the Axum HTTP
//! server. The cache connection is closed after the server stops.

use std::net::SocketAddr;
use std::sync::Arc;

use cfshield_api::telemetry::init_tracing;
use cfshield_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState, CodeforcesClient};
use cfshield_storage::CacheStore;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let config = ApiConfig::from_env();
    let cache = CacheStore::connect(config.redis_config()).await;
    let upstream = Arc::new(CodeforcesClient::new(config.upstream_timeout)?);

    let state = AppState::new(config, cache.clone(), upstream);
    let app = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, cache = ?cache.stats().backend, "Starting cfshield API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    let result = server
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)));

    cache.shutdown();
    result
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("CFSHIELD_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("CFSHIELD_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::validation_failed(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::validation_failed(format!("Invalid bind address {}: {}", addr, e)))
}
