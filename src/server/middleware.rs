// Middleware shared by the request service and the directory
//
// Both servers speak a public interop protocol: any origin may call them.

use crate::config::constants::CORS_MAX_AGE_SECS;
use axum::http::Method;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// CORS layer allowing any origin to GET/POST with any header.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS))
}

/// Resolves when the process receives Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
