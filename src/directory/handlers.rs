// Directory HTTP handlers

use super::{AnnounceReply, Directory, DiscoveredService};
use crate::server::middleware::cors_layer;
use axum::{body::Bytes, extract::State, routing::get, routing::post, Json, Router};
use std::sync::Arc;

pub fn create_router(directory: Arc<Directory>) -> Router {
    Router::new()
        .route("/announce", post(handle_announce))
        .route("/discover", get(handle_discover))
        .layer(cors_layer())
        .with_state(directory)
}

/// The body is parsed as JSON whatever its declared content type.
async fn handle_announce(
    State(directory): State<Arc<Directory>>,
    body: Bytes,
) -> Json<AnnounceReply> {
    Json(directory.announce_bytes(&body).await)
}

async fn handle_discover(State(directory): State<Arc<Directory>>) -> Json<Vec<DiscoveredService>> {
    let services = directory.discover().await;
    tracing::debug!("Returning {} services", services.len());
    Json(services)
}
