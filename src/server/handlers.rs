// HTTP handlers for the request service
//
// Every endpoint answers 200 with a JSON body; request problems are
// reported as error items, never as HTTP failures.

use super::middleware::cors_layer;
use super::RequestService;
use crate::interface::{InputInterface, RequestForm, ResponseItem};
use axum::{
    extract::{multipart::MultipartRejection, FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the request service router.
pub fn create_router(service: Arc<RequestService>) -> Router {
    Router::new()
        .route("/interface", get(handle_interface))
        .route("/predict", post(handle_predict))
        .route("/responses", post(handle_responses))
        .route("/announcePoint", get(handle_announce_point))
        .layer(cors_layer())
        .with_state(service)
}

async fn handle_interface(State(service): State<Arc<RequestService>>) -> Json<InputInterface> {
    Json(service.input_interface().clone())
}

async fn handle_predict(
    State(service): State<Arc<RequestService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<Vec<ResponseItem>> {
    tracing::info!("predicting...");

    let form = match multipart {
        Ok(multipart) => read_form(multipart).await,
        Err(rejection) => Err(rejection.body_text()),
    };

    match form {
        Ok(form) => Json(service.predict(form).await),
        Err(reason) => {
            tracing::warn!("Unreadable /predict body: {}", reason);
            Json(vec![ResponseItem::error(
                "Server-side ERROR during request parsing",
            )])
        }
    }
}

/// Collect multipart fields; the first value of a repeated name wins.
async fn read_form(mut multipart: Multipart) -> Result<RequestForm, String> {
    let mut form = RequestForm::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let data = field.bytes().await.map_err(|e| e.body_text())?;
        form.entry(name).or_insert_with(|| data.to_vec());
    }
    Ok(form)
}

#[derive(Debug, Deserialize)]
struct PollRequest {
    request_id: String,
}

async fn handle_responses(
    State(service): State<Arc<RequestService>>,
    request: Request,
) -> Json<Vec<ResponseItem>> {
    tracing::info!("getting responses...");

    match extract_request_id(request).await {
        Some(request_id) => Json(service.poll(&request_id)),
        None => Json(vec![ResponseItem::error("No request_id specified")]),
    }
}

/// Accept `request_id` as multipart, urlencoded form, or JSON.
async fn extract_request_id(request: Request) -> Option<String> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &()).await.ok()?;
        let mut form = read_form(multipart).await.ok()?;
        let raw = form.remove("request_id")?;
        return Some(String::from_utf8_lossy(&raw).trim().to_string());
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(poll) = Form::<PollRequest>::from_request(request, &()).await.ok()?;
        return Some(poll.request_id);
    }

    let body = axum::body::to_bytes(request.into_body(), 64 * 1024).await.ok()?;
    serde_json::from_slice::<PollRequest>(&body)
        .ok()
        .map(|poll| poll.request_id)
}

async fn handle_announce_point(State(service): State<Arc<RequestService>>) -> Json<Value> {
    Json(json!({ "announced_at": service.announce_point().unwrap_or("") }))
}
