use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub async fn handle_health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

pub async fn handle_ready() -> Response {
    Json(json!({ "status": "ready" })).into_response()
}
