//! Health check handler.

use axum::Json;
use serde_json::{json, Value};

/// Health check endpoint.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
