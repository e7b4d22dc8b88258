//! Unauthenticated routes.

use std::io::ErrorKind;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ApiError;
use crate::http::AppState;

pub const HELLO_MESSAGE: &str = "Hello from App Server! (public)";

/// `GET /hello`
pub async fn hello() -> Json<Value> {
    Json(json!({ "message": HELLO_MESSAGE }))
}

/// `GET /student`: the configured JSON document, re-serialized.
pub async fn student_file(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let path = &state.student_json_path;

    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => {
            ApiError::NotFound(format!("File not found at path: {}", path.display()))
        }
        _ => ApiError::Internal(format!("An error occurred: {e}")),
    })?;

    let document: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Internal(format!("An error occurred: {e}")))?;

    debug!(path = %path.display(), "Served student document");
    Ok(Json(document))
}
