//! Bearer-protected routes.

use axum::extract::State;
use axum::http::header::{AsHeaderName, AUTHORIZATION};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::AppState;

pub const SECURE_MESSAGE: &str = "Secure resource OK";

/// Carries the access token an ID token's `at_hash` is checked against.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

fn header_str<'a>(headers: &'a HeaderMap, name: impl AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `GET /secure`
pub async fn secure(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let claims = state
        .verifier
        .verify_with_access_token(
            header_str(&headers, AUTHORIZATION),
            header_str(&headers, ACCESS_TOKEN_HEADER),
        )
        .await?;

    Ok(Json(state.projection.project(&claims, SECURE_MESSAGE)))
}
