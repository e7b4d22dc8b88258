//! HTTP surface
//!
//! Builds the axum router. Each handler module owns one group of routes;
//! they share [`AppState`].

pub mod public;
pub mod secure;
pub mod students;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info_span;
use uuid::Uuid;

use crate::jwt::{ClaimProjection, TokenVerifier};
use crate::observability::Metrics;
use crate::store::StudentStore;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Bearer token verifier for protected routes
    pub verifier: Arc<TokenVerifier>,
    /// Student records
    pub store: Arc<dyn StudentStore>,
    /// Prometheus registry rendered on `/metrics`
    pub metrics: Arc<Metrics>,
    /// JSON document served by `/student`
    pub student_json_path: PathBuf,
    /// Claims echoed by `/secure`
    pub projection: ClaimProjection,
}

/// Creates the application router.
pub fn create_app(state: AppState, request_timeout: Duration) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    correlation_id = %Uuid::new_v4(),
                )
            }),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .route("/hello", get(public::hello))
        .route("/student", get(public::student_file))
        .route("/secure", get(secure::secure))
        .route("/metrics", get(telemetry::metrics))
        .route("/db/students/add-student", post(students::create))
        .route("/db/students/get-all", get(students::list))
        .route("/db/students/get/:id", get(students::get_one))
        .route("/db/students/update/:id", post(students::update))
        .route("/db/students/delete/:id", post(students::delete))
        .layer(middleware)
        .with_state(state)
}
