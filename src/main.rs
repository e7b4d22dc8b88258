//! Application Backend Server - Main Entry Point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use app_backend::jwt::{JwksCache, JwksCacheConfig, TokenVerifier};
use app_backend::observability::{init_telemetry, Metrics, TelemetryConfig};
use app_backend::shutdown::{serve_with_graceful_shutdown, shutdown_signal};
use app_backend::store::MySqlStudentStore;
use app_backend::{create_app, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    let telemetry_config = TelemetryConfig::from_config(&config);
    init_telemetry(&telemetry_config).context("failed to install tracing subscriber")?;

    info!(issuer = config.issuer(), "Starting Application Backend Server");

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);

    let jwks = JwksCache::new(JwksCacheConfig::from_config(&config)?)
        .context("failed to build JWKS client")?
        .with_metrics(Arc::clone(&metrics));
    let verifier = TokenVerifier::from_config(&config, Arc::new(jwks))
        .with_metrics(Arc::clone(&metrics));

    let store = MySqlStudentStore::new(&config);
    store
        .ensure_schema()
        .await
        .context("failed to prepare students table")?;

    let state = AppState {
        verifier: Arc::new(verifier),
        store: Arc::new(store),
        metrics,
        student_json_path: PathBuf::from(&config.student_json_path),
        projection: config.secure_claim_projection,
    };
    let app = create_app(state, config.request_timeout());

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "Application Backend Server listening");

    serve_with_graceful_shutdown(listener, app, shutdown_signal(), config.shutdown_timeout())
        .await
        .context("server error")?;

    info!("Application Backend Server stopped");
    Ok(())
}
