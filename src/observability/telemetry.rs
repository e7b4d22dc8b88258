//! Tracing Subscriber Configuration
//!
//! Sets up an `EnvFilter`-driven subscriber with a JSON or pretty console layer.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LogFormat};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Console output format
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            log_format: LogFormat::Json,
            default_filter: "info".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Telemetry settings for the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_format: config.log_format,
            ..Self::default()
        }
    }
}

/// Installs the global tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            subscriber.with(fmt_layer).try_init()?;
        }
        LogFormat::Pretty => {
            subscriber.with(tracing_subscriber::fmt::layer().pretty()).try_init()?;
        }
    }

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "Telemetry initialized"
    );
    Ok(())
}
