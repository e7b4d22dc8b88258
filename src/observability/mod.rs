//! Observability Module
//!
//! Provides structured logging and Prometheus metrics.

pub mod metrics;
pub mod telemetry;

pub use metrics::Metrics;
pub use telemetry::{init_telemetry, TelemetryConfig};
