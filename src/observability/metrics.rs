//! Token Verification and JWKS Metrics
//!
//! Provides Prometheus metrics for verification outcomes and key set fetches.

use std::time::Duration;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "app_backend";

/// Service metrics with their own registry
pub struct Metrics {
    registry: Registry,
    /// Verification outcomes (`success` or an error code)
    pub token_verifications: IntCounterVec,
    /// JWKS fetches by result
    pub jwks_fetches: IntCounterVec,
    /// JWKS fetch latency
    pub jwks_fetch_duration: Histogram,
}

impl Metrics {
    /// Creates the metrics and registers them in a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let token_verifications = IntCounterVec::new(
            Opts::new("token_verifications_total", "Total bearer token verifications")
                .namespace(NAMESPACE),
            &["outcome"],
        )?;
        registry.register(Box::new(token_verifications.clone()))?;

        let jwks_fetches = IntCounterVec::new(
            Opts::new("jwks_fetches_total", "Total JWKS fetches").namespace(NAMESPACE),
            &["result"],
        )?;
        registry.register(Box::new(jwks_fetches.clone()))?;

        let jwks_fetch_duration = Histogram::with_opts(
            HistogramOpts::new("jwks_fetch_duration_seconds", "JWKS fetch latency")
                .namespace(NAMESPACE)
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(jwks_fetch_duration.clone()))?;

        Ok(Self {
            registry,
            token_verifications,
            jwks_fetches,
            jwks_fetch_duration,
        })
    }

    /// Records one verification outcome
    pub fn record_verification(&self, outcome: &str) {
        self.token_verifications.with_label_values(&[outcome]).inc();
    }

    /// Records one JWKS fetch
    pub fn record_jwks_fetch(&self, success: bool, elapsed: Duration) {
        let result = if success { "success" } else { "failure" };
        self.jwks_fetches.with_label_values(&[result]).inc();
        self.jwks_fetch_duration.observe(elapsed.as_secs_f64());
    }

    /// Renders all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
