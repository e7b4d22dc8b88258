//! JWKS Cache with Single-Flight Refresh
//!
//! Implements a key set cache that:
//! - Serves the provider's key set while it is younger than the freshness window
//! - Refetches on read once the window has elapsed
//! - Prevents thundering herd on refresh using the single-flight pattern
//! - Replaces the cached set with one atomic pointer swap

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::{Config, ConfigError};
use crate::error::{ClaimFailure, JwksError};
use crate::observability::Metrics;

/// Shortest base64url modulus accepted (2048-bit keys encode to 342 chars).
const MIN_RSA_MODULUS_B64_LEN: usize = 340;

/// JSON Web Key structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC, oct)
    pub kty: String,
    /// Key ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// Algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// RSA modulus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

impl Jwk {
    /// Converts this JWK into an RS256 verification key.
    pub fn rsa_decoding_key(&self) -> Result<DecodingKey, ClaimFailure> {
        if self.kty != "RSA" {
            return Err(unusable(format!("key type {} cannot verify RS256", self.kty)));
        }
        if let Some(alg) = self.alg.as_deref().filter(|alg| *alg != "RS256") {
            return Err(unusable(format!("key is published for {alg}")));
        }
        if self.key_use.as_deref() == Some("enc") {
            return Err(unusable("key is published for encryption".to_string()));
        }

        let (Some(n), Some(e)) = (self.n.as_deref(), self.e.as_deref()) else {
            return Err(unusable("missing RSA modulus or exponent".to_string()));
        };

        if n.len() < MIN_RSA_MODULUS_B64_LEN {
            warn!(kid = ?self.kid, "RSA key too small, rejecting");
            return Err(unusable("RSA key is shorter than 2048 bits".to_string()));
        }

        DecodingKey::from_rsa_components(n, e).map_err(ClaimFailure::from)
    }
}

fn unusable(reason: String) -> ClaimFailure {
    ClaimFailure::UnusableKey { reason }
}

/// JSON Web Key Set structure.
///
/// Key order is the order published by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    /// List of keys
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// Returns the first key whose `kid` equals `kid` exactly.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|jwk| jwk.kid.as_deref() == Some(kid))
    }

    /// Number of keys in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Settings for [`JwksCache`].
#[derive(Debug, Clone)]
pub struct JwksCacheConfig {
    /// JWKS endpoint
    pub jwks_url: Url,
    /// Freshness window
    pub ttl: Duration,
    /// Bound on a single fetch
    pub fetch_timeout: Duration,
    /// Serve the previous key set when a refresh fails
    pub serve_stale_on_error: bool,
}

impl JwksCacheConfig {
    /// Settings with the default 300 s window and 5 s timeout.
    #[must_use]
    pub fn new(jwks_url: Url) -> Self {
        Self {
            jwks_url,
            ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(5),
            serve_stale_on_error: false,
        }
    }

    /// Builds the settings from the service configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            jwks_url: config.jwks_url()?,
            ttl: config.jwks_cache_ttl(),
            fetch_timeout: config.jwks_fetch_timeout(),
            serve_stale_on_error: config.jwks_serve_stale_on_error,
        })
    }

    /// Sets the freshness window.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Enables or disables serving a stale key set on refresh failure.
    #[must_use]
    pub fn with_serve_stale_on_error(mut self, enabled: bool) -> Self {
        self.serve_stale_on_error = enabled;
        self
    }
}

/// One successful fetch.
struct CacheEntry {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

/// Type alias for the inflight future.
type InflightFuture = Shared<BoxFuture<'static, Result<Arc<CacheEntry>, JwksError>>>;

/// JWKS cache with single-flight refresh.
pub struct JwksCache {
    /// Last successful fetch, if any
    state: Arc<ArcSwapOption<CacheEntry>>,
    /// JWKS endpoint URL
    jwks_url: Url,
    /// Freshness window
    ttl: Duration,
    /// Fall back to the previous key set when a refresh fails
    serve_stale_on_error: bool,
    /// Single-flight coordinator
    inflight: Mutex<Option<InflightFuture>>,
    /// HTTP client for fetching JWKS
    http_client: reqwest::Client,
    /// Fetch counters
    metrics: Option<Arc<Metrics>>,
}

impl JwksCache {
    /// Creates an empty cache. No request is made until the first read.
    pub fn new(config: JwksCacheConfig) -> Result<Self, JwksError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| JwksError::Client {
                reason: e.to_string(),
            })?;

        Ok(Self {
            state: Arc::new(ArcSwapOption::empty()),
            jwks_url: config.jwks_url,
            ttl: config.ttl,
            serve_stale_on_error: config.serve_stale_on_error,
            inflight: Mutex::new(None),
            http_client,
            metrics: None,
        })
    }

    /// Records fetch outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns the current key set, fetching it when absent or stale.
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    pub async fn get_keys(&self) -> Result<Arc<KeySet>, JwksError> {
        if let Some(entry) = self.fresh_entry() {
            return Ok(Arc::clone(&entry.keys));
        }

        match self.refresh_single_flight(false).await {
            Ok(entry) => Ok(Arc::clone(&entry.keys)),
            Err(err) => self.stale_fallback(err),
        }
    }

    /// Serves the previous key set after a failed refresh when allowed.
    fn stale_fallback(&self, err: JwksError) -> Result<Arc<KeySet>, JwksError> {
        if !self.serve_stale_on_error {
            return Err(err);
        }
        match self.state.load_full() {
            Some(entry) => {
                warn!(
                    error = %err,
                    age_secs = entry.fetched_at.elapsed().as_secs(),
                    "JWKS refresh failed, serving stale key set"
                );
                Ok(Arc::clone(&entry.keys))
            }
            None => Err(err),
        }
    }

    /// Returns the cached entry if it is within the freshness window.
    fn fresh_entry(&self) -> Option<Arc<CacheEntry>> {
        let cache = self.state.load();
        match &*cache {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(Arc::clone(entry)),
            _ => None,
        }
    }

    /// Checks if the cache is empty or stale.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.fresh_entry().is_none()
    }

    /// Refreshes the cache using single-flight pattern.
    ///
    /// Only one HTTP request will be made even if multiple concurrent
    /// callers request a refresh simultaneously; they all receive its result.
    /// With `force`, a set that turned fresh while waiting is not reused.
    async fn refresh_single_flight(&self, force: bool) -> Result<Arc<CacheEntry>, JwksError> {
        let mut inflight_guard = self.inflight.lock().await;

        let running = inflight_guard
            .as_ref()
            .filter(|fut| fut.peek().is_none())
            .cloned();
        if let Some(fut) = running {
            drop(inflight_guard);
            return fut.await;
        }

        // A refresh may have completed while this caller waited for the lock.
        if !force {
            if let Some(entry) = self.fresh_entry() {
                return Ok(entry);
            }
        }

        let fut = Self::fetch(
            self.http_client.clone(),
            self.jwks_url.clone(),
            Arc::clone(&self.state),
            self.metrics.clone(),
        )
        .boxed()
        .shared();
        *inflight_guard = Some(fut.clone());
        drop(inflight_guard);

        let result = fut.clone().await;

        let mut inflight_guard = self.inflight.lock().await;
        if inflight_guard
            .as_ref()
            .is_some_and(|current| current.ptr_eq(&fut))
        {
            inflight_guard.take();
        }

        result
    }

    /// Downloads the key set and swaps it into `state`.
    async fn fetch(
        client: reqwest::Client,
        url: Url,
        state: Arc<ArcSwapOption<CacheEntry>>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Arc<CacheEntry>, JwksError> {
        info!(url = %url, "Fetching JWKS");
        let started = Instant::now();

        let result = Self::download(&client, &url).await;
        if let Some(metrics) = &metrics {
            metrics.record_jwks_fetch(result.is_ok(), started.elapsed());
        }

        let keys = result.inspect_err(|err| {
            warn!(url = %url, error = %err, "JWKS fetch failed");
        })?;

        let entry = Arc::new(CacheEntry {
            keys: Arc::new(keys),
            fetched_at: Instant::now(),
        });
        state.store(Some(Arc::clone(&entry)));

        info!("JWKS cache updated with {} keys", entry.keys.len());
        Ok(entry)
    }

    async fn download(client: &reqwest::Client, url: &Url) -> Result<KeySet, JwksError> {
        let response = client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(JwksError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| JwksError::Decode {
            reason: e.to_string(),
        })
    }

    /// Fetches a new key set regardless of age. On failure the cached set,
    /// fresh or stale, is kept as it was.
    pub async fn force_refresh(&self) -> Result<Arc<KeySet>, JwksError> {
        let entry = self.refresh_single_flight(true).await?;
        Ok(Arc::clone(&entry.keys))
    }

    /// Gets the number of cached keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        let cache = self.state.load();
        match &*cache {
            Some(entry) => entry.keys.len(),
            None => 0,
        }
    }
}
