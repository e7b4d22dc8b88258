//! Type-Safe Configuration with Validation
//!
//! Reads the service configuration from environment variables (and an
//! optional `.env` file). Every option has a default matching the local
//! development topology.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::jwt::ClaimProjection;

/// Path appended to the issuer URL to reach the provider's key set.
pub const JWKS_PATH: &str = "/protocol/openid-connect/certs";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: String, reason: String },

    /// Invalid port number
    #[error("Invalid port: must be between 1 and 65535")]
    InvalidPort,

    /// Invalid TTL value
    #[error("Invalid TTL: must be greater than 0")]
    InvalidTtl,

    /// Invalid timeout value
    #[error("Invalid timeout for {0}: must be greater than 0")]
    InvalidTimeout(String),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError { name: String, reason: String },
}

/// Output format of the console log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable multi-line output
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Service configuration with validation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port (1-65535)
    pub port: u16,
    /// Expected `iss` claim exactly as configured, also the base of the JWKS URL
    pub oidc_issuer: String,
    /// Expected `aud` value (the client id)
    pub oidc_audience: String,
    /// JWKS freshness window in seconds (must be > 0)
    pub jwks_cache_ttl_seconds: u64,
    /// JWKS fetch timeout in seconds (must be > 0)
    pub jwks_fetch_timeout_secs: u64,
    /// Serve a stale key set when a refresh fails
    pub jwks_serve_stale_on_error: bool,
    /// Clock skew tolerated on `exp`/`nbf`, in seconds
    pub jwt_leeway_seconds: u64,
    /// Check the `at_hash` claim against the access token
    pub verify_at_hash: bool,
    /// Claims returned by `/secure`
    pub secure_claim_projection: ClaimProjection,
    /// Database user
    pub db_user: String,
    /// Database password
    pub db_pass: String,
    /// Database host
    pub db_host: String,
    /// Database port
    pub db_port: u16,
    /// Database name
    pub db_name: String,
    /// Maximum pooled database connections
    pub db_max_connections: u32,
    /// Location of the static student JSON document
    pub student_json_path: String,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
    /// Console log format
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables with validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("PORT", 8081)?,
            oidc_issuer: env::var("OIDC_ISSUER")
                .unwrap_or_else(|_| "http://keycloak:8080/realms/master".to_string()),
            oidc_audience: env::var("OIDC_AUDIENCE").unwrap_or_else(|_| "myapp".to_string()),
            jwks_cache_ttl_seconds: parse_env("JWKS_CACHE_TTL", 300)?,
            jwks_fetch_timeout_secs: parse_env("JWKS_FETCH_TIMEOUT", 5)?,
            jwks_serve_stale_on_error: parse_env("JWKS_SERVE_STALE_ON_ERROR", false)?,
            jwt_leeway_seconds: parse_env("JWT_LEEWAY", 0)?,
            verify_at_hash: parse_env("VERIFY_AT_HASH", false)?,
            secure_claim_projection: parse_env("SECURE_CLAIM_PROJECTION", ClaimProjection::Extended)?,
            db_user: env::var("DB_USER").unwrap_or_else(|_| "root".to_string()),
            db_pass: env::var("DB_PASS").unwrap_or_else(|_| "root".to_string()),
            db_host: env::var("DB_HOST")
                .unwrap_or_else(|_| "relational-database-server".to_string()),
            db_port: parse_env("DB_PORT", 3306)?,
            db_name: env::var("DB_NAME").unwrap_or_else(|_| "studentdb".to_string()),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 5)?,
            student_json_path: env::var("STUDENT_JSON_PATH")
                .unwrap_or_else(|_| "students.json".to_string()),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT", 30)?,
            shutdown_timeout_seconds: parse_env("SHUTDOWN_TIMEOUT", 30)?,
            log_format: parse_env("LOG_FORMAT", LogFormat::Json)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.jwks_cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidTtl);
        }
        if self.jwks_fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("JWKS_FETCH_TIMEOUT".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("REQUEST_TIMEOUT".to_string()));
        }
        if self.oidc_audience.trim().is_empty() {
            return Err(ConfigError::MissingRequired("OIDC_AUDIENCE".to_string()));
        }
        if self.db_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("DB_NAME".to_string()));
        }
        self.jwks_url()?;
        Ok(())
    }

    /// Issuer string compared verbatim against the `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.oidc_issuer
    }

    /// JWKS endpoint derived from the issuer. Only this value is normalized.
    pub fn jwks_url(&self) -> Result<Url, ConfigError> {
        jwks_url_for_issuer(&self.oidc_issuer)
    }

    /// Socket address string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// JWKS freshness window.
    #[must_use]
    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }

    /// JWKS fetch timeout.
    #[must_use]
    pub fn jwks_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_secs)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Builds `{issuer}/protocol/openid-connect/certs`.
pub fn jwks_url_for_issuer(issuer: &str) -> Result<Url, ConfigError> {
    let joined = format!("{}{JWKS_PATH}", issuer.trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| ConfigError::InvalidUrl {
        field: "OIDC_ISSUER".to_string(),
        reason: e.to_string(),
    })
}

/// Parse an environment variable with a default value.
fn parse_env<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
