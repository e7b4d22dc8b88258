//! Bearer token verifier
//!
//! Turns a raw `Authorization` header into a [`ValidatedClaims`] or a typed
//! [`AuthError`]. Every failure along the way, network, parse or crypto,
//! is converted into one of the rejection variants.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::AuthError;
use crate::jwt::claims::ValidatedClaims;
use crate::jwt::jwk_cache::JwksCache;
use crate::jwt::token::{Token, Unvalidated, ValidationPolicy};
use crate::observability::Metrics;

/// Authorization scheme prefix, matched case-insensitively.
const BEARER_PREFIX: &str = "bearer ";

/// Extracts the token from a `Bearer` authorization header.
pub fn extract_bearer(authorization: Option<&str>) -> Result<&str, AuthError> {
    let header = authorization.ok_or(AuthError::MalformedHeader)?;

    let scheme = header
        .get(..BEARER_PREFIX.len())
        .ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
        return Err(AuthError::MalformedHeader);
    }

    // Nothing after the scheme is not a bearer credential; anything else,
    // even whitespace only, is left for token parsing to reject.
    let rest = &header[BEARER_PREFIX.len()..];
    if rest.is_empty() {
        return Err(AuthError::MalformedHeader);
    }
    Ok(rest.trim())
}

/// Bearer token verifier backed by a shared [`JwksCache`].
pub struct TokenVerifier {
    jwks: Arc<JwksCache>,
    policy: ValidationPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl TokenVerifier {
    /// Creates a verifier that reads keys from `jwks`.
    pub fn new(jwks: Arc<JwksCache>, policy: ValidationPolicy) -> Self {
        TokenVerifier {
            jwks,
            policy,
            metrics: None,
        }
    }

    /// Creates a verifier with the issuer, audience and flags from `config`.
    pub fn from_config(config: &Config, jwks: Arc<JwksCache>) -> Self {
        let policy = ValidationPolicy::new(config.issuer(), config.oidc_audience.clone())
            .with_leeway(config.jwt_leeway_seconds)
            .with_at_hash_verification(config.verify_at_hash);
        Self::new(jwks, policy)
    }

    /// Records verification outcomes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Verifies a raw `Authorization` header value.
    pub async fn verify(&self, authorization: Option<&str>) -> Result<ValidatedClaims, AuthError> {
        self.verify_with_access_token(authorization, None).await
    }

    /// Verifies a raw `Authorization` header value, checking `at_hash`
    /// against `access_token` when the policy enables it.
    #[instrument(skip_all)]
    pub async fn verify_with_access_token(
        &self,
        authorization: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<ValidatedClaims, AuthError> {
        let result = self.run(authorization, access_token).await;

        let outcome = match &result {
            Ok(claims) => {
                debug!(sub = ?claims.subject(), "Token validated");
                "success"
            }
            Err(err @ AuthError::KeySetUnavailable(_)) => {
                warn!(error_code = err.code().as_str(), error = %err, "Token verification failed");
                err.code().as_str()
            }
            Err(err) => {
                debug!(error_code = err.code().as_str(), error = %err, "Token rejected");
                err.code().as_str()
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_verification(outcome);
        }

        result
    }

    async fn run(
        &self,
        authorization: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<ValidatedClaims, AuthError> {
        let raw = extract_bearer(authorization)?;
        let token = Token::<Unvalidated>::parse(raw)?;

        let kid = token.kid().ok_or_else(|| AuthError::MalformedToken {
            reason: "Missing kid in header".to_string(),
        })?;

        let keys = self.jwks.get_keys().await?;
        let jwk = keys.find(kid).ok_or_else(|| AuthError::KeyNotFound {
            kid: kid.to_string(),
        })?;

        let validated = token
            .validate_signature(jwk, &self.policy)?
            .validate_binding(&self.policy, access_token)?;

        Ok(validated.into_claims())
    }
}
