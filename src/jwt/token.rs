//! Type-State JWT Token with compile-time validation guarantees
//!
//! A token moves through `Unvalidated` → `SignatureValidated` → `Validated`.
//! Claims are carried by the state itself, so they can only be read once
//! the signature and registered claims have been checked.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AuthError, ClaimFailure};
use crate::jwt::claims::{Claims, ValidatedClaims};
use crate::jwt::jwk_cache::Jwk;

// ============================================================================
// Sealed Trait Pattern for Token States
// ============================================================================

mod private {
    /// Sealed trait to prevent external implementations
    pub trait Sealed {}
}

/// Marker trait for token validation states
pub trait TokenState: private::Sealed {
    /// Human-readable state name for debugging
    fn state_name() -> &'static str;
}

/// Unvalidated token - header parsed, nothing verified
#[derive(Debug)]
pub struct Unvalidated;
impl private::Sealed for Unvalidated {}
impl TokenState for Unvalidated {
    fn state_name() -> &'static str {
        "Unvalidated"
    }
}

/// Signature, time validity, issuer and audience verified
#[derive(Debug)]
pub struct SignatureValidated {
    claims: Claims,
}
impl private::Sealed for SignatureValidated {}
impl TokenState for SignatureValidated {
    fn state_name() -> &'static str {
        "SignatureValidated"
    }
}

/// Fully validated - signature, claims and token binding verified
#[derive(Debug)]
pub struct Validated {
    claims: Claims,
}
impl private::Sealed for Validated {}
impl TokenState for Validated {
    fn state_name() -> &'static str {
        "Validated"
    }
}

// ============================================================================
// Validation Policy
// ============================================================================

/// What a token must satisfy beyond a good RS256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Exact expected `iss`
    pub issuer: String,
    /// Value that `aud` must contain
    pub audience: String,
    /// Clock skew tolerated on `exp`/`nbf`, in seconds
    pub leeway_seconds: u64,
    /// Check `at_hash` against the access token.
    ///
    /// Off by default: ID tokens carrying `at_hash` are accepted without
    /// proving they were issued alongside a given access token.
    pub verify_at_hash: bool,
}

impl ValidationPolicy {
    /// Policy with zero leeway and `at_hash` checking disabled.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: 0,
            verify_at_hash: false,
        }
    }

    /// Sets the tolerated clock skew.
    #[must_use]
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Enables or disables `at_hash` checking.
    #[must_use]
    pub fn with_at_hash_verification(mut self, enabled: bool) -> Self {
        self.verify_at_hash = enabled;
        self
    }

    /// jsonwebtoken settings: RS256 only, `exp` required, `nbf` checked.
    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.leeway = self.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation
    }
}

/// `at_hash` value for an access token: base64url of the left half of its
/// SHA-256 digest.
pub fn at_hash_for(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// Unverified JOSE header.
///
/// `alg` is kept as published; only RS256 passes signature validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub kid: Option<String>,
}

impl TokenHeader {
    /// Decodes the first segment of a compact JWT: base64url, then a JSON object.
    fn decode(raw: &str) -> Result<Self, AuthError> {
        let malformed = |reason: String| AuthError::MalformedToken {
            reason: format!("Invalid header: {reason}"),
        };

        let mut segments = raw.split('.');
        let header = segments.next().unwrap_or_default();
        if segments.count() < 2 {
            return Err(malformed("not enough segments".to_string()));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(header.trim_end_matches('='))
            .map_err(|e| malformed(e.to_string()))?;
        let object: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| malformed(e.to_string()))?;
        serde_json::from_value(Value::Object(object)).map_err(|e| malformed(e.to_string()))
    }
}

// ============================================================================
// Type-State Token Wrapper
// ============================================================================

/// Type-state token wrapper that enforces validation at compile time
#[derive(Debug)]
pub struct Token<State: TokenState> {
    /// Raw JWT string
    raw: String,
    /// Parsed header (available in all states)
    header: TokenHeader,
    /// Claims once verified
    state: State,
}

impl Token<Unvalidated> {
    /// Parse a raw JWT string into an unvalidated token.
    ///
    /// Only the header segment is decoded; the signature is not checked and
    /// any `alg` value is accepted here.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let header = TokenHeader::decode(raw)?;

        Ok(Token {
            raw: raw.to_string(),
            header,
            state: Unvalidated,
        })
    }

    /// Get the key ID from the token header
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// Get the algorithm from the token header
    pub fn algorithm(&self) -> Option<&str> {
        self.header.alg.as_deref()
    }

    /// Verify the RS256 signature with `jwk` and check `exp`, `nbf`, `iss`
    /// and `aud` against `policy`.
    pub fn validate_signature(
        self,
        jwk: &Jwk,
        policy: &ValidationPolicy,
    ) -> Result<Token<SignatureValidated>, ClaimFailure> {
        if self.algorithm() != Some("RS256") {
            return Err(ClaimFailure::AlgorithmMismatch);
        }

        let decoding_key = jwk.rsa_decoding_key()?;
        let token_data = decode::<Claims>(&self.raw, &decoding_key, &policy.validation())?;

        Ok(Token {
            raw: self.raw,
            header: self.header,
            state: SignatureValidated {
                claims: token_data.claims,
            },
        })
    }
}

impl Token<SignatureValidated> {
    /// Check the `at_hash` binding when the policy asks for it.
    pub fn validate_binding(
        self,
        policy: &ValidationPolicy,
        access_token: Option<&str>,
    ) -> Result<Token<Validated>, ClaimFailure> {
        if policy.verify_at_hash {
            if let Some(claimed) = self.state.claims.at_hash.as_deref() {
                let access_token = access_token.ok_or(ClaimFailure::AccessTokenRequired)?;
                let expected = at_hash_for(access_token);
                if !bool::from(expected.as_bytes().ct_eq(claimed.as_bytes())) {
                    return Err(ClaimFailure::AtHashMismatch);
                }
            }
        }

        Ok(Token {
            raw: self.raw,
            header: self.header,
            state: Validated {
                claims: self.state.claims,
            },
        })
    }
}

impl Token<Validated> {
    /// Hand the claims to the caller.
    pub fn into_claims(self) -> ValidatedClaims {
        ValidatedClaims::new(self.state.claims)
    }
}

// Common methods for all states
impl<S: TokenState> Token<S> {
    /// Get the current state name
    pub fn state_name(&self) -> &'static str {
        S::state_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reads_kid_and_alg() {
        // {"alg":"RS256","kid":"k1","typ":"JWT"}
        let raw = "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsxIiwidHlwIjoiSldUIn0.e30.c2ln";
        let token = Token::<Unvalidated>::parse(raw).unwrap();
        assert_eq!(token.kid(), Some("k1"));
        assert_eq!(token.algorithm(), Some("RS256"));
        assert_eq!(token.state_name(), "Unvalidated");
    }

    #[test]
    fn test_parse_rejects_garbage_header() {
        // "WzFd" is `[1]`, valid JSON but not an object.
        for raw in ["", "abc", "e30.sig", "not-base64!.e30.sig", "bm90IGpzb24.e30.sig", "WzFd.e30.sig"] {
            assert!(
                matches!(Token::<Unvalidated>::parse(raw), Err(AuthError::MalformedToken { .. })),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_parse_accepts_any_alg() {
        // {"alg":"none","kid":"k1"}
        let token = Token::<Unvalidated>::parse("eyJhbGciOiJub25lIiwia2lkIjoiazEifQ.e30.").unwrap();
        assert_eq!(token.algorithm(), Some("none"));
        assert_eq!(token.kid(), Some("k1"));

        // {}
        let token = Token::<Unvalidated>::parse("e30.e30.sig").unwrap();
        assert_eq!(token.algorithm(), None);
        assert_eq!(token.kid(), None);
    }

    #[test]
    fn test_at_hash_known_vector() {
        // OpenID Connect Core 1.0, Appendix A.3
        assert_eq!(
            at_hash_for("jHkWEdUXMU1BwAsC4vtUsZwnNvTIxEl0z9K3vx5KF0Y"),
            "77QmUPtjPfzWtF2AnpK9RQ"
        );
    }

    #[test]
    fn test_policy_pins_rs256() {
        let validation = ValidationPolicy::new("iss", "aud").validation();
        assert_eq!(validation.algorithms, vec![Algorithm::RS256]);
        assert_eq!(validation.leeway, 0);
        assert!(validation.validate_nbf);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(Unvalidated::state_name(), "Unvalidated");
        assert_eq!(SignatureValidated::state_name(), "SignatureValidated");
        assert_eq!(Validated::state_name(), "Validated");
    }
}
