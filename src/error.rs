//! Error handling module
//!
//! This module provides the error taxonomy of the service:
//! - `JwksError` for key set retrieval
//! - `ClaimFailure` for signature and claim validation
//! - `AuthError` for every rejection the token verifier can produce
//! - `ApiError` for handler responses, rendered as `{"error": message}`

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failure to obtain the provider's key set.
///
/// Cloneable so one refresh result can be handed to every caller that
/// waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwksError {
    /// The HTTP client could not be constructed
    #[error("Failed to create HTTP client: {reason}")]
    Client {
        /// Underlying client error
        reason: String,
    },

    /// Connection, timeout or transport failure
    #[error("Failed to fetch JWKS: {reason}")]
    Request {
        /// Underlying transport error
        reason: String,
    },

    /// The provider answered with a non-success status
    #[error("JWKS fetch failed with status: {status}")]
    Status {
        /// HTTP status code returned by the provider
        status: u16,
    },

    /// The response body is not a JWKS document
    #[error("Failed to parse JWKS: {reason}")]
    Decode {
        /// Underlying decode error
        reason: String,
    },
}

impl From<reqwest::Error> for JwksError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            JwksError::Decode {
                reason: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            JwksError::Status {
                status: status.as_u16(),
            }
        } else {
            JwksError::Request {
                reason: err.to_string(),
            }
        }
    }
}

/// Why a token failed signature or claim validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimFailure {
    /// `exp` is in the past
    #[error("Signature has expired")]
    Expired,

    /// `nbf` is in the future
    #[error("Token is not yet valid")]
    NotYetValid,

    /// `iss` does not equal the configured issuer
    #[error("Invalid issuer")]
    InvalidIssuer,

    /// `aud` does not contain the configured audience
    #[error("Invalid audience")]
    InvalidAudience,

    /// Signature does not verify against the selected key
    #[error("Signature verification failed")]
    InvalidSignature,

    /// Header `alg` is not RS256
    #[error("The specified alg value is not allowed")]
    AlgorithmMismatch,

    /// A required claim is absent
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    /// The selected JWK cannot be used as an RS256 verification key
    #[error("Unusable signing key: {reason}")]
    UnusableKey {
        /// Why the key was refused
        reason: String,
    },

    /// `at_hash` does not match the access token
    #[error("at_hash claim does not match access_token")]
    AtHashMismatch,

    /// `at_hash` is present but no access token was supplied
    #[error("No access_token provided to compare against at_hash claim")]
    AccessTokenRequired,

    /// The payload could not be decoded
    #[error("Invalid payload: {reason}")]
    MalformedPayload {
        /// Underlying decode error
        reason: String,
    },
}

impl From<jsonwebtoken::errors::Error> for ClaimFailure {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => ClaimFailure::Expired,
            ErrorKind::ImmatureSignature => ClaimFailure::NotYetValid,
            ErrorKind::InvalidIssuer => ClaimFailure::InvalidIssuer,
            ErrorKind::InvalidAudience => ClaimFailure::InvalidAudience,
            ErrorKind::InvalidSignature => ClaimFailure::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                ClaimFailure::AlgorithmMismatch
            }
            ErrorKind::MissingRequiredClaim(claim) => ClaimFailure::MissingClaim(claim.clone()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat | ErrorKind::RsaFailedSigning => {
                ClaimFailure::UnusableKey {
                    reason: err.to_string(),
                }
            }
            _ => ClaimFailure::MalformedPayload {
                reason: err.to_string(),
            },
        }
    }
}

/// Rejection produced by the token verifier.
///
/// Every variant is an expected outcome surfaced as HTTP 401.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Header absent or not a bearer credential
    #[error("Missing or invalid Authorization header")]
    MalformedHeader,

    /// Token header segment could not be parsed
    #[error("Malformed token: {reason}")]
    MalformedToken {
        /// Description of the malformation
        reason: String,
    },

    /// The provider's key set could not be obtained
    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(#[from] JwksError),

    /// No published key carries the token's `kid`
    #[error("JWKS key not found for kid")]
    KeyNotFound {
        /// The `kid` from the token header
        kid: String,
    },

    /// Signature, time validity, issuer, audience or at_hash check failed
    #[error("{0}")]
    SignatureOrClaimInvalid(#[from] ClaimFailure),
}

impl AuthError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedHeader => ErrorCode::MalformedHeader,
            Self::MalformedToken { .. } => ErrorCode::MalformedToken,
            Self::KeySetUnavailable(_) => ErrorCode::KeySetUnavailable,
            Self::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            Self::SignatureOrClaimInvalid(_) => ErrorCode::TokenInvalid,
        }
    }
}

/// Error codes for logs and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedHeader,
    MalformedToken,
    KeySetUnavailable,
    KeyNotFound,
    TokenInvalid,
    BadRequest,
    NotFound,
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedHeader => "AUTH_HEADER_MALFORMED",
            Self::MalformedToken => "AUTH_TOKEN_MALFORMED",
            Self::KeySetUnavailable => "AUTH_KEYSET_UNAVAILABLE",
            Self::KeyNotFound => "AUTH_KEY_NOT_FOUND",
            Self::TokenInvalid => "AUTH_TOKEN_INVALID",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MalformedHeader
            | Self::MalformedToken
            | Self::KeySetUnavailable
            | Self::KeyNotFound
            | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Handler-level error rendered as `{"error": message}`.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bearer token rejected
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// Request body is missing required data
    #[error("{0}")]
    BadRequest(String),

    /// Resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// Storage, file or data failure
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthorized(err) => err.code(),
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        if code == ErrorCode::Internal {
            tracing::error!(error_code = code.as_str(), error = %self, "Request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (code.http_status(), Json(body)).into_response()
    }
}
