//! Claim projection for protected responses.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::jwt::claims::ValidatedClaims;

/// Which claims a protected endpoint echoes back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClaimProjection {
    /// `message`, `sub`, `preferred_username`
    Minimal,
    /// Minimal plus `realm_access`, `aud`, `iss`
    #[default]
    Extended,
}

impl ClaimProjection {
    /// Builds the response body. Absent claims are rendered as `null`.
    pub fn project(&self, claims: &ValidatedClaims, message: &str) -> Value {
        let inner = claims.claims();
        let mut body = json!({
            "message": message,
            "sub": inner.sub,
            "preferred_username": inner.preferred_username,
        });

        if *self == Self::Extended {
            body["realm_access"] = json!(inner.realm_access);
            body["aud"] = json!(inner.aud);
            body["iss"] = json!(inner.iss);
        }

        body
    }
}

impl FromStr for ClaimProjection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "extended" => Ok(Self::Extended),
            other => Err(format!("unknown claim projection '{other}'")),
        }
    }
}

impl fmt::Display for ClaimProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => f.write_str("minimal"),
            Self::Extended => f.write_str("extended"),
        }
    }
}
