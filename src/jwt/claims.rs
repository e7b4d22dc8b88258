use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `aud` as issued: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

/// Token payload. Registered claims are optional here; presence and
/// values are enforced during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl Claims {
    pub fn has_realm_role(&self, role: &str) -> bool {
        self.realm_access
            .as_ref()
            .and_then(|access| access.get("roles"))
            .and_then(Value::as_array)
            .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some(role)))
    }
}

/// Claim set that passed signature, issuer, audience and time checks.
///
/// Only the token verifier constructs this type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedClaims(Claims);

impl ValidatedClaims {
    pub(crate) fn new(claims: Claims) -> Self {
        Self(claims)
    }

    pub fn claims(&self) -> &Claims {
        &self.0
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.sub.as_deref()
    }

    pub fn issuer(&self) -> Option<&str> {
        self.0.iss.as_deref()
    }

    pub fn preferred_username(&self) -> Option<&str> {
        self.0.preferred_username.as_deref()
    }
}
