//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use app_backend::jwt::{JwksCache, JwksCacheConfig, TokenVerifier, ValidationPolicy};
use app_backend::store::{NewStudent, Student, StudentPatch, StudentStore, StoreError};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ISSUER: &str = "http://keycloak.test/realms/master";
pub const AUDIENCE: &str = "myapp";
pub const JWKS_ENDPOINT: &str = "/realms/master/protocol/openid-connect/certs";

pub const PRIMARY_KID: &str = "primary-key";
pub const SECONDARY_KID: &str = "secondary-key";

pub const PRIMARY_PEM: &str = include_str!("../fixtures/primary.pem");
pub const SECONDARY_PEM: &str = include_str!("../fixtures/secondary.pem");
const PRIMARY_JWK: &str = include_str!("../fixtures/primary.jwk.json");
const SECONDARY_JWK: &str = include_str!("../fixtures/secondary.jwk.json");

pub fn primary_jwk() -> Value {
    serde_json::from_str(PRIMARY_JWK).unwrap()
}

pub fn secondary_jwk() -> Value {
    serde_json::from_str(SECONDARY_JWK).unwrap()
}

pub fn jwks_body(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims of a typical Keycloak access token for `alice`.
pub fn default_claims() -> Value {
    json!({
        "sub": "user-123",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now() + 3600,
        "iat": now(),
        "preferred_username": "alice",
        "realm_access": {"roles": ["student"]}
    })
}

/// Signs `claims` with RS256 under `kid`.
pub fn mint(kid: Option<&str>, pem: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// A valid token signed by the primary key.
pub fn primary_token(claims: &Value) -> String {
    mint(Some(PRIMARY_KID), PRIMARY_PEM, claims)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Identity provider that publishes `keys`, expecting `expected_fetches`
/// requests if given.
pub async fn jwks_server(keys: &[Value], expected_fetches: Option<u64>) -> MockServer {
    let server = MockServer::start().await;
    let mock = Mock::given(method("GET"))
        .and(path(JWKS_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(keys)));
    let mock = match expected_fetches {
        Some(n) => mock.expect(n),
        None => mock,
    };
    mock.mount(&server).await;
    server
}

pub fn jwks_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}{JWKS_ENDPOINT}", server.uri())).unwrap()
}

pub fn cache_for(server: &MockServer) -> JwksCache {
    JwksCache::new(cache_config(server)).unwrap()
}

pub fn cache_config(server: &MockServer) -> JwksCacheConfig {
    JwksCacheConfig::new(jwks_url(server)).with_fetch_timeout(Duration::from_secs(2))
}

pub fn policy() -> ValidationPolicy {
    ValidationPolicy::new(ISSUER, AUDIENCE)
}

pub fn verifier_for(server: &MockServer) -> TokenVerifier {
    TokenVerifier::new(Arc::new(cache_for(server)), policy())
}

/// Nothing listens on port 1.
pub fn unreachable_cache() -> JwksCache {
    let config = JwksCacheConfig::new(Url::parse("http://127.0.0.1:1/certs").unwrap())
        .with_fetch_timeout(Duration::from_secs(1));
    JwksCache::new(config).unwrap()
}

/// Student store kept in memory.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<Student>>,
}

impl InMemoryStore {
    pub async fn with_rows(rows: Vec<Student>) -> Self {
        let store = Self::default();
        *store.rows.lock().await = rows;
        store
    }
}

#[async_trait]
impl StudentStore for InMemoryStore {
    async fn create(&self, new: NewStudent) -> Result<Student, StoreError> {
        let mut rows = self.rows.lock().await;
        let id = rows.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let student = Student {
            id,
            student_id: Some(new.student_id),
            fullname: Some(new.fullname),
            dob: new.dob,
            major: new.major,
        };
        rows.push(student.clone());
        Ok(student)
    }

    async fn list(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self.rows.lock().await.clone())
    }

    async fn get(&self, id: i32) -> Result<Option<Student>, StoreError> {
        Ok(self.rows.lock().await.iter().find(|s| s.id == id).cloned())
    }

    async fn update(&self, id: i32, patch: StudentPatch) -> Result<Option<Student>, StoreError> {
        let mut rows = self.rows.lock().await;
        Ok(rows.iter_mut().find(|s| s.id == id).map(|student| {
            patch.apply(student);
            student.clone()
        }))
    }

    async fn delete(&self, id: i32) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|s| s.id != id);
        Ok(rows.len() != before)
    }
}

/// Store whose every call fails like an exhausted pool.
pub struct FailingStore;

#[async_trait]
impl StudentStore for FailingStore {
    async fn create(&self, _new: NewStudent) -> Result<Student, StoreError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn list(&self) -> Result<Vec<Student>, StoreError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn get(&self, _id: i32) -> Result<Option<Student>, StoreError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn update(&self, _id: i32, _patch: StudentPatch) -> Result<Option<Student>, StoreError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }

    async fn delete(&self, _id: i32) -> Result<bool, StoreError> {
        Err(sqlx::Error::PoolTimedOut.into())
    }
}
