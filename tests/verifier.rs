//! End-to-end bearer token verification.

mod common;

use std::sync::Arc;

use app_backend::jwt::{at_hash_for, TokenVerifier};
use app_backend::observability::Metrics;
use app_backend::{AuthError, ClaimFailure};
use common::*;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

/// Compact token with an arbitrary header and no valid signature.
fn unsigned_token(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

#[tokio::test]
async fn test_valid_token_yields_claims() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let token = primary_token(&default_claims());
    let claims = verifier.verify(Some(&bearer(&token))).await.unwrap();

    assert_eq!(claims.subject(), Some("user-123"));
    assert_eq!(claims.preferred_username(), Some("alice"));
    assert_eq!(claims.issuer(), Some(ISSUER));
    assert!(claims.claims().has_realm_role("student"));
}

#[tokio::test]
async fn test_lowercase_scheme_and_padding_are_accepted() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let token = primary_token(&default_claims());
    let header = format!("bearer   {token}  ");
    assert!(verifier.verify(Some(&header)).await.is_ok());
}

#[tokio::test]
async fn test_basic_credentials_are_malformed_header() {
    let server = jwks_server(&[primary_jwk()], Some(0)).await;
    let verifier = verifier_for(&server);

    assert_eq!(
        verifier.verify(Some("Basic abc123")).await.unwrap_err(),
        AuthError::MalformedHeader
    );
    assert_eq!(verifier.verify(None).await.unwrap_err(), AuthError::MalformedHeader);
}

#[tokio::test]
async fn test_garbage_token_is_malformed() {
    let server = jwks_server(&[primary_jwk()], Some(0)).await;
    let verifier = verifier_for(&server);

    let err = verifier.verify(Some("Bearer not-a-jwt")).await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedToken { .. }));
}

#[tokio::test]
async fn test_whitespace_only_token_is_malformed_token() {
    let server = jwks_server(&[primary_jwk()], Some(0)).await;
    let verifier = verifier_for(&server);

    let err = verifier.verify(Some("Bearer   ")).await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedToken { .. }), "{err:?}");
    assert_eq!(verifier.verify(Some("Bearer ")).await.unwrap_err(), AuthError::MalformedHeader);
}

#[tokio::test]
async fn test_alg_none_with_known_kid_is_algorithm_mismatch() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let token = unsigned_token(&json!({"alg": "none", "kid": PRIMARY_KID}), &default_claims());
    assert_eq!(
        verifier.verify(Some(&bearer(&token))).await.unwrap_err(),
        AuthError::SignatureOrClaimInvalid(ClaimFailure::AlgorithmMismatch)
    );
}

#[tokio::test]
async fn test_unsupported_alg_with_unknown_kid_is_key_not_found() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    for alg in ["none", "RSA-OAEP"] {
        let token = unsigned_token(&json!({"alg": alg, "kid": "rotated"}), &default_claims());
        assert_eq!(
            verifier.verify(Some(&bearer(&token))).await.unwrap_err(),
            AuthError::KeyNotFound {
                kid: "rotated".to_string()
            },
            "alg {alg}"
        );
    }
}

#[tokio::test]
async fn test_token_without_kid_is_malformed() {
    let server = jwks_server(&[primary_jwk()], Some(0)).await;
    let verifier = verifier_for(&server);

    let token = mint(None, PRIMARY_PEM, &default_claims());
    let err = verifier.verify(Some(&bearer(&token))).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::MalformedToken {
            reason: "Missing kid in header".to_string()
        }
    );
}

#[tokio::test]
async fn test_unknown_kid_is_key_not_found_even_if_signature_would_verify() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let token = mint(Some("rotated-key"), PRIMARY_PEM, &default_claims());
    let err = verifier.verify(Some(&bearer(&token))).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::KeyNotFound {
            kid: "rotated-key".to_string()
        }
    );
    assert_eq!(err.to_string(), "JWKS key not found for kid");
}

#[tokio::test]
async fn test_key_is_selected_by_kid() {
    let server = jwks_server(&[primary_jwk(), secondary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let secondary = mint(Some(SECONDARY_KID), SECONDARY_PEM, &default_claims());
    assert!(verifier.verify(Some(&bearer(&secondary))).await.is_ok());

    // Signed by the secondary key but labelled as the primary one.
    let mislabelled = mint(Some(PRIMARY_KID), SECONDARY_PEM, &default_claims());
    assert_eq!(
        verifier.verify(Some(&bearer(&mislabelled))).await.unwrap_err(),
        AuthError::SignatureOrClaimInvalid(ClaimFailure::InvalidSignature)
    );
}

#[tokio::test]
async fn test_wrong_audience_issuer_and_expiry_are_rejected() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let cases = [
        ("aud", json!("other-client"), ClaimFailure::InvalidAudience),
        ("iss", json!("http://evil.test/realms/master"), ClaimFailure::InvalidIssuer),
        ("exp", json!(now() - 3600), ClaimFailure::Expired),
        ("nbf", json!(now() + 3600), ClaimFailure::NotYetValid),
    ];

    for (claim, value, expected) in cases {
        let mut claims = default_claims();
        claims[claim] = value;
        let token = primary_token(&claims);
        assert_eq!(
            verifier.verify(Some(&bearer(&token))).await.unwrap_err(),
            AuthError::SignatureOrClaimInvalid(expected),
            "tampered {claim}"
        );
    }
}

#[tokio::test]
async fn test_audience_array_must_contain_client() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let mut claims = default_claims();
    claims["aud"] = json!(["account", AUDIENCE]);
    assert!(verifier.verify(Some(&bearer(&primary_token(&claims)))).await.is_ok());

    claims["aud"] = json!(["account", "broker"]);
    assert!(verifier.verify(Some(&bearer(&primary_token(&claims)))).await.is_err());
}

#[tokio::test]
async fn test_missing_exp_is_rejected() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let mut claims = default_claims();
    claims.as_object_mut().unwrap().remove("exp");
    assert_eq!(
        verifier.verify(Some(&bearer(&primary_token(&claims)))).await.unwrap_err(),
        AuthError::SignatureOrClaimInvalid(ClaimFailure::MissingClaim("exp".to_string()))
    );
}

#[tokio::test]
async fn test_leeway_tolerates_small_skew() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = TokenVerifier::new(Arc::new(cache_for(&server)), policy().with_leeway(120));

    let mut claims = default_claims();
    claims["exp"] = json!(now() - 30);
    assert!(verifier.verify(Some(&bearer(&primary_token(&claims)))).await.is_ok());
}

#[tokio::test]
async fn test_hmac_token_is_refused() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(PRIMARY_KID.to_string());
    let token = encode(&header, &default_claims(), &EncodingKey::from_secret(b"secret")).unwrap();

    assert_eq!(
        verifier.verify(Some(&bearer(&token))).await.unwrap_err(),
        AuthError::SignatureOrClaimInvalid(ClaimFailure::AlgorithmMismatch)
    );
}

#[tokio::test]
async fn test_provider_down_is_keyset_unavailable() {
    let verifier = TokenVerifier::new(Arc::new(unreachable_cache()), policy());

    let token = primary_token(&default_claims());
    let err = verifier.verify(Some(&bearer(&token))).await.unwrap_err();
    assert!(matches!(err, AuthError::KeySetUnavailable(_)));
}

#[tokio::test]
async fn test_verification_is_idempotent() {
    let server = jwks_server(&[primary_jwk()], Some(1)).await;
    let verifier = verifier_for(&server);

    let header = bearer(&primary_token(&default_claims()));
    let first = verifier.verify(Some(&header)).await.unwrap();
    let second = verifier.verify(Some(&header)).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_at_hash_ignored_unless_enabled() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = verifier_for(&server);

    let mut claims = default_claims();
    claims["at_hash"] = json!("does-not-match-anything");
    assert!(verifier.verify(Some(&bearer(&primary_token(&claims)))).await.is_ok());
}

#[tokio::test]
async fn test_at_hash_checked_when_enabled() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let verifier = TokenVerifier::new(
        Arc::new(cache_for(&server)),
        policy().with_at_hash_verification(true),
    );

    let mut claims = default_claims();
    claims["at_hash"] = json!(at_hash_for("access-token-123"));
    let header = bearer(&primary_token(&claims));

    assert!(verifier
        .verify_with_access_token(Some(&header), Some("access-token-123"))
        .await
        .is_ok());
    assert_eq!(
        verifier
            .verify_with_access_token(Some(&header), Some("another-token"))
            .await
            .unwrap_err(),
        AuthError::SignatureOrClaimInvalid(ClaimFailure::AtHashMismatch)
    );
    assert_eq!(
        verifier.verify(Some(&header)).await.unwrap_err(),
        AuthError::SignatureOrClaimInvalid(ClaimFailure::AccessTokenRequired)
    );

    // Tokens without at_hash need no access token.
    let plain = bearer(&primary_token(&default_claims()));
    assert!(verifier.verify(Some(&plain)).await.is_ok());
}

#[tokio::test]
async fn test_outcomes_are_counted() {
    let server = jwks_server(&[primary_jwk()], None).await;
    let metrics = Arc::new(Metrics::new().unwrap());
    let verifier = verifier_for(&server).with_metrics(Arc::clone(&metrics));

    let token = primary_token(&default_claims());
    verifier.verify(Some(&bearer(&token))).await.unwrap();
    verifier.verify(Some("Basic abc123")).await.unwrap_err();

    assert_eq!(metrics.token_verifications.with_label_values(&["success"]).get(), 1);
    assert_eq!(
        metrics
            .token_verifications
            .with_label_values(&["AUTH_HEADER_MALFORMED"])
            .get(),
        1
    );
}
