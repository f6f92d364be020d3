use crate::context::OidcContext;
use crate::jwt::tests::{sign_rsa, test_rsa_key_set, Es256Signer, TEST_JWT, TEST_KEY_ID};
use crate::key_store::{KeyError, StaticKeySet};
use crate::types::jwks::JsonWebKeySet;
use crate::types::{Nonce, SigningAlgorithm, UnsupportedAlgorithm};
use crate::verification::{
    ClaimsVerificationError, IdTokenVerifier, SignatureVerificationError, VerificationConfig,
};

use chrono::{Duration, TimeZone, Utc};
use oauth2::ClientId;
use pretty_assertions::assert_eq;
use serde_json::json;

use std::sync::Arc;

const ISSUER: &str = "https://example.com";
const CLIENT_ID: &str = "my_client";
// 2017-07-14T02:40:00Z
const NOW: i64 = 1_500_000_000;

fn config() -> VerificationConfig {
    VerificationConfig::new(ClientId::new(CLIENT_ID.to_string()))
        .set_time_fn(|| Utc.timestamp_opt(NOW, 0).unwrap())
}

fn verifier(config: VerificationConfig) -> IdTokenVerifier {
    IdTokenVerifier::new(ISSUER, Arc::new(test_rsa_key_set()), config)
}

fn claims() -> serde_json::Value {
    json!({
        "iss": ISSUER,
        "sub": "alice",
        "aud": CLIENT_ID,
        "exp": NOW + 60,
        "iat": NOW - 60,
    })
}

fn with(mut claims: serde_json::Value, name: &str, value: serde_json::Value) -> serde_json::Value {
    claims[name] = value;
    claims
}

fn without(mut claims: serde_json::Value, name: &str) -> serde_json::Value {
    claims
        .as_object_mut()
        .expect("claims must be an object")
        .remove(name);
    claims
}

fn sign(claims: &serde_json::Value) -> String {
    sign_rsa(SigningAlgorithm::Rs256, Some(TEST_KEY_ID), &claims.to_string())
}

async fn verify(
    config: VerificationConfig,
    claims: &serde_json::Value,
) -> Result<crate::IdToken, ClaimsVerificationError> {
    verifier(config).verify(&OidcContext::new(), &sign(claims)).await
}

#[tokio::test]
async fn test_verify_success() {
    let id_token = verify(config(), &claims())
        .await
        .expect("verification failed");
    assert_eq!(id_token.issuer(), ISSUER);
    assert_eq!(id_token.subject(), "alice");
    assert_eq!(id_token.audiences().to_vec(), vec![CLIENT_ID.to_string()]);
    assert_eq!(
        id_token.expiration(),
        Some(Utc.timestamp_opt(NOW + 60, 0).unwrap())
    );
    assert_eq!(id_token.signing_alg(), SigningAlgorithm::Rs256);
}

#[tokio::test]
async fn test_default_algorithms() {
    let verifier = verifier(config());
    assert_eq!(verifier.allowed_algs(), &[SigningAlgorithm::Rs256]);
    assert_eq!(verifier.expected_issuer(), ISSUER);

    let verifier = IdTokenVerifier::new_with_provider_algs(
        ISSUER,
        Arc::new(test_rsa_key_set()),
        &[SigningAlgorithm::Es256, SigningAlgorithm::Rs256],
        config(),
    );
    assert_eq!(
        verifier.allowed_algs(),
        &[SigningAlgorithm::Es256, SigningAlgorithm::Rs256]
    );

    // An explicit configuration overrides the provider's list.
    let verifier = IdTokenVerifier::new_with_provider_algs(
        ISSUER,
        Arc::new(test_rsa_key_set()),
        &[SigningAlgorithm::Es256, SigningAlgorithm::Rs256],
        config().set_allowed_algs([SigningAlgorithm::Ps256]),
    );
    assert_eq!(verifier.allowed_algs(), &[SigningAlgorithm::Ps256]);
}

#[tokio::test]
async fn test_signature_checked_first() {
    // Wrong issuer, audience, expiration and nonce, but signed with a disallowed algorithm.
    let claims = json!({ "iss": "https://attacker.example.com", "aud": "someone-else", "exp": 0 });
    let raw_token = sign_rsa(
        SigningAlgorithm::Rs384,
        Some(TEST_KEY_ID),
        &claims.to_string(),
    );
    match verifier(config().set_nonce(Nonce::new_random()))
        .verify(&OidcContext::new(), &raw_token)
        .await
    {
        Err(ClaimsVerificationError::SignatureVerification(
            SignatureVerificationError::UnsupportedAlgorithm(UnsupportedAlgorithm(alg)),
        )) => assert_eq!(alg, "RS384"),
        other => panic!("unexpected result: {:?}", other),
    }

    // Unknown key.
    let raw_token = sign_rsa(SigningAlgorithm::Rs256, Some("frodo"), &claims.to_string());
    match verifier(config())
        .verify(&OidcContext::new(), &raw_token)
        .await
    {
        Err(ClaimsVerificationError::SignatureVerification(SignatureVerificationError::Key(
            KeyError::NotFound(_),
        ))) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_unsigned_token_rejected() {
    let raw_token = format!(
        "{}.{}.",
        crate::helpers::base64_url_encode(r#"{"alg":"none"}"#),
        crate::helpers::base64_url_encode(claims().to_string())
    );
    let verifier = verifier(config().set_allowed_algs(SigningAlgorithm::ALL));
    match verifier.verify(&OidcContext::new(), &raw_token).await {
        Err(ClaimsVerificationError::SignatureVerification(
            SignatureVerificationError::UnsupportedAlgorithm(_),
        )) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_issuer() {
    match verify(config(), &with(claims(), "iss", json!("https://other.com"))).await {
        Err(ClaimsVerificationError::IssuerMismatch(msg)) => assert_eq!(
            msg,
            "expected `https://example.com` (found `https://other.com`)"
        ),
        other => panic!("unexpected result: {:?}", other),
    }

    // No normalization is applied.
    match verify(config(), &with(claims(), "iss", json!("https://example.com/"))).await {
        Err(ClaimsVerificationError::IssuerMismatch(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    match verify(config(), &without(claims(), "iss")).await {
        Err(ClaimsVerificationError::IssuerMismatch(msg)) => {
            assert_eq!(msg, "missing issuer claim")
        }
        other => panic!("unexpected result: {:?}", other),
    }

    verify(
        config().set_skip_issuer_check(true),
        &with(claims(), "iss", json!("https://other.com")),
    )
    .await
    .expect("verification failed");

    verify(
        config().set_insecure_issuer("https://other.com"),
        &with(claims(), "iss", json!("https://other.com")),
    )
    .await
    .expect("verification failed");
}

#[tokio::test]
async fn test_audience() {
    match verify(config(), &with(claims(), "aud", json!(["a", "b"]))).await {
        Err(ClaimsVerificationError::AudienceMismatch(msg)) => assert_eq!(
            msg,
            "must contain `my_client` (found audiences: `a`, `b`)"
        ),
        other => panic!("unexpected result: {:?}", other),
    }

    match verify(config(), &without(claims(), "aud")).await {
        Err(ClaimsVerificationError::AudienceMismatch(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    let id_token = verify(
        config(),
        &with(claims(), "aud", json!(["other_client", CLIENT_ID])),
    )
    .await
    .expect("verification failed");
    assert_eq!(
        id_token.audiences().to_vec(),
        vec!["other_client".to_string(), CLIENT_ID.to_string()]
    );

    verify(
        config().set_skip_client_id_check(true),
        &with(claims(), "aud", json!("other_client")),
    )
    .await
    .expect("verification failed");
}

#[tokio::test]
async fn test_empty_client_id() {
    let empty_config = VerificationConfig::new(ClientId::new(String::new()))
        .set_time_fn(|| Utc.timestamp_opt(NOW, 0).unwrap());

    // Reported before any signature work.
    match verifier(empty_config.clone())
        .verify(&OidcContext::new(), "not-a-jwt")
        .await
    {
        Err(ClaimsVerificationError::InvalidConfiguration(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    verify(empty_config.set_skip_client_id_check(true), &claims())
        .await
        .expect("verification failed");
}

#[tokio::test]
async fn test_expiration() {
    // Within the default clock skew.
    verify(config(), &with(claims(), "exp", json!(NOW - 299)))
        .await
        .expect("verification failed");

    match verify(config(), &with(claims(), "exp", json!(NOW - 300))).await {
        Err(ClaimsVerificationError::TokenExpired(msg)) => {
            assert!(msg.starts_with("ID token expired at"), "{}", msg)
        }
        other => panic!("unexpected result: {:?}", other),
    }

    match verify(
        config().set_clock_skew(Duration::zero()),
        &with(claims(), "exp", json!(NOW)),
    )
    .await
    {
        Err(ClaimsVerificationError::TokenExpired(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    match verify(config(), &without(claims(), "exp")).await {
        Err(ClaimsVerificationError::TokenExpired(msg)) => {
            assert_eq!(msg, "missing expiration claim")
        }
        other => panic!("unexpected result: {:?}", other),
    }

    verify(
        config().set_skip_expiry_check(true),
        &with(claims(), "exp", json!(0)),
    )
    .await
    .expect("verification failed");

    // Fractional timestamps are accepted.
    verify(config(), &with(claims(), "exp", json!(NOW as f64 + 0.5)))
        .await
        .expect("verification failed");

    match verify(config(), &with(claims(), "exp", json!("tomorrow"))).await {
        Err(ClaimsVerificationError::Malformed(err)) => assert_eq!(err.path().to_string(), "exp"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_issue_time() {
    verify(config(), &with(claims(), "iat", json!(NOW + 300)))
        .await
        .expect("verification failed");

    match verify(config(), &with(claims(), "iat", json!(NOW + 301))).await {
        Err(ClaimsVerificationError::IssuedAtInFuture(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    // `iat` is optional.
    verify(config(), &without(claims(), "iat"))
        .await
        .expect("verification failed");
}

#[tokio::test]
async fn test_nonce() {
    let nonce = Nonce::new("the-nonce".to_string());

    verify(
        config().set_nonce(nonce.clone()),
        &with(claims(), "nonce", json!("the-nonce")),
    )
    .await
    .expect("verification failed");

    match verify(
        config().set_nonce(nonce.clone()),
        &with(claims(), "nonce", json!("another-nonce")),
    )
    .await
    {
        Err(ClaimsVerificationError::NonceMismatch(msg)) => assert_eq!(msg, "nonce mismatch"),
        other => panic!("unexpected result: {:?}", other),
    }

    match verify(config().set_nonce(nonce), &claims()).await {
        Err(ClaimsVerificationError::NonceMismatch(msg)) => {
            assert_eq!(msg, "missing nonce claim")
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // Without a configured nonce, the claim is ignored.
    verify(config(), &with(claims(), "nonce", json!("anything")))
        .await
        .expect("verification failed");
}

#[tokio::test]
async fn test_check_order() {
    // Every claim is wrong; the issuer is reported first.
    let bad_claims = json!({
        "iss": "https://other.com",
        "aud": "other_client",
        "exp": NOW - 3600,
        "nonce": "wrong",
    });
    let nonce_config = || config().set_nonce(Nonce::new("the-nonce".to_string()));

    match verify(nonce_config(), &bad_claims).await {
        Err(ClaimsVerificationError::IssuerMismatch(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    match verify(nonce_config().set_skip_issuer_check(true), &bad_claims).await {
        Err(ClaimsVerificationError::AudienceMismatch(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    match verify(
        nonce_config()
            .set_skip_issuer_check(true)
            .set_skip_client_id_check(true),
        &bad_claims,
    )
    .await
    {
        Err(ClaimsVerificationError::TokenExpired(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
    match verify(
        nonce_config()
            .set_skip_issuer_check(true)
            .set_skip_client_id_check(true)
            .set_skip_expiry_check(true),
        &bad_claims,
    )
    .await
    {
        Err(ClaimsVerificationError::NonceMismatch(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_claims() {
    match verify(config(), &with(claims(), "aud", json!(42))).await {
        Err(ClaimsVerificationError::Malformed(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    // The RFC 7520 payload is plain text rather than a JSON object.
    let verifier = verifier(config().set_skip_expiry_check(true));
    match verifier.verify(&OidcContext::new(), TEST_JWT).await {
        Err(ClaimsVerificationError::Malformed(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_es256_verifier() {
    let signer = Es256Signer::generate(Some("ec-key"));
    let verifier = IdTokenVerifier::new(
        ISSUER,
        Arc::new(StaticKeySet::new(JsonWebKeySet::new(vec![
            signer.public_key()
        ]))),
        config().set_allowed_algs([SigningAlgorithm::Es256]),
    );

    let id_token = verifier
        .verify(&OidcContext::new(), &signer.sign(&claims().to_string()))
        .await
        .expect("verification failed");
    assert_eq!(id_token.signing_alg(), SigningAlgorithm::Es256);

    // RS256 isn't accepted once the allow-list has been replaced.
    match verifier.verify(&OidcContext::new(), &sign(&claims())).await {
        Err(ClaimsVerificationError::SignatureVerification(
            SignatureVerificationError::UnsupportedAlgorithm(_),
        )) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}
