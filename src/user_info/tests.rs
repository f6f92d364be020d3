use crate::context::OidcContext;
use crate::discovery::{Provider, ProviderConfig};
use crate::http_utils::{HttpClientError, HttpRequest, HttpResponse};
use crate::jwt::tests::{sign_rsa, Es256Signer};
use crate::types::jwks::JsonWebKeySet;
use crate::types::SigningAlgorithm;
use crate::user_info::{fetch_user_info, TokenSourceError, UserInfo, UserInfoError};
use crate::verification::SignatureVerificationError;

use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::StatusCode;
use oauth2::AccessToken;
use pretty_assertions::assert_eq;
use serde::Deserialize;

const USER_INFO_URL: &str = "https://example.com/userinfo";
const JWKS_URL: &str = "https://example.com/keys";
const CLAIMS: &str = r#"{
    "sub": "alice",
    "profile": "https://example.com/alice",
    "email": "alice@example.com",
    "email_verified": "true",
    "locale": "en-US"
}"#;

/// Provider with user info served as `content_type` with the given body, and key set holding
/// the public key of `signer`.
fn mock_provider(
    signer: &Es256Signer,
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> (OidcContext, Provider) {
    let keys = serde_json::to_vec(&JsonWebKeySet::new(vec![signer.public_key()]))
        .expect("failed to serialize keys");
    let ctx = OidcContext::new().set_http_client(
        move |request: HttpRequest| -> Result<HttpResponse, HttpClientError> {
            match request.uri().to_string().as_str() {
                JWKS_URL => Ok(http::Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "application/json")
                    .body(keys.clone())
                    .unwrap()),
                USER_INFO_URL => {
                    assert_eq!(
                        request.headers().get(AUTHORIZATION),
                        Some(&HeaderValue::from_static("Bearer the-access-token"))
                    );
                    Ok(http::Response::builder()
                        .status(status)
                        .header(CONTENT_TYPE, content_type)
                        .body(body.clone().into_bytes())
                        .unwrap())
                }
                other => panic!("unexpected request to {}", other),
            }
        },
    );

    let provider = ProviderConfig {
        issuer: "https://example.com".to_string(),
        userinfo_endpoint: Some(USER_INFO_URL.to_string()),
        jwks_uri: JWKS_URL.to_string(),
        id_token_signing_alg_values_supported: vec!["ES256".to_string()],
        ..Default::default()
    }
    .new_provider(&ctx)
    .expect("failed to create provider");
    (ctx, provider)
}

fn access_token() -> AccessToken {
    AccessToken::new("the-access-token".to_string())
}

fn assert_standard_claims(user_info: &UserInfo) {
    assert_eq!(user_info.subject(), "alice");
    assert_eq!(user_info.profile(), Some("https://example.com/alice"));
    assert_eq!(user_info.email(), Some("alice@example.com"));
    assert_eq!(user_info.email_verified(), Some(true));
}

#[tokio::test]
async fn test_json_user_info() {
    let signer = Es256Signer::generate(None);
    for content_type in ["application/json", "application/json; charset=utf-8"] {
        let (ctx, provider) =
            mock_provider(&signer, StatusCode::OK, content_type, CLAIMS.to_string());
        let user_info = provider
            .user_info(&ctx, &access_token())
            .await
            .expect("failed to fetch user info");
        assert_standard_claims(&user_info);
        assert_eq!(user_info.raw_claims(), CLAIMS.as_bytes());
    }
}

#[tokio::test]
async fn test_signed_user_info() {
    let signer = Es256Signer::generate(Some("key-1"));
    let raw_token = signer.sign(CLAIMS);

    for content_type in ["application/jwt", "application/jwt; charset=utf-8"] {
        let (ctx, provider) =
            mock_provider(&signer, StatusCode::OK, content_type, format!("{}\n", raw_token));
        let user_info = provider
            .user_info(&ctx, &access_token())
            .await
            .expect("failed to fetch user info");
        assert_standard_claims(&user_info);
        // The verified payload, not the compact token.
        assert_eq!(user_info.raw_claims(), CLAIMS.as_bytes());
    }
}

#[tokio::test]
async fn test_signed_user_info_rejected() {
    let signer = Es256Signer::generate(None);

    // Signed by a key outside the provider's key set.
    let other_signer = Es256Signer::generate(None);
    let (ctx, provider) = mock_provider(
        &signer,
        StatusCode::OK,
        "application/jwt",
        other_signer.sign(CLAIMS),
    );
    match provider.user_info(&ctx, &access_token()).await {
        Err(UserInfoError::SignatureVerification(
            SignatureVerificationError::SignatureInvalid(_),
        )) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    // The provider only advertises ES256.
    let (ctx, provider) = mock_provider(
        &signer,
        StatusCode::OK,
        "application/jwt",
        sign_rsa(SigningAlgorithm::Rs256, None, CLAIMS),
    );
    match provider.user_info(&ctx, &access_token()).await {
        Err(UserInfoError::SignatureVerification(
            SignatureVerificationError::UnsupportedAlgorithm(_),
        )) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    // Served as a JWT, but not one.
    let (ctx, provider) = mock_provider(
        &signer,
        StatusCode::OK,
        "application/jwt",
        CLAIMS.to_string(),
    );
    match provider.user_info(&ctx, &access_token()).await {
        Err(UserInfoError::SignatureVerification(SignatureVerificationError::Malformed(_))) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_subject_mismatch() {
    let signer = Es256Signer::generate(None);
    let (ctx, provider) = mock_provider(
        &signer,
        StatusCode::OK,
        "application/json",
        CLAIMS.to_string(),
    );

    fetch_user_info(&ctx, &provider, &access_token(), Some("alice"))
        .await
        .expect("failed to fetch user info");

    match fetch_user_info(&ctx, &provider, &access_token(), Some("bob")).await {
        Err(UserInfoError::SubjectMismatch(msg)) => {
            assert_eq!(msg, "expected `bob` (found `alice`)")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_error_responses() {
    let signer = Es256Signer::generate(None);
    let (ctx, provider) = mock_provider(
        &signer,
        StatusCode::UNAUTHORIZED,
        "application/json",
        r#"{"error":"invalid_token"}"#.to_string(),
    );
    match provider.user_info(&ctx, &access_token()).await {
        Err(UserInfoError::Response(status, body)) => {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, r#"{"error":"invalid_token"}"#);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let (ctx, provider) = mock_provider(
        &signer,
        StatusCode::OK,
        "application/json",
        r#"{"email":"alice@example.com"}"#.to_string(),
    );
    match provider.user_info(&ctx, &access_token()).await {
        Err(UserInfoError::Parse(_)) => {}
        other => panic!("unexpected result: {:?}", other),
    }

    let (ctx, provider) = mock_provider(
        &signer,
        StatusCode::OK,
        "application/json",
        r#"{"sub":"alice","email_verified":"yes"}"#.to_string(),
    );
    match provider.user_info(&ctx, &access_token()).await {
        Err(UserInfoError::Parse(err)) => assert_eq!(err.path().to_string(), "email_verified"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_no_user_info_endpoint() {
    let ctx = OidcContext::new().set_http_client(
        |_: HttpRequest| -> Result<HttpResponse, HttpClientError> {
            panic!("no request expected")
        },
    );
    let provider = ProviderConfig {
        issuer: "https://example.com".to_string(),
        jwks_uri: JWKS_URL.to_string(),
        ..Default::default()
    }
    .new_provider(&ctx)
    .expect("failed to create provider");

    assert_eq!(provider.userinfo_endpoint(), None);
    match provider.user_info(&ctx, &access_token()).await {
        Err(UserInfoError::NoUserInfoEndpoint) => {}
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_token_source() {
    let signer = Es256Signer::generate(None);
    let (ctx, provider) = mock_provider(
        &signer,
        StatusCode::OK,
        "application/json",
        CLAIMS.to_string(),
    );

    let refreshing_source = || -> Result<AccessToken, TokenSourceError> { Ok(access_token()) };
    provider
        .user_info(&ctx, &refreshing_source)
        .await
        .expect("failed to fetch user info");

    let failing_source =
        || -> Result<AccessToken, TokenSourceError> { Err("refresh token revoked".into()) };
    match provider.user_info(&ctx, &failing_source).await {
        Err(UserInfoError::TokenSource(err)) => {
            assert_eq!(err.to_string(), "refresh token revoked")
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_user_info_claims() {
    #[derive(Deserialize)]
    struct LocaleClaims {
        locale: String,
    }

    let user_info =
        UserInfo::from_raw_claims(CLAIMS.as_bytes().to_vec()).expect("failed to parse claims");
    assert_standard_claims(&user_info);
    assert_eq!(
        user_info
            .claims::<LocaleClaims>()
            .expect("failed to decode")
            .locale,
        "en-US"
    );

    let user_info = UserInfo::from_raw_claims(br#"{"sub":"bob","email_verified":false}"#.to_vec())
        .expect("failed to parse claims");
    assert_eq!(user_info.email_verified(), Some(false));
    assert_eq!(user_info.email(), None);

    let user_info = UserInfo::from_raw_claims(br#"{"sub":"bob","email_verified":null}"#.to_vec())
        .expect("failed to parse claims");
    assert_eq!(user_info.email_verified(), None);
}
