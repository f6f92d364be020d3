#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use oidc_rp_core::{JsonCurveType, JsonWebKey, JsonWebKeyId, JsonWebKeySet};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use std::cell::RefCell;
use std::sync::Once;

pub const CLIENT_ID: &str = "integration-client";
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/keys";
pub const USER_INFO_PATH: &str = "/userinfo";

static INIT_LOG: Once = Once::new();

thread_local! {
    static TEST_ID: RefCell<&'static str> = RefCell::new("UNINITIALIZED_TEST_ID");
}

pub fn get_test_id() -> &'static str {
    TEST_ID.with(|id| *id.borrow())
}

#[macro_export]
macro_rules! log_info {
    ($($args:tt)+) => {
        log::info!("[{}] {}", $crate::common::get_test_id(), format!($($args)+))
    }
}

fn _init_log() {
    color_backtrace::install();
    env_logger::init();
}

pub fn init_log(test_id: &'static str) {
    INIT_LOG.call_once(_init_log);
    TEST_ID.with(|id| *id.borrow_mut() = test_id);
}

/// An ES256 key pair standing in for the provider's signing key.
pub struct ProviderKey {
    signing_key: p256::ecdsa::SigningKey,
    key_id: String,
}

impl ProviderKey {
    pub fn generate(key_id: &str) -> Self {
        Self {
            signing_key: p256::ecdsa::SigningKey::random(&mut rand::thread_rng()),
            key_id: key_id.to_string(),
        }
    }

    pub fn public_key(&self) -> JsonWebKey {
        let point = self
            .signing_key
            .verifying_key()
            .as_affine()
            .to_encoded_point(false);
        JsonWebKey::new_ec(
            point.x().expect("missing x coordinate").to_vec(),
            point.y().expect("missing y coordinate").to_vec(),
            JsonCurveType::P256,
            Some(JsonWebKeyId::new(self.key_id.clone())),
        )
    }

    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let header = serde_json::json!({ "alg": "ES256", "typ": "JWT", "kid": self.key_id });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let signature: p256::ecdsa::Signature =
            signature::Signer::sign(&self.signing_key, signing_input.as_bytes());
        format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }
}

/// Discovery document for a provider hosted by `server` that signs ID tokens with ES256.
pub fn discovery_document(server: &MockServer) -> serde_json::Value {
    serde_json::json!({
        "issuer": server.uri(),
        "authorization_endpoint": format!("{}/authorize", server.uri()),
        "token_endpoint": format!("{}/token", server.uri()),
        "userinfo_endpoint": format!("{}{}", server.uri(), USER_INFO_PATH),
        "jwks_uri": format!("{}{}", server.uri(), JWKS_PATH),
        "response_types_supported": ["code"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["ES256"],
    })
}

pub async fn mount_json(server: &MockServer, route: &str, body: &serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.to_string(), "application/json"),
        )
        .mount(server)
        .await;
}

/// Starts a provider publishing `document` and the public half of `key`.
pub async fn start_provider(key: &ProviderKey) -> MockServer {
    let server = MockServer::start().await;
    mount_json(&server, DISCOVERY_PATH, &discovery_document(&server)).await;
    mount_json(
        &server,
        JWKS_PATH,
        &serde_json::to_value(JsonWebKeySet::new(vec![key.public_key()]))
            .expect("failed to serialize key set"),
    )
    .await;
    server
}

pub fn id_token_claims(issuer: &str, subject: &str) -> serde_json::Value {
    let now = chrono::Utc::now().timestamp();
    serde_json::json!({
        "iss": issuer,
        "sub": subject,
        "aud": CLIENT_ID,
        "exp": now + 600,
        "iat": now,
    })
}
