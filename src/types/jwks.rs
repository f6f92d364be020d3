use crate::http_utils::{
    check_content_type, HttpRequest, HttpResponse, MIME_TYPE_JSON, MIME_TYPE_JWKS,
};
use crate::key_store::KeyFetchError;
use crate::types::jwk::{JsonCurveType, JsonWebKey, JsonWebKeyId, JsonWebKeyUse};
use crate::types::SigningAlgorithm;

use http::header::{HeaderValue, ACCEPT};
use http::{Method, StatusCode};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, VecSkipError};

use std::sync::Arc;

/// JSON Web Key Set.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct JsonWebKeySet {
    // Ignores invalid keys rather than failing. That way, clients can function using the keys that
    // they do understand, which is fine if they only ever get JWTs signed with those keys.
    #[serde_as(as = "VecSkipError<_>")]
    keys: Vec<JsonWebKey>,
}

/// Checks whether a JWK key can be used with a given signing algorithm.
pub(crate) fn check_key_compatibility(
    key: &JsonWebKey,
    signing_algorithm: SigningAlgorithm,
) -> Result<(), &'static str> {
    // if this key isn't suitable for signing
    match key.key_use() {
        Some(use_) if !use_.allows_signature() => {
            return Err("key usage not permitted for digital signatures");
        }
        Some(JsonWebKeyUse::Other(use_)) => {
            debug!("treating key with unregistered use `{}` as a signing key", use_)
        }
        _ => {}
    }

    // if this key doesn't have the right key type
    if signing_algorithm.key_type() != *key.key_type() {
        return Err("key type does not match signature algorithm");
    }

    let expected_curve = match signing_algorithm {
        SigningAlgorithm::Es256 => Some(JsonCurveType::P256),
        SigningAlgorithm::Es384 => Some(JsonCurveType::P384),
        SigningAlgorithm::Es512 => Some(JsonCurveType::P521),
        SigningAlgorithm::EdDsa => Some(JsonCurveType::Ed25519),
        _ => None,
    };
    if expected_curve.is_some() && key.curve() != expected_curve.as_ref() {
        return Err("key uses different curve than signature algorithm");
    }

    // Only a recognized signing algorithm restricts the key. Some providers publish
    // non-registered values (e.g., `Ed25519`) that carry no information beyond the key type.
    match key.algorithm().map(str::parse::<SigningAlgorithm>) {
        Some(Ok(key_alg)) if key_alg != signing_algorithm => Err("incompatible key algorithm"),
        _ => Ok(()),
    }
}

impl JsonWebKeySet {
    /// Create a new JSON Web Key Set.
    pub fn new(keys: Vec<JsonWebKey>) -> Self {
        Self { keys }
    }

    /// Return the keys in this JSON Web Key Set.
    pub fn keys(&self) -> &Vec<JsonWebKey> {
        &self.keys
    }

    /// Return a list of suitable keys, given a key id and signature algorithm.
    pub(crate) fn filter_keys(
        &self,
        key_id: Option<&JsonWebKeyId>,
        signature_alg: SigningAlgorithm,
    ) -> Vec<&JsonWebKey> {
        self.keys
            .iter()
            .filter(|key|
                // Either no 'kid' is being matched (in which case any 'kid' is acceptable), or
                // the 'kid' matches the key's ID.
                if key_id.is_some() && key_id != key.key_id() {
                    false
                } else {
                    check_key_compatibility(key, signature_alg).is_ok()
                }
            )
            .collect()
    }

    /// Selects the single key able to verify a token with the given `kid` header (empty when the
    /// token carries none) and algorithm.
    ///
    /// Keys are matched by ID first. When the token has no `kid`, or the set doesn't assign IDs to
    /// any of its keys, the key is selected by algorithm alone, which requires exactly one
    /// compatible key.
    pub fn select_key(
        &self,
        key_id: &str,
        signature_alg: SigningAlgorithm,
    ) -> Result<&JsonWebKey, &'static str> {
        let key_id = Some(JsonWebKeyId::new(key_id.to_string())).filter(|kid| !kid.is_empty());
        let set_has_key_ids = self.keys.iter().any(|key| key.key_id().is_some());

        let candidates = if key_id.is_some() && set_has_key_ids {
            self.filter_keys(key_id.as_ref(), signature_alg)
        } else {
            self.filter_keys(None, signature_alg)
        };

        match candidates.as_slice() {
            [key] => Ok(*key),
            [] if key_id.is_some() && set_has_key_ids => {
                Err("no compatible key with matching key ID")
            }
            [] => Err("no key compatible with signature algorithm"),
            _ if key_id.is_some() && set_has_key_ids => {
                Err("ambiguous key identification: multiple keys share the key ID")
            }
            _ => Err(
                "ambiguous key identification: multiple keys compatible with signature algorithm",
            ),
        }
    }

    pub(crate) fn fetch_request(url: &url::Url) -> Result<HttpRequest, http::Error> {
        http::Request::builder()
            .uri(url.to_string())
            .method(Method::GET)
            .header(ACCEPT, HeaderValue::from_static(MIME_TYPE_JSON))
            .body(Vec::new())
    }

    pub(crate) fn fetch_response(http_response: HttpResponse) -> Result<Self, KeyFetchError> {
        if http_response.status() != StatusCode::OK {
            return Err(KeyFetchError::Response(
                http_response.status(),
                http_response.body().to_owned(),
                format!("HTTP status code {}", http_response.status()),
            ));
        }

        // Many providers serve key sets as `text/plain`; the body decides.
        if let Err(err_msg) = check_content_type(http_response.headers(), MIME_TYPE_JSON)
            .or_else(|err| {
                check_content_type(http_response.headers(), MIME_TYPE_JWKS).map_err(|_| err)
            })
        {
            debug!("parsing JSON Web Key Set despite content type: {}", err_msg);
        }

        serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(
            http_response.body(),
        ))
        .map_err(|err| KeyFetchError::Parse(Arc::new(err)))
    }
}
