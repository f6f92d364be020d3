use crate::claims::{decode_claims, ClaimsDecodeError};
use crate::context::{Cancelled, OidcContext};
use crate::http_utils::{
    check_content_type, HttpClient, HttpClientError, HttpRequest, HttpResponse, MIME_TYPE_JSON,
};
use crate::key_store::RemoteKeySet;
use crate::types::SigningAlgorithm;
use crate::user_info::{fetch_user_info, TokenSource, UserInfo, UserInfoError};
use crate::verification::{IdTokenVerifier, VerificationConfig};

use http::header::{HeaderValue, ACCEPT};
use http::{Method, StatusCode};
use log::{debug, warn};
use oauth2::{AuthUrl, DeviceAuthorizationUrl, TokenUrl};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::sync::Arc;


const CONFIG_URL_SUFFIX: &str = "/.well-known/openid-configuration";

// Used when a provider doesn't advertise any algorithm this crate recognizes.
const DEFAULT_SIGNING_ALGS: &[SigningAlgorithm] = &[SigningAlgorithm::Rs256];

/// Error retrieving provider metadata.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The request was abandoned before completing.
    #[error("Discovery cancelled")]
    Cancelled(#[from] Cancelled),
    /// An unexpected error occurred.
    #[error("Other error: {0}")]
    Other(String),
    /// Failed to parse server response.
    #[error("Failed to parse server response")]
    Parse(#[source] serde_path_to_error::Error<serde_json::Error>),
    /// An error occurred while sending the request or receiving the response (e.g., network
    /// connectivity failed).
    #[error("Request failed")]
    Request(#[source] HttpClientError),
    /// Server returned an invalid response.
    #[error("Server returned invalid response: {2}")]
    Response(StatusCode, Vec<u8>, String),
    /// Failed to parse a URL from the issuer or the provider metadata.
    #[error("Failed to parse URL")]
    UrlParse(#[source] url::ParseError),
    /// Failed to validate provider metadata.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Provider metadata as published at `/.well-known/openid-configuration`, or supplied directly
/// for providers that don't support discovery.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct ProviderConfig {
    /// Issuer identifier. Tokens must carry this value in their `iss` claim.
    pub issuer: String,
    /// Authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    /// Token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    /// Device authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_authorization_endpoint: Option<String>,
    /// User info endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    /// JSON Web Key Set document holding the provider's signing keys.
    pub jwks_uri: String,
    /// Algorithms the provider may sign ID tokens with. Unrecognized values are dropped when the
    /// provider is created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl ProviderConfig {
    /// Creates a provider from this configuration without contacting the network.
    ///
    /// Key sets are fetched with the HTTP client configured on `ctx`.
    pub fn new_provider(&self, ctx: &OidcContext) -> Result<Provider, DiscoveryError> {
        let http_client = ctx.http_client().map_err(DiscoveryError::Request)?;
        let raw_metadata = serde_json::to_vec(self)
            .map_err(|err| DiscoveryError::Other(format!("failed to serialize config: {}", err)))?;
        Provider::new(self.clone(), self.issuer.clone(), raw_metadata, http_client)
    }
}

/// Authorization server endpoints advertised by a provider, for use with an OAuth 2.0 client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ProviderEndpoints {
    /// Authorization endpoint.
    pub auth_url: Option<AuthUrl>,
    /// Token endpoint.
    pub token_url: Option<TokenUrl>,
    /// Device authorization endpoint.
    pub device_authorization_url: Option<DeviceAuthorizationUrl>,
}

/// OpenID Connect provider: its issuer, endpoints, accepted signing algorithms, and key set.
///
/// Cloning a provider shares its key set cache.
#[derive(Clone, Debug)]
pub struct Provider {
    issuer: String,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    device_authorization_endpoint: Option<String>,
    userinfo_endpoint: Option<String>,
    signing_algs: Vec<SigningAlgorithm>,
    key_set: RemoteKeySet,
    raw_metadata: Vec<u8>,
}

impl Provider {
    /// Fetches the provider's metadata from `<issuer>/.well-known/openid-configuration` and
    /// validates its issuer.
    ///
    /// By default the published issuer must equal `issuer` exactly. A custom validator set on
    /// `ctx` replaces this check. Otherwise, with an insecure issuer override set on `ctx`, the
    /// published issuer must equal either the override or `issuer`, and the provider adopts the
    /// override as its issuer. The key set is not fetched until a key is first needed.
    pub async fn discover(ctx: &OidcContext, issuer: &str) -> Result<Self, DiscoveryError> {
        let discovery_url = url::Url::parse(&format!(
            "{}{}",
            issuer.trim_end_matches('/'),
            CONFIG_URL_SUFFIX
        ))
        .map_err(DiscoveryError::UrlParse)?;
        debug!("discovering provider metadata at {}", discovery_url);

        let http_client = ctx.http_client().map_err(DiscoveryError::Request)?;
        let request = Self::discovery_request(&discovery_url)
            .map_err(|err| DiscoveryError::Other(format!("failed to prepare request: {err}")))?;
        let http_response = ctx
            .run(http_client.call(request))
            .await?
            .map_err(DiscoveryError::Request)?;

        let metadata = Self::discovery_response(&discovery_url, &http_response)?;

        let expected_issuer = ctx.insecure_issuer().unwrap_or(issuer);
        let issuer_valid = match (ctx.issuer_validator(), ctx.insecure_issuer()) {
            (Some(validator), _) => validator(expected_issuer, &metadata.issuer),
            // Behind an override, the provider may still report the URL it was fetched from.
            (None, Some(insecure_issuer)) => {
                metadata.issuer == insecure_issuer || metadata.issuer == issuer
            }
            (None, None) => metadata.issuer == issuer,
        };
        if !issuer_valid {
            return Err(DiscoveryError::Validation(format!(
                "unexpected issuer URI `{}` (expected `{}`)",
                metadata.issuer, expected_issuer
            )));
        }

        // Tokens from a provider behind an issuer override carry the override.
        let issuer = match ctx.insecure_issuer() {
            Some(insecure_issuer) => insecure_issuer.to_string(),
            None => metadata.issuer.clone(),
        };
        Self::new(metadata, issuer, http_response.into_body(), http_client)
    }

    fn new(
        metadata: ProviderConfig,
        issuer: String,
        raw_metadata: Vec<u8>,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, DiscoveryError> {
        let jwks_url = url::Url::parse(&metadata.jwks_uri).map_err(DiscoveryError::UrlParse)?;

        let advertised_algs = &metadata.id_token_signing_alg_values_supported;
        let mut signing_algs = Vec::with_capacity(advertised_algs.len());
        for alg in advertised_algs {
            match alg.parse::<SigningAlgorithm>() {
                Ok(alg) => signing_algs.push(alg),
                Err(err) => warn!("ignoring algorithm advertised by `{}`: {}", issuer, err),
            }
        }

        Ok(Self {
            issuer,
            authorization_endpoint: metadata.authorization_endpoint,
            token_endpoint: metadata.token_endpoint,
            device_authorization_endpoint: metadata.device_authorization_endpoint,
            userinfo_endpoint: metadata.userinfo_endpoint,
            signing_algs,
            key_set: RemoteKeySet::new(jwks_url, http_client),
            raw_metadata,
        })
    }

    fn discovery_request(discovery_url: &url::Url) -> Result<HttpRequest, http::Error> {
        http::Request::builder()
            .uri(discovery_url.to_string())
            .method(Method::GET)
            .header(ACCEPT, HeaderValue::from_static(MIME_TYPE_JSON))
            .body(Vec::new())
    }

    fn discovery_response(
        discovery_url: &url::Url,
        discovery_response: &HttpResponse,
    ) -> Result<ProviderConfig, DiscoveryError> {
        if !discovery_response.status().is_success() {
            return Err(DiscoveryError::Response(
                discovery_response.status(),
                discovery_response.body().to_owned(),
                format!(
                    "HTTP status code {} at {}",
                    discovery_response.status(),
                    discovery_url
                ),
            ));
        }

        if let Err(err_msg) = check_content_type(discovery_response.headers(), MIME_TYPE_JSON) {
            debug!(
                "parsing provider metadata from {} despite content type: {}",
                discovery_url, err_msg
            );
        }

        serde_path_to_error::deserialize::<_, ProviderConfig>(
            &mut serde_json::Deserializer::from_slice(discovery_response.body()),
        )
        .map_err(DiscoveryError::Parse)
    }

    /// Returns the issuer identifier that ID tokens must carry.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the authorization endpoint, if advertised.
    pub fn authorization_endpoint(&self) -> Option<&str> {
        self.authorization_endpoint.as_deref()
    }

    /// Returns the token endpoint, if advertised.
    pub fn token_endpoint(&self) -> Option<&str> {
        self.token_endpoint.as_deref()
    }

    /// Returns the device authorization endpoint, if advertised.
    pub fn device_authorization_endpoint(&self) -> Option<&str> {
        self.device_authorization_endpoint.as_deref()
    }

    /// Returns the user info endpoint, if advertised.
    pub fn userinfo_endpoint(&self) -> Option<&str> {
        self.userinfo_endpoint.as_deref()
    }

    /// Returns the advertised ID token signing algorithms that this crate can verify, in the
    /// order the provider listed them.
    pub fn signing_algs(&self) -> &[SigningAlgorithm] {
        &self.signing_algs
    }

    pub(crate) fn allowed_signing_algs(&self) -> &[SigningAlgorithm] {
        if self.signing_algs.is_empty() {
            DEFAULT_SIGNING_ALGS
        } else {
            &self.signing_algs
        }
    }

    /// Returns the provider's key set.
    pub fn key_set(&self) -> &RemoteKeySet {
        &self.key_set
    }

    /// Returns the OAuth 2.0 endpoints, parsed as URLs.
    pub fn endpoints(&self) -> Result<ProviderEndpoints, url::ParseError> {
        Ok(ProviderEndpoints {
            auth_url: self
                .authorization_endpoint
                .clone()
                .map(AuthUrl::new)
                .transpose()?,
            token_url: self.token_endpoint.clone().map(TokenUrl::new).transpose()?,
            device_authorization_url: self
                .device_authorization_endpoint
                .clone()
                .map(DeviceAuthorizationUrl::new)
                .transpose()?,
        })
    }

    /// Decodes the provider metadata into `T`, e.g. to read fields such as `scopes_supported`.
    pub fn claims<T>(&self) -> Result<T, ClaimsDecodeError>
    where
        T: DeserializeOwned,
    {
        decode_claims(&self.raw_metadata)
    }

    /// Returns an ID token verifier for this provider.
    ///
    /// Tokens must be signed with one of the provider's algorithms (`RS256` if it advertised
    /// none) by a key from its key set.
    pub fn verifier(&self, config: VerificationConfig) -> IdTokenVerifier {
        IdTokenVerifier::new_with_provider_algs(
            self.issuer.clone(),
            Arc::new(self.key_set.clone()),
            self.allowed_signing_algs(),
            config,
        )
    }

    /// Fetches claims about the authenticated end-user from the user info endpoint.
    pub async fn user_info(
        &self,
        ctx: &OidcContext,
        token_source: &dyn TokenSource,
    ) -> Result<UserInfo, UserInfoError> {
        fetch_user_info(ctx, self, token_source, None).await
    }
}
