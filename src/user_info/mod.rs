use crate::claims::{decode_claims, ClaimsDecodeError};
use crate::context::{Cancelled, OidcContext};
use crate::discovery::Provider;
use crate::helpers::serde_string_bool;
use crate::http_utils::{
    auth_bearer, body_snippet, media_type, HttpClientError, HttpRequest, MIME_TYPE_JSON,
    MIME_TYPE_JWT,
};
use crate::jwt::verify_signature;
use crate::verification::SignatureVerificationError;

use futures::future::BoxFuture;
use http::header::{HeaderValue, ACCEPT};
use http::{Method, StatusCode};
use log::debug;
use oauth2::AccessToken;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Error returned by a [`TokenSource`].
pub type TokenSourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source of bearer tokens for user info requests, typically backed by an OAuth 2.0 client that
/// refreshes tokens as needed.
pub trait TokenSource: Send + Sync {
    /// Returns a currently valid access token.
    fn token(&self) -> BoxFuture<'_, Result<AccessToken, TokenSourceError>>;
}

impl TokenSource for AccessToken {
    fn token(&self) -> BoxFuture<'_, Result<AccessToken, TokenSourceError>> {
        Box::pin(futures::future::ready(Ok(self.clone())))
    }
}

impl<F> TokenSource for F
where
    F: Fn() -> Result<AccessToken, TokenSourceError> + Send + Sync,
{
    fn token(&self) -> BoxFuture<'_, Result<AccessToken, TokenSourceError>> {
        Box::pin(futures::future::ready(self()))
    }
}

/// Error retrieving user info.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UserInfoError {
    /// The request was abandoned before completing.
    #[error("User info request cancelled")]
    Cancelled(#[from] Cancelled),
    /// The provider does not advertise a user info endpoint.
    #[error("user info endpoint is not supported by this provider")]
    NoUserInfoEndpoint,
    /// An unexpected error occurred.
    #[error("Other error: {0}")]
    Other(String),
    /// Failed to parse the user info claims.
    #[error("Failed to parse server response")]
    Parse(#[source] ClaimsDecodeError),
    /// An error occurred while sending the request or receiving the response (e.g., network
    /// connectivity failed).
    #[error("Request failed")]
    Request(#[source] HttpClientError),
    /// Server returned a non-success status.
    #[error("Server returned invalid response ({0}): {1}")]
    Response(StatusCode, String),
    /// The signed user info response failed signature verification.
    #[error("Failed to verify signed user info")]
    SignatureVerification(#[source] SignatureVerificationError),
    /// The user info subject differs from the ID token subject.
    #[error("Invalid subject: {0}")]
    SubjectMismatch(String),
    /// The token source failed to provide an access token.
    #[error("Failed to obtain access token")]
    TokenSource(#[source] TokenSourceError),
}

#[derive(Deserialize)]
struct StandardUserInfoClaims {
    sub: String,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, deserialize_with = "serde_string_bool::deserialize_option")]
    email_verified: Option<bool>,
}

/// Claims about the authenticated end-user returned by the user info endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    subject: String,
    profile: Option<String>,
    email: Option<String>,
    email_verified: Option<bool>,
    raw_claims: Vec<u8>,
}

impl UserInfo {
    /// Parses user info claims from a JSON object.
    ///
    /// `email_verified` is accepted either as a boolean or as the string `"true"` or `"false"`,
    /// since some providers encode it as a string.
    pub fn from_raw_claims(raw_claims: Vec<u8>) -> Result<Self, ClaimsDecodeError> {
        let claims = decode_claims::<StandardUserInfoClaims>(&raw_claims)?;
        Ok(Self {
            subject: claims.sub,
            profile: claims.profile,
            email: claims.email,
            email_verified: claims.email_verified,
            raw_claims,
        })
    }

    /// Returns the subject (`sub`).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the profile page URL (`profile`).
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Returns the email address (`email`).
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns whether the provider verified the email address (`email_verified`).
    pub fn email_verified(&self) -> Option<bool> {
        self.email_verified
    }

    /// Returns the claims JSON. For signed responses, this is the verified payload.
    pub fn raw_claims(&self) -> &[u8] {
        &self.raw_claims
    }

    /// Decodes the claims into `T`, e.g. to read claims not exposed by [`UserInfo`].
    pub fn claims<T>(&self) -> Result<T, ClaimsDecodeError>
    where
        T: DeserializeOwned,
    {
        decode_claims(&self.raw_claims)
    }
}

/// Fetches claims about the end-user from `provider`'s user info endpoint.
///
/// The request is authenticated with a bearer token from `token_source`. Responses served as
/// `application/jwt` must be signed with one of the provider's algorithms by a key in its key set;
/// their issuer, audience, and expiration are not checked. Any other response is parsed as JSON.
///
/// When `expected_subject` is given (typically the subject of a verified ID token), a response
/// for any other subject is rejected.
pub async fn fetch_user_info(
    ctx: &OidcContext,
    provider: &Provider,
    token_source: &dyn TokenSource,
    expected_subject: Option<&str>,
) -> Result<UserInfo, UserInfoError> {
    let endpoint = provider
        .userinfo_endpoint()
        .ok_or(UserInfoError::NoUserInfoEndpoint)?;

    let access_token = ctx
        .run(token_source.token())
        .await?
        .map_err(UserInfoError::TokenSource)?;
    let http_client = ctx.http_client().map_err(UserInfoError::Request)?;
    let request = user_info_request(endpoint, &access_token)?;

    debug!("requesting user info from {}", endpoint);
    let http_response = ctx
        .run(http_client.call(request))
        .await?
        .map_err(UserInfoError::Request)?;

    if !http_response.status().is_success() {
        return Err(UserInfoError::Response(
            http_response.status(),
            body_snippet(http_response.body()),
        ));
    }

    let raw_claims = match media_type(http_response.headers()).as_deref() {
        Some(MIME_TYPE_JWT) => {
            let raw_token = std::str::from_utf8(http_response.body()).map_err(|_| {
                UserInfoError::Other("response body has invalid UTF-8 encoding".to_string())
            })?;
            verify_signature(
                ctx,
                raw_token.trim(),
                provider.key_set(),
                provider.allowed_signing_algs(),
            )
            .await
            .map_err(UserInfoError::SignatureVerification)?
            .raw_claims()
            .to_vec()
        }
        _ => http_response.into_body(),
    };

    let user_info = UserInfo::from_raw_claims(raw_claims).map_err(UserInfoError::Parse)?;
    if let Some(expected_subject) = expected_subject {
        if user_info.subject() != expected_subject {
            return Err(UserInfoError::SubjectMismatch(format!(
                "expected `{}` (found `{}`)",
                expected_subject,
                user_info.subject()
            )));
        }
    }
    Ok(user_info)
}

fn user_info_request(
    endpoint: &str,
    access_token: &AccessToken,
) -> Result<HttpRequest, UserInfoError> {
    let (auth_header, auth_value) = auth_bearer(access_token).map_err(UserInfoError::Other)?;
    http::Request::builder()
        .uri(endpoint)
        .method(Method::GET)
        .header(ACCEPT, HeaderValue::from_static(MIME_TYPE_JSON))
        .header(auth_header, auth_value)
        .body(Vec::new())
        .map_err(|err| UserInfoError::Other(format!("failed to prepare request: {err}")))
}
