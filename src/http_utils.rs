use futures::future::BoxFuture;
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use oauth2::AccessToken;
use thiserror::Error;

pub use oauth2::{HttpRequest, HttpResponse};

#[cfg(test)]
mod tests;

pub const MIME_TYPE_JSON: &str = "application/json";
pub const MIME_TYPE_JWKS: &str = "application/jwk-set+json";
pub const MIME_TYPE_JWT: &str = "application/jwt";

pub const BEARER: &str = "Bearer";

/// Error returned by an [`HttpClient`] while sending a request or receiving the response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Failed to build the HTTP request or response.
    #[error("HTTP error")]
    Http(#[from] http::Error),
    /// The transport failed (e.g., connection refused or TLS failure).
    #[error("Transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// An unexpected error occurred.
    #[error("Other error: {0}")]
    Other(String),
}

/// Asynchronous HTTP client used for discovery, key set, and user info requests.
///
/// The crate never retries a request. Implementations should not follow redirects to other
/// origins for these endpoints.
pub trait HttpClient: Send + Sync {
    /// Sends `request` and resolves to the full response, including its body.
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpClientError>>;
}

impl<F> HttpClient for F
where
    F: Fn(HttpRequest) -> Result<HttpResponse, HttpClientError> + Send + Sync,
{
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpClientError>> {
        Box::pin(futures::future::ready(self(request)))
    }
}

#[cfg(feature = "reqwest")]
impl HttpClient for reqwest::Client {
    fn call(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpClientError>> {
        Box::pin(async move {
            let request = reqwest::Request::try_from(request)
                .map_err(|err| HttpClientError::Transport(Box::new(err)))?;
            let response = self
                .execute(request)
                .await
                .map_err(|err| HttpClientError::Transport(Box::new(err)))?;

            let mut builder = http::Response::builder()
                .status(response.status())
                .version(response.version());
            for (name, value) in response.headers().iter() {
                builder = builder.header(name, value);
            }

            let body = response
                .bytes()
                .await
                .map_err(|err| HttpClientError::Transport(Box::new(err)))?;
            builder.body(body.to_vec()).map_err(HttpClientError::Http)
        })
    }
}

pub fn header_starts_with_ignoring_case(header: &HeaderValue, expected_start: &str) -> bool {
    header
        .to_str()
        .ok()
        .filter(|ct| ct.to_lowercase().starts_with(&expected_start.to_lowercase()))
        .is_some()
}

/// Returns the lowercased media type of a `Content-Type` header with any parameters (e.g.,
/// `charset`) removed.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|content_type| content_type.to_str().ok())
        .map(|content_type| {
            content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_lowercase()
        })
}

pub fn check_content_type(headers: &HeaderMap, expected_content_type: &str) -> Result<(), String> {
    headers
        .get(CONTENT_TYPE)
        .map_or(Ok(()), |content_type|
            // Section 3.1.1.1 of RFC 7231 indicates that media types are case insensitive and
            // may be followed by optional whitespace and/or a parameter (e.g., charset).
            // See https://tools.ietf.org/html/rfc7231#section-3.1.1.1.
            if !header_starts_with_ignoring_case(content_type, expected_content_type) {
                Err(
                    format!(
                        "Unexpected response Content-Type: {:?}, should be `{}`",
                        content_type,
                        expected_content_type
                    )
                )
            } else {
                Ok(())
            }
        )
}

pub fn auth_bearer(access_token: &AccessToken) -> Result<(HeaderName, HeaderValue), String> {
    let mut value = HeaderValue::from_str(&format!("{} {}", BEARER, access_token.secret()))
        .map_err(|_| "access token contains characters not allowed in a header".to_string())?;
    value.set_sensitive(true);
    Ok((AUTHORIZATION, value))
}

/// Truncates a response body for inclusion in an error message.
pub(crate) fn body_snippet(body: &[u8]) -> String {
    const MAX_SNIPPET_LEN: usize = 256;

    let snippet = String::from_utf8_lossy(&body[..body.len().min(MAX_SNIPPET_LEN)]).into_owned();
    if body.len() > MAX_SNIPPET_LEN {
        format!("{}...", snippet)
    } else {
        snippet
    }
}
