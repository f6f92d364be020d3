use crate::context::{Cancelled, OidcContext};
use crate::http_utils::{HttpClient, HttpClientError};
use crate::types::jwk::JsonWebKey;
use crate::types::jwks::JsonWebKeySet;
use crate::types::SigningAlgorithm;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use http::StatusCode;
use log::{debug, warn};
use thiserror::Error;

use std::sync::{Arc, Mutex, PoisonError, RwLock};


/// Error fetching a JSON Web Key Set. Clonable so that every caller waiting on the same fetch
/// receives it.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum KeyFetchError {
    /// Failed to build the key set request.
    #[error("Failed to prepare request")]
    Http(#[source] Arc<http::Error>),
    /// Failed to parse the key set.
    #[error("Failed to parse server response")]
    Parse(#[source] Arc<serde_path_to_error::Error<serde_json::Error>>),
    /// An error occurred while sending the request or receiving the response (e.g., network
    /// connectivity failed).
    #[error("Request failed")]
    Request(#[source] Arc<HttpClientError>),
    /// Server returned an invalid response.
    #[error("Server returned invalid response: {2}")]
    Response(StatusCode, Vec<u8>, String),
}

/// Error looking up a signing key.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum KeyError {
    /// The lookup was abandoned while waiting on the network.
    #[error("Key lookup cancelled")]
    Cancelled(#[from] Cancelled),
    /// The key set could not be fetched. Any previously cached keys are retained.
    #[error("Failed to fetch JSON Web Key Set")]
    Fetch(#[from] KeyFetchError),
    /// No single key matches the token, even after refreshing the key set.
    #[error("No matching key found: {0}")]
    NotFound(String),
}

/// Source of keys for verifying token signatures.
pub trait KeySource: Send + Sync {
    /// Returns the key for a token with the given `kid` header (empty when absent) and `alg`.
    fn get_key<'a>(
        &'a self,
        ctx: &'a OidcContext,
        key_id: &'a str,
        signature_alg: SigningAlgorithm,
    ) -> BoxFuture<'a, Result<JsonWebKey, KeyError>>;
}

/// Fixed set of keys that never changes, e.g. for providers whose keys are configured out of
/// band.
#[derive(Clone, Debug)]
pub struct StaticKeySet {
    keys: JsonWebKeySet,
}

impl StaticKeySet {
    /// Creates a key source serving `keys`.
    pub fn new(keys: JsonWebKeySet) -> Self {
        Self { keys }
    }
}

impl KeySource for StaticKeySet {
    fn get_key<'a>(
        &'a self,
        _ctx: &'a OidcContext,
        key_id: &'a str,
        signature_alg: SigningAlgorithm,
    ) -> BoxFuture<'a, Result<JsonWebKey, KeyError>> {
        let result = self
            .keys
            .select_key(key_id, signature_alg)
            .map(Clone::clone)
            .map_err(|msg| KeyError::NotFound(msg.to_string()));
        Box::pin(futures::future::ready(result))
    }
}

type KeyFetchFuture = BoxFuture<'static, Result<Arc<JsonWebKeySet>, KeyFetchError>>;

/// Key set fetched from a provider's `jwks_uri` and cached in memory.
///
/// Nothing is fetched until the first lookup. A lookup that misses the cache triggers a refetch;
/// concurrent misses share a single in-flight request. A failed refetch leaves the cached keys in
/// place. Cloning yields a handle to the same cache.
#[derive(Clone)]
pub struct RemoteKeySet {
    inner: Arc<RemoteKeySetInner>,
}

struct RemoteKeySetInner {
    jwks_url: url::Url,
    http_client: Arc<dyn HttpClient>,
    keys: RwLock<Option<Arc<JsonWebKeySet>>>,
    // Only a weak handle is kept so that the request is dropped once every waiter has been
    // cancelled.
    in_flight: Mutex<Option<WeakShared<KeyFetchFuture>>>,
}

impl RemoteKeySet {
    /// Creates a key set backed by `jwks_url`. Requests are sent with `http_client`.
    pub fn new(jwks_url: url::Url, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            inner: Arc::new(RemoteKeySetInner {
                jwks_url,
                http_client,
                keys: RwLock::new(None),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Returns the key set URL.
    pub fn jwks_url(&self) -> &url::Url {
        &self.inner.jwks_url
    }

    /// Returns the currently cached keys without touching the network.
    pub fn cached_keys(&self) -> Option<Arc<JsonWebKeySet>> {
        self.inner
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetches the key set, bypassing the cache. Joins a fetch already in flight rather than
    /// issuing a second request.
    pub async fn refresh(&self, ctx: &OidcContext) -> Result<Arc<JsonWebKeySet>, KeyError> {
        let fetch = self.in_flight_fetch();
        Ok(ctx.run(fetch).await??)
    }

    fn in_flight_fetch(&self) -> Shared<KeyFetchFuture> {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(fetch) = in_flight.as_ref().and_then(WeakShared::upgrade) {
            debug!("joining in-flight fetch of {}", self.inner.jwks_url);
            return fetch;
        }

        let fetch = Self::fetch(self.inner.clone()).boxed().shared();
        *in_flight = fetch.downgrade();
        fetch
    }

    async fn fetch(inner: Arc<RemoteKeySetInner>) -> Result<Arc<JsonWebKeySet>, KeyFetchError> {
        debug!("fetching JSON Web Key Set from {}", inner.jwks_url);

        let result = async {
            let request = JsonWebKeySet::fetch_request(&inner.jwks_url)
                .map_err(|err| KeyFetchError::Http(Arc::new(err)))?;
            let response = inner
                .http_client
                .call(request)
                .await
                .map_err(|err| KeyFetchError::Request(Arc::new(err)))?;
            JsonWebKeySet::fetch_response(response).map(Arc::new)
        }
        .await;

        match result {
            Ok(ref keys) => {
                debug!(
                    "fetched {} key(s) from {}",
                    keys.keys().len(),
                    inner.jwks_url
                );
                *inner.keys.write().unwrap_or_else(PoisonError::into_inner) = Some(keys.clone());
            }
            Err(ref err) => {
                warn!(
                    "failed to fetch JSON Web Key Set from {}; keeping cached keys: {}",
                    inner.jwks_url, err
                );
            }
        }

        // The next miss starts a fresh fetch.
        *inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        result
    }
}

impl KeySource for RemoteKeySet {
    fn get_key<'a>(
        &'a self,
        ctx: &'a OidcContext,
        key_id: &'a str,
        signature_alg: SigningAlgorithm,
    ) -> BoxFuture<'a, Result<JsonWebKey, KeyError>> {
        Box::pin(async move {
            if let Some(keys) = self.cached_keys() {
                match keys.select_key(key_id, signature_alg) {
                    Ok(key) => return Ok(key.clone()),
                    Err(msg) => debug!(
                        "cache miss for key `{}` ({}): {}; refreshing {}",
                        key_id, signature_alg, msg, self.inner.jwks_url
                    ),
                }
            }

            let keys = self.refresh(ctx).await?;
            keys.select_key(key_id, signature_alg)
                .map(Clone::clone)
                .map_err(|msg| KeyError::NotFound(msg.to_string()))
        })
    }
}

impl std::fmt::Debug for RemoteKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RemoteKeySet")
            .field("jwks_url", &self.inner.jwks_url.as_str())
            .field("cached_keys", &self.cached_keys())
            .finish()
    }
}
