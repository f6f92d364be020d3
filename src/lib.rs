#![warn(missing_docs)]
//!
//! Core of an [OpenID Connect](https://openid.net/specs/openid-connect-core-1_0.html) relying
//! party: provider discovery, cached JSON Web Key Sets, ID token verification, access token
//! hash validation, and user info retrieval.
//!
//! # Discovery
//!
//! A [`Provider`] is usually obtained from the issuer's
//! [discovery document](https://openid.net/specs/openid-connect-discovery-1_0.html):
//!
//! ```rust,no_run
//! use oidc_rp_core::{OidcContext, Provider};
//!
//! # async fn err_wrapper() -> Result<(), anyhow::Error> {
//! let ctx = OidcContext::new();
//! let provider = Provider::discover(&ctx, "https://accounts.example.com").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Providers that don't support discovery can be described with a [`ProviderConfig`] instead.
//! Either way, the provider's key set is only fetched once a token needs verifying.
//!
//! # Verifying ID tokens
//!
//! ```rust,no_run
//! use oidc_rp_core::{ClientId, Nonce, OidcContext, Provider, VerificationConfig};
//!
//! # async fn err_wrapper(provider: Provider, raw_id_token: &str, nonce: Nonce)
//! #     -> Result<(), anyhow::Error> {
//! let ctx = OidcContext::new();
//! let verifier = provider.verifier(
//!     VerificationConfig::new(ClientId::new("client_id".to_string())).set_nonce(nonce),
//! );
//! let id_token = verifier.verify(&ctx, raw_id_token).await?;
//! println!("authenticated `{}`", id_token.subject());
//! # Ok(())
//! # }
//! ```
//!
//! Verification checks the signature first. Only tokens signed with an algorithm the provider
//! advertises (and this crate recognizes) are accepted, and `none` never is. The issuer,
//! audience, expiration and issue time, and nonce are checked after the signature, in that
//! order. An access token received alongside the ID token can then be checked with
//! [`IdToken::verify_access_token`].
//!
//! # Cancellation
//!
//! Every network request is driven through an [`OidcContext`], which can carry a cancellation
//! signal and a timeout. Abandoned requests are dropped and reported as [`Cancelled`].
//!
//! # HTTP clients
//!
//! With the default `reqwest` feature, requests are sent with a `reqwest` client that doesn't
//! follow redirects. Any other client can be supplied by implementing [`HttpClient`] and calling
//! [`OidcContext::set_http_client`]. Closures of type
//! `Fn(HttpRequest) -> Result<HttpResponse, HttpClientError>` implement [`HttpClient`], which is
//! convenient for tests.

#[macro_use]
mod macros;

mod claims;
mod context;
mod discovery;
mod helpers;
mod http_utils;
mod id_token;
mod jwt;
mod key_store;
mod types;
mod user_info;
mod verification;

pub use oauth2::{AccessToken, ClientId};

pub use crate::claims::{ClaimsDecodeError, VerifiedClaims};
pub use crate::context::{Cancelled, IssuerValidator, OidcContext};
pub use crate::discovery::{DiscoveryError, Provider, ProviderConfig, ProviderEndpoints};
pub use crate::http_utils::{HttpClient, HttpClientError, HttpRequest, HttpResponse};
pub use crate::id_token::{
    verify_access_token_hash, AccessTokenHashError, IdToken, IdTokenClaims,
};
pub use crate::jwt::{verify_signature, JsonWebTokenHeader};
pub use crate::key_store::{KeyError, KeyFetchError, KeySource, RemoteKeySet, StaticKeySet};
pub use crate::types::jwk::{
    JsonCurveType, JsonWebKey, JsonWebKeyId, JsonWebKeyType, JsonWebKeyUse,
};
pub use crate::types::jwks::JsonWebKeySet;
pub use crate::types::{
    AccessTokenHash, HashAlgorithm, Nonce, SigningAlgorithm, UnsupportedAlgorithm,
};
pub use crate::user_info::{
    fetch_user_info, TokenSource, TokenSourceError, UserInfo, UserInfoError,
};
pub use crate::verification::{
    ClaimsVerificationError, IdTokenVerifier, SignatureVerificationError, VerificationConfig,
};
