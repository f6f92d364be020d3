use crate::claims::{ClaimsDecodeError, VerifiedClaims};
use crate::helpers::{deserialize_string_or_vec, serde_utc_seconds_opt};
use crate::types::{AccessTokenHash, SigningAlgorithm, UnsupportedAlgorithm};

use chrono::{DateTime, Utc};
use oauth2::AccessToken;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;


/// Error checking an access token against the `at_hash` claim of an ID token.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessTokenHashError {
    /// The access token doesn't hash to the `at_hash` value.
    #[error("access token hash does not match value in ID token")]
    HashMismatch,
    /// The ID token has no (or an empty) `at_hash` claim.
    #[error("id token did not have an access token hash")]
    MissingHashClaim,
    /// No digest is defined for the signing algorithm.
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),
}

/// Checks that `access_token` hashes to `access_token_hash` under the JWS algorithm named
/// `signing_alg`.
pub fn verify_access_token_hash(
    access_token_hash: Option<&AccessTokenHash>,
    signing_alg: &str,
    access_token: &AccessToken,
) -> Result<(), AccessTokenHashError> {
    let expected_hash = access_token_hash
        .filter(|hash| !hash.is_empty())
        .ok_or(AccessTokenHashError::MissingHashClaim)?;

    let actual_hash = AccessTokenHash::from_token(access_token, signing_alg)?;
    if actual_hash.ct_eq(expected_hash) {
        Ok(())
    } else {
        Err(AccessTokenHashError::HashMismatch)
    }
}

/// Standard claims of an ID token.
///
/// Claims that fail the basic type checks (e.g., an `exp` that isn't a number) cause the whole
/// token to be rejected. Claims not listed here are available through [`IdToken::claims`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    #[serde(rename = "iss", default)]
    issuer: Option<String>,
    #[serde(rename = "sub", default)]
    subject: Option<String>,
    #[serde(
        rename = "aud",
        default,
        deserialize_with = "deserialize_string_or_vec"
    )]
    audiences: Vec<String>,
    #[serde(
        rename = "exp",
        default,
        deserialize_with = "serde_utc_seconds_opt::deserialize"
    )]
    expiration: Option<DateTime<Utc>>,
    #[serde(
        rename = "iat",
        default,
        deserialize_with = "serde_utc_seconds_opt::deserialize"
    )]
    issue_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "serde_utc_seconds_opt::deserialize")]
    auth_time: Option<DateTime<Utc>>,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(rename = "at_hash", default)]
    access_token_hash: Option<AccessTokenHash>,
    #[serde(rename = "azp", default)]
    authorized_party: Option<String>,
}

impl IdTokenClaims {
    /// Returns the `iss` claim.
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Returns the `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Returns the `aud` claim, normalized to a list.
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    /// Returns the `exp` claim.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    /// Returns the `iat` claim.
    pub fn issue_time(&self) -> Option<DateTime<Utc>> {
        self.issue_time
    }

    /// Returns the `auth_time` claim.
    pub fn auth_time(&self) -> Option<DateTime<Utc>> {
        self.auth_time
    }

    /// Returns the `nonce` claim.
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    /// Returns the `at_hash` claim.
    pub fn access_token_hash(&self) -> Option<&AccessTokenHash> {
        self.access_token_hash.as_ref()
    }

    /// Returns the `azp` claim.
    pub fn authorized_party(&self) -> Option<&str> {
        self.authorized_party.as_deref()
    }
}

/// ID token that passed signature and claims verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdToken {
    verified_claims: VerifiedClaims,
    claims: IdTokenClaims,
}

impl IdToken {
    pub(crate) fn new(verified_claims: VerifiedClaims, claims: IdTokenClaims) -> Self {
        Self {
            verified_claims,
            claims,
        }
    }

    /// Returns the standard claims.
    pub fn standard_claims(&self) -> &IdTokenClaims {
        &self.claims
    }

    /// Returns the issuer (empty if the token had no `iss` claim).
    pub fn issuer(&self) -> &str {
        self.claims.issuer().unwrap_or("")
    }

    /// Returns the subject (empty if the token had no `sub` claim).
    pub fn subject(&self) -> &str {
        self.claims.subject().unwrap_or("")
    }

    /// Returns the audiences.
    pub fn audiences(&self) -> &[String] {
        self.claims.audiences()
    }

    /// Returns the expiration time.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.claims.expiration()
    }

    /// Returns the issue time.
    pub fn issue_time(&self) -> Option<DateTime<Utc>> {
        self.claims.issue_time()
    }

    /// Returns the nonce.
    pub fn nonce(&self) -> Option<&str> {
        self.claims.nonce()
    }

    /// Returns the access token hash.
    pub fn access_token_hash(&self) -> Option<&AccessTokenHash> {
        self.claims.access_token_hash()
    }

    /// Returns the algorithm the token was signed with.
    pub fn signing_alg(&self) -> SigningAlgorithm {
        self.verified_claims.signing_alg()
    }

    /// Returns the signed payload.
    pub fn raw_claims(&self) -> &[u8] {
        self.verified_claims.raw_claims()
    }

    /// Decodes the payload into `T`, e.g. to read claims not exposed by [`IdTokenClaims`].
    pub fn claims<T>(&self) -> Result<T, ClaimsDecodeError>
    where
        T: DeserializeOwned,
    {
        self.verified_claims.claims()
    }

    /// Checks that `access_token` was issued alongside this ID token using the `at_hash` claim.
    pub fn verify_access_token(
        &self,
        access_token: &AccessToken,
    ) -> Result<(), AccessTokenHashError> {
        verify_access_token_hash(
            self.access_token_hash(),
            self.signing_alg().as_str(),
            access_token,
        )
    }
}
