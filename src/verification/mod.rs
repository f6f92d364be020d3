use crate::claims::ClaimsDecodeError;
use crate::context::OidcContext;
use crate::id_token::{IdToken, IdTokenClaims};
use crate::jwt::verify_signature;
use crate::key_store::{KeyError, KeySource};
use crate::types::{Nonce, SigningAlgorithm, UnsupportedAlgorithm};

use chrono::{DateTime, Duration, Utc};
use log::debug;
use oauth2::ClientId;
use thiserror::Error;

use std::fmt::{Debug, Formatter, Result as FormatterResult};
use std::sync::Arc;

#[cfg(test)]
mod tests;

/// Error verifying claims.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClaimsVerificationError {
    /// Audience claim doesn't contain the client ID.
    #[error("Invalid audiences: {0}")]
    AudienceMismatch(String),
    /// The verifier was configured inconsistently.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Issued at time is further in the future than the allowed clock skew.
    #[error("Issued in the future: {0}")]
    IssuedAtInFuture(String),
    /// Issuer claim doesn't match the expected issuer.
    #[error("Invalid issuer: {0}")]
    IssuerMismatch(String),
    /// The verified payload is not a valid claims object.
    #[error("Failed to parse ID token claims")]
    Malformed(#[source] ClaimsDecodeError),
    /// Nonce claim doesn't match the expected nonce.
    #[error("Invalid nonce: {0}")]
    NonceMismatch(String),
    /// Failed to verify the token signature.
    #[error("Signature verification failed: {0}")]
    SignatureVerification(#[from] SignatureVerificationError),
    /// Token has expired or is missing its expiration time.
    #[error("Expired: {0}")]
    TokenExpired(String),
}

/// Error verifying the signature of a JSON Web Token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignatureVerificationError {
    /// The supplied key cannot be used in this context. This may occur if the key type does not
    /// match the signature type (e.g., an RSA key used to validate an ECDSA signature) or the JWK
    /// usage disallows signatures.
    #[error("Invalid cryptographic key: {0}")]
    InvalidKey(String),
    /// The signing key could not be obtained.
    #[error("Failed to obtain signing key: {0}")]
    Key(#[from] KeyError),
    /// The token is not a well-formed compact JWS.
    #[error("Invalid JSON web token: {0}")]
    Malformed(String),
    /// Invalid signature for the supplied claims and signing key.
    #[error("Crypto error: {0}")]
    SignatureInvalid(String),
    /// The token's algorithm is not in the allowed set.
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),
}

/// Parameters for verifying ID tokens.
#[derive(Clone)]
pub struct VerificationConfig {
    client_id: ClientId,
    nonce: Option<Nonce>,
    clock_skew: Duration,
    skip_client_id_check: bool,
    skip_expiry_check: bool,
    skip_issuer_check: bool,
    insecure_issuer: Option<String>,
    allowed_algs: Option<Vec<SigningAlgorithm>>,
    time_fn: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl VerificationConfig {
    /// Creates a configuration that accepts tokens issued to `client_id`.
    ///
    /// By default, the audience, issuer, and expiration are all checked, allowing five minutes of
    /// clock skew.
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            nonce: None,
            clock_skew: Duration::minutes(5),
            skip_client_id_check: false,
            skip_expiry_check: false,
            skip_issuer_check: false,
            insecure_issuer: None,
            allowed_algs: None,
            time_fn: Arc::new(Utc::now),
        }
    }

    /// Requires the token's `nonce` claim to equal `nonce`.
    pub fn set_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Specifies how far the local clock may drift from the provider's.
    pub fn set_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Accepts tokens regardless of their audience.
    ///
    /// # Security Warning
    ///
    /// Only appropriate when the caller checks the audience itself, since tokens issued to other
    /// clients of the same provider will otherwise be accepted.
    pub fn set_skip_client_id_check(mut self, skip: bool) -> Self {
        self.skip_client_id_check = skip;
        self
    }

    /// Accepts expired tokens and tokens issued in the future.
    pub fn set_skip_expiry_check(mut self, skip: bool) -> Self {
        self.skip_expiry_check = skip;
        self
    }

    /// Accepts tokens from any issuer.
    pub fn set_skip_issuer_check(mut self, skip: bool) -> Self {
        self.skip_issuer_check = skip;
        self
    }

    /// Expects tokens to be issued by `issuer` rather than the verifier's issuer.
    pub fn set_insecure_issuer<I>(mut self, issuer: I) -> Self
    where
        I: Into<String>,
    {
        self.insecure_issuer = Some(issuer.into());
        self
    }

    /// Restricts accepted signing algorithms, replacing those advertised by the provider.
    pub fn set_allowed_algs<I>(mut self, algs: I) -> Self
    where
        I: IntoIterator<Item = SigningAlgorithm>,
    {
        self.allowed_algs = Some(algs.into_iter().collect());
        self
    }

    /// Specifies a function for returning the current time.
    ///
    /// This function is used for verifying ID token expiration and issue times.
    pub fn set_time_fn<T>(mut self, time_fn: T) -> Self
    where
        T: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.time_fn = Arc::new(time_fn);
        self
    }

    /// Returns the client ID expected in the audience.
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

impl Debug for VerificationConfig {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        f.debug_struct("VerificationConfig")
            .field("client_id", &self.client_id)
            .field("nonce", &self.nonce)
            .field("clock_skew", &self.clock_skew)
            .field("skip_client_id_check", &self.skip_client_id_check)
            .field("skip_expiry_check", &self.skip_expiry_check)
            .field("skip_issuer_check", &self.skip_issuer_check)
            .field("insecure_issuer", &self.insecure_issuer)
            .field("allowed_algs", &self.allowed_algs)
            .finish()
    }
}

/// ID token verifier.
#[derive(Clone)]
pub struct IdTokenVerifier {
    issuer: String,
    key_source: Arc<dyn KeySource>,
    allowed_algs: Vec<SigningAlgorithm>,
    config: VerificationConfig,
}

impl IdTokenVerifier {
    /// Creates a verifier for tokens issued by `issuer` and signed by keys from `key_source`.
    ///
    /// Unless [`VerificationConfig::set_allowed_algs`] was called, only `RS256` signatures are
    /// accepted.
    pub fn new<I>(issuer: I, key_source: Arc<dyn KeySource>, config: VerificationConfig) -> Self
    where
        I: Into<String>,
    {
        Self::new_with_provider_algs(issuer, key_source, &[], config)
    }

    // An explicit configuration wins over the provider's list, which wins over RS256 alone.
    pub(crate) fn new_with_provider_algs<I>(
        issuer: I,
        key_source: Arc<dyn KeySource>,
        provider_algs: &[SigningAlgorithm],
        config: VerificationConfig,
    ) -> Self
    where
        I: Into<String>,
    {
        let allowed_algs = match config.allowed_algs {
            Some(ref algs) => algs.clone(),
            None if !provider_algs.is_empty() => provider_algs.to_vec(),
            None => vec![SigningAlgorithm::Rs256],
        };
        Self {
            issuer: issuer.into(),
            key_source,
            allowed_algs,
            config,
        }
    }

    /// Returns the signing algorithms this verifier accepts.
    pub fn allowed_algs(&self) -> &[SigningAlgorithm] {
        &self.allowed_algs
    }

    /// Returns the issuer tokens must carry.
    pub fn expected_issuer(&self) -> &str {
        self.config
            .insecure_issuer
            .as_deref()
            .unwrap_or(&self.issuer)
    }

    /// Verifies a compact-serialized ID token.
    ///
    /// The signature is checked first, followed by the issuer, audience, expiration and issue
    /// time, and nonce. The first failure is returned.
    pub async fn verify(
        &self,
        ctx: &OidcContext,
        raw_id_token: &str,
    ) -> Result<IdToken, ClaimsVerificationError> {
        if !self.config.skip_client_id_check && self.config.client_id.is_empty() {
            return Err(ClaimsVerificationError::InvalidConfiguration(
                "client ID must be provided unless the client ID check is skipped".to_string(),
            ));
        }

        let verified_claims = verify_signature(
            ctx,
            raw_id_token,
            self.key_source.as_ref(),
            &self.allowed_algs,
        )
        .await?;
        let claims = verified_claims
            .claims::<IdTokenClaims>()
            .map_err(ClaimsVerificationError::Malformed)?;

        self.verify_claims(&claims)?;

        debug!(
            "verified ID token for subject `{}` from `{}`",
            claims.subject().unwrap_or(""),
            self.expected_issuer()
        );
        Ok(IdToken::new(verified_claims, claims))
    }

    fn verify_claims(&self, claims: &IdTokenClaims) -> Result<(), ClaimsVerificationError> {
        // The Issuer Identifier for the OpenID Provider (which is typically obtained during
        // Discovery) MUST exactly match the value of the iss (issuer) Claim.
        if !self.config.skip_issuer_check {
            let expected_issuer = self.expected_issuer();
            match claims.issuer() {
                Some(issuer) if issuer == expected_issuer => {}
                Some(issuer) => {
                    return Err(ClaimsVerificationError::IssuerMismatch(format!(
                        "expected `{}` (found `{}`)",
                        expected_issuer, issuer
                    )))
                }
                None => {
                    return Err(ClaimsVerificationError::IssuerMismatch(
                        "missing issuer claim".to_string(),
                    ))
                }
            }
        }

        // The aud (audience) Claim MAY contain an array with more than one element.
        if !self.config.skip_client_id_check {
            let audiences = claims.audiences();
            if !audiences.iter().any(|aud| **aud == *self.config.client_id) {
                return Err(ClaimsVerificationError::AudienceMismatch(format!(
                    "must contain `{}` (found audiences: {})",
                    *self.config.client_id,
                    audiences
                        .iter()
                        .map(|aud| format!("`{}`", aud))
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }

        if !self.config.skip_expiry_check {
            let cur_time = (*self.config.time_fn)();
            let expiration = claims.expiration().ok_or_else(|| {
                ClaimsVerificationError::TokenExpired("missing expiration claim".to_string())
            })?;
            // An expiration too far in the future to add the skew to has certainly not passed.
            let expired = expiration
                .checked_add_signed(self.config.clock_skew)
                .map_or(false, |deadline| cur_time >= deadline);
            if expired {
                return Err(ClaimsVerificationError::TokenExpired(format!(
                    "ID token expired at {} (current time is {})",
                    expiration, cur_time
                )));
            }

            if let Some(issue_time) = claims.issue_time() {
                let in_future = cur_time
                    .checked_add_signed(self.config.clock_skew)
                    .map_or(false, |latest| issue_time > latest);
                if in_future {
                    return Err(ClaimsVerificationError::IssuedAtInFuture(format!(
                        "ID token issued at {} (current time is {})",
                        issue_time, cur_time
                    )));
                }
            }
        }

        // If a nonce value was sent in the Authentication Request, a nonce Claim MUST be present
        // and its value checked to verify that it is the same value as the one that was sent.
        if let Some(ref expected_nonce) = self.config.nonce {
            match claims.nonce() {
                Some(nonce) if expected_nonce.matches(nonce) => {}
                Some(_) => {
                    return Err(ClaimsVerificationError::NonceMismatch(
                        "nonce mismatch".to_string(),
                    ))
                }
                None => {
                    return Err(ClaimsVerificationError::NonceMismatch(
                        "missing nonce claim".to_string(),
                    ))
                }
            }
        }

        Ok(())
    }
}

impl Debug for IdTokenVerifier {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        f.debug_struct("IdTokenVerifier")
            .field("issuer", &self.issuer)
            .field("allowed_algs", &self.allowed_algs)
            .field("config", &self.config)
            .finish()
    }
}
