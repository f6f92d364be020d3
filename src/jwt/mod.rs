use crate::claims::VerifiedClaims;
use crate::context::OidcContext;
use crate::helpers::base64_url_decode;
use crate::key_store::KeySource;
use crate::types::jwk::JsonWebKeyId;
use crate::types::{SigningAlgorithm, UnsupportedAlgorithm};
use crate::verification::SignatureVerificationError;

use log::debug;
use serde::{Deserialize, Serialize};


/// JSON Web Token (JWT) JOSE header.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct JsonWebTokenHeader {
    /// Raw `alg` value. Kept as a string so that unrecognized algorithms can be reported by name.
    pub alg: String,
    // Extensions listed here must be understood by the recipient. None are supported, so any JWT
    // with this value present is rejected (public headers may not be listed here).
    // See https://tools.ietf.org/html/rfc7515#section-4.1.11.
    /// Critical header parameters (`crit`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crit: Option<Vec<String>>,
    /// Content type (`cty`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
    /// ID of the signing key (`kid`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<JsonWebKeyId>,
    /// Media type of the token (`typ`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// Compact JWS split into its parts. Nothing about it has been verified yet.
#[derive(Debug)]
pub(crate) struct UnverifiedJws<'a> {
    header: JsonWebTokenHeader,
    signing_input: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> UnverifiedJws<'a> {
    // NB: The raw token is never included in error messages to avoid clients logging sensitive
    // values.
    pub(crate) fn parse(raw_token: &'a str) -> Result<Self, SignatureVerificationError> {
        let parts = raw_token.split('.').collect::<Vec<_>>();
        if parts.len() != 3 {
            return Err(SignatureVerificationError::Malformed(format!(
                "found {} parts (expected 3)",
                parts.len()
            )));
        }

        let header_json = base64_url_decode(parts[0]).map_err(|err| {
            SignatureVerificationError::Malformed(format!(
                "invalid base64url header encoding: {:?}",
                err
            ))
        })?;
        let header = serde_json::from_slice::<JsonWebTokenHeader>(&header_json).map_err(|err| {
            SignatureVerificationError::Malformed(format!("failed to parse header JSON: {}", err))
        })?;

        Ok(Self {
            header,
            signing_input: &raw_token[..parts[0].len() + 1 + parts[1].len()],
            payload: parts[1],
            signature: parts[2],
        })
    }

    pub(crate) fn header(&self) -> &JsonWebTokenHeader {
        &self.header
    }
}

/// Verifies the signature of a compact JWS and returns its payload.
///
/// The token's `alg` must appear in `allowed_algs`; otherwise the token is rejected before any
/// key is looked up. The signing key is obtained from `key_source` using the token's `kid` (empty
/// when absent) and algorithm.
pub async fn verify_signature(
    ctx: &OidcContext,
    raw_token: &str,
    key_source: &dyn KeySource,
    allowed_algs: &[SigningAlgorithm],
) -> Result<VerifiedClaims, SignatureVerificationError> {
    let jws = UnverifiedJws::parse(raw_token)?;
    let header = jws.header();

    let signature_alg = header
        .alg
        .parse::<SigningAlgorithm>()
        .ok()
        .filter(|alg| allowed_algs.contains(alg))
        .ok_or_else(|| UnsupportedAlgorithm(header.alg.clone()))?;

    if header.crit.is_some() {
        return Err(SignatureVerificationError::Malformed(
            "unsupported critical header parameters".to_string(),
        ));
    }

    let payload = base64_url_decode(jws.payload).map_err(|err| {
        SignatureVerificationError::Malformed(format!(
            "invalid base64url payload encoding: {:?}",
            err
        ))
    })?;
    let signature = base64_url_decode(jws.signature).map_err(|err| {
        SignatureVerificationError::Malformed(format!(
            "invalid base64url signature encoding: {:?}",
            err
        ))
    })?;

    let key_id = header.kid.as_ref().map(|kid| kid.as_str()).unwrap_or("");
    let key = key_source.get_key(ctx, key_id, signature_alg).await?;
    debug!(
        "verifying {} signature with key `{}`",
        signature_alg,
        key.key_id().map(|kid| kid.as_str()).unwrap_or("")
    );

    key.verify_signature(signature_alg, jws.signing_input.as_bytes(), &signature)?;

    Ok(VerifiedClaims::new(payload, signature_alg))
}
