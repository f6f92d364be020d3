use crate::types::SigningAlgorithm;

use serde::de::DeserializeOwned;
use thiserror::Error;


/// Error decoding a claims payload into a caller-supplied type.
#[derive(Debug, Error)]
#[error("Failed to parse claims: {0}")]
pub struct ClaimsDecodeError(#[source] serde_path_to_error::Error<serde_json::Error>);

impl ClaimsDecodeError {
    /// Returns the path of the claim that failed to parse (e.g., `address.country`).
    pub fn path(&self) -> String {
        self.0.path().to_string()
    }
}

pub(crate) fn decode_claims<T>(raw_claims: &[u8]) -> Result<T, ClaimsDecodeError>
where
    T: DeserializeOwned,
{
    serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(raw_claims))
        .map_err(ClaimsDecodeError)
}

/// Payload of a JSON Web Token whose signature has been verified, along with the algorithm that
/// signed it.
///
/// Values of this type are only produced by signature verification, so holding one means the
/// bytes were signed by a trusted key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedClaims {
    payload: Vec<u8>,
    signing_alg: SigningAlgorithm,
}

impl VerifiedClaims {
    pub(crate) fn new(payload: Vec<u8>, signing_alg: SigningAlgorithm) -> Self {
        Self {
            payload,
            signing_alg,
        }
    }

    /// Returns the algorithm named in the token's header, which produced the verified signature.
    pub fn signing_alg(&self) -> SigningAlgorithm {
        self.signing_alg
    }

    /// Returns the verified payload exactly as it was signed.
    pub fn raw_claims(&self) -> &[u8] {
        &self.payload
    }

    /// Decodes the payload as JSON into `T`.
    pub fn claims<T>(&self) -> Result<T, ClaimsDecodeError>
    where
        T: DeserializeOwned,
    {
        decode_claims(&self.payload)
    }
}
