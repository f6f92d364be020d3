use crate::helpers::base64_url_encode;
use crate::types::jwk::JsonWebKeyType;

use oauth2::AccessToken;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest;
use subtle::ConstantTimeEq;
use thiserror::Error;

use std::fmt::{Display, Formatter, Result as FormatterResult};
use std::str::FromStr;

pub(crate) mod jwk;
pub(crate) mod jwks;


/// A signing algorithm outside of the recognized set (e.g., `none` or `HS256`).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported signing algorithm \"{0}\"")]
pub struct UnsupportedAlgorithm(pub String);

/// JSON Web Signature algorithms recognized for ID tokens and signed user info responses.
///
/// This is a closed set: tokens using any other `alg` (including `none` and the HMAC family) are
/// always rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 using SHA-256.
    Rs256,
    /// RSASSA-PKCS1-v1_5 using SHA-384.
    Rs384,
    /// RSASSA-PKCS1-v1_5 using SHA-512.
    Rs512,
    /// ECDSA using P-256 and SHA-256.
    Es256,
    /// ECDSA using P-384 and SHA-384.
    Es384,
    /// ECDSA using P-521 and SHA-512.
    Es512,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256.
    Ps256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384.
    Ps384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512.
    Ps512,
    /// Edwards-curve signature (Ed25519).
    EdDsa,
}

impl SigningAlgorithm {
    /// Every recognized algorithm, in the order used when no explicit list is configured.
    pub const ALL: [SigningAlgorithm; 10] = [
        SigningAlgorithm::Rs256,
        SigningAlgorithm::Rs384,
        SigningAlgorithm::Rs512,
        SigningAlgorithm::Es256,
        SigningAlgorithm::Es384,
        SigningAlgorithm::Es512,
        SigningAlgorithm::Ps256,
        SigningAlgorithm::Ps384,
        SigningAlgorithm::Ps512,
        SigningAlgorithm::EdDsa,
    ];

    /// The JWS `alg` identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::Rs256 => "RS256",
            SigningAlgorithm::Rs384 => "RS384",
            SigningAlgorithm::Rs512 => "RS512",
            SigningAlgorithm::Es256 => "ES256",
            SigningAlgorithm::Es384 => "ES384",
            SigningAlgorithm::Es512 => "ES512",
            SigningAlgorithm::Ps256 => "PS256",
            SigningAlgorithm::Ps384 => "PS384",
            SigningAlgorithm::Ps512 => "PS512",
            SigningAlgorithm::EdDsa => "EdDSA",
        }
    }

    /// The JWK key type able to verify signatures made with this algorithm.
    pub fn key_type(&self) -> JsonWebKeyType {
        match self {
            SigningAlgorithm::Rs256
            | SigningAlgorithm::Rs384
            | SigningAlgorithm::Rs512
            | SigningAlgorithm::Ps256
            | SigningAlgorithm::Ps384
            | SigningAlgorithm::Ps512 => JsonWebKeyType::RSA,
            SigningAlgorithm::Es256 | SigningAlgorithm::Es384 | SigningAlgorithm::Es512 => {
                JsonWebKeyType::EllipticCurve
            }
            SigningAlgorithm::EdDsa => JsonWebKeyType::OctetKeyPair,
        }
    }

    /// The digest used for `at_hash` and `c_hash` values of tokens signed with this algorithm.
    ///
    /// `EdDSA` has no digest in its name; SHA-512 is used to match the behavior of common
    /// providers. This is a compatibility policy rather than a requirement of OpenID Connect Core.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            SigningAlgorithm::Rs256 | SigningAlgorithm::Es256 | SigningAlgorithm::Ps256 => {
                HashAlgorithm::Sha256
            }
            SigningAlgorithm::Rs384 | SigningAlgorithm::Es384 | SigningAlgorithm::Ps384 => {
                HashAlgorithm::Sha384
            }
            SigningAlgorithm::Rs512
            | SigningAlgorithm::Es512
            | SigningAlgorithm::Ps512
            | SigningAlgorithm::EdDsa => HashAlgorithm::Sha512,
        }
    }
}

impl Display for SigningAlgorithm {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = UnsupportedAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SigningAlgorithm::ALL
            .iter()
            .find(|alg| alg.as_str() == s)
            .copied()
            .ok_or_else(|| UnsupportedAlgorithm(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for SigningAlgorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let alg = String::deserialize(deserializer)?;
        alg.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for SigningAlgorithm {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Digest selected by the bit length in a JWS algorithm name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Selects the digest for a JWS `alg` name.
    ///
    /// Besides the recognized signing algorithms, the HMAC names (`HS256`, `HS384`, `HS512`) map to
    /// their digests since a hash binding can be computed for them even though their signatures are
    /// never accepted. Anything else (including `none`) is unsupported.
    pub fn for_jws_alg(alg: &str) -> Result<Self, UnsupportedAlgorithm> {
        match alg {
            "HS256" => Ok(HashAlgorithm::Sha256),
            "HS384" => Ok(HashAlgorithm::Sha384),
            "HS512" => Ok(HashAlgorithm::Sha512),
            other => other
                .parse::<SigningAlgorithm>()
                .map(|signing_alg| signing_alg.hash_algorithm()),
        }
    }

    /// Computes the digest of `bytes`.
    pub fn hash(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => sha2::Sha256::digest(bytes).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(bytes).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(bytes).to_vec(),
        }
    }
}

new_type![
    /// Access token hash (`at_hash`): the base64url encoding of the left half of the access
    /// token's digest.
    #[derive(Deserialize, Serialize)]
    AccessTokenHash(String)
    impl {
        /// Computes the hash binding for `access_token` under the JWS algorithm named `alg`.
        pub fn from_token(
            access_token: &AccessToken,
            alg: &str,
        ) -> Result<Self, UnsupportedAlgorithm> {
            let hash = HashAlgorithm::for_jws_alg(alg)?.hash(access_token.secret().as_bytes());
            Ok(Self::new(base64_url_encode(&hash[0..hash.len() / 2])))
        }

        /// Compares two hashes in constant time.
        pub fn ct_eq(&self, other: &AccessTokenHash) -> bool {
            self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
        }
    }
];

new_secret_type![
    /// String value used to associate a client session with an ID Token, and to mitigate replay
    /// attacks.
    #[derive(Deserialize, Serialize)]
    Nonce(String)
    impl {
        /// Generate a new random, base64-encoded 128-bit nonce.
        pub fn new_random() -> Self {
            Nonce::new_random_len(16)
        }

        /// Generate a new random, base64-encoded nonce of the specified length.
        ///
        /// # Arguments
        ///
        /// * `num_bytes` - Number of random bytes to generate, prior to base64-encoding.
        pub fn new_random_len(num_bytes: u32) -> Self {
            let random_bytes: Vec<u8> = (0..num_bytes).map(|_| thread_rng().gen::<u8>()).collect();
            Nonce::new(base64_url_encode(random_bytes))
        }

        /// Compares the nonce against a claim value in constant time.
        pub fn matches(&self, claim: &str) -> bool {
            self.0.as_bytes().ct_eq(claim.as_bytes()).into()
        }
    }
];
