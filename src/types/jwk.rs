use crate::helpers::{deserialize_option_or_none, Base64UrlEncodedBytes};
use crate::types::jwks::check_key_compatibility;
use crate::types::SigningAlgorithm;
use crate::verification::SignatureVerificationError;

use serde::{Deserialize, Serialize};
use sha2::Digest;
use signature::Verifier;

new_type![
    /// ID of a JSON Web Key.
    #[derive(Deserialize, Serialize)]
    JsonWebKeyId(String)
];

/// Key type (`kty`) of a JSON Web Key.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
pub enum JsonWebKeyType {
    /// Elliptic curve public key.
    #[serde(rename = "EC")]
    EllipticCurve,
    /// RSA public key.
    #[serde(rename = "RSA")]
    RSA,
    /// EdDSA key.
    #[serde(rename = "OKP")]
    OctetKeyPair,
    /// Symmetric key. Never usable for signature verification.
    #[serde(rename = "oct")]
    Symmetric,
}

/// Curve (`crv`) of an elliptic curve or octet key pair JSON Web Key.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
pub enum JsonCurveType {
    /// P-256 Curve.
    #[serde(rename = "P-256")]
    P256,
    /// P-384 Curve.
    #[serde(rename = "P-384")]
    P384,
    /// P-521 Curve.
    #[serde(rename = "P-521")]
    P521,
    /// Ed25519 Curve.
    #[serde(rename = "Ed25519")]
    Ed25519,
}

/// Usage restriction (`use`) of a JSON Web Key.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(from = "String", into = "String")]
#[non_exhaustive]
pub enum JsonWebKeyUse {
    /// Key may be used for digital signatures.
    Signature,
    /// Key may be used for encryption.
    Encryption,
    /// Fallback case for other key uses.
    Other(String),
}

impl JsonWebKeyUse {
    /// Returns false only for encryption keys. Unregistered values (e.g., `sign`) don't rule out
    /// signatures.
    pub fn allows_signature(&self) -> bool {
        !matches!(*self, JsonWebKeyUse::Encryption)
    }
}

impl From<String> for JsonWebKeyUse {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sig" => JsonWebKeyUse::Signature,
            "enc" => JsonWebKeyUse::Encryption,
            _ => JsonWebKeyUse::Other(value),
        }
    }
}

impl From<JsonWebKeyUse> for String {
    fn from(value: JsonWebKeyUse) -> Self {
        match value {
            JsonWebKeyUse::Signature => "sig".to_string(),
            JsonWebKeyUse::Encryption => "enc".to_string(),
            JsonWebKeyUse::Other(other) => other,
        }
    }
}

// Section 4 of RFC 7517 allows key types to reuse member names with different meanings, and
// unknown members must be ignored. Fields that fail to deserialize are therefore set to None
// rather than rejecting the key.
/// Public key expressed as a JSON Web Key.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct JsonWebKey {
    pub(crate) kty: JsonWebKeyType,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub(crate) use_: Option<JsonWebKeyUse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) kid: Option<JsonWebKeyId>,

    /// The algorithm intended to be used with this key (see
    /// [RFC 7517](https://www.rfc-editor.org/rfc/rfc7517#section-4.4)). Kept as a raw string
    /// since it may name a JWE algorithm.
    #[serde(
        default,
        deserialize_with = "deserialize_option_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) alg: Option<String>,

    // RSA
    #[serde(
        default,
        deserialize_with = "deserialize_option_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) n: Option<Base64UrlEncodedBytes>,
    #[serde(
        default,
        deserialize_with = "deserialize_option_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) e: Option<Base64UrlEncodedBytes>,

    // Elliptic curve and octet key pair
    #[serde(
        default,
        deserialize_with = "deserialize_option_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) crv: Option<JsonCurveType>,
    #[serde(
        default,
        deserialize_with = "deserialize_option_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) x: Option<Base64UrlEncodedBytes>,
    #[serde(
        default,
        deserialize_with = "deserialize_option_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) y: Option<Base64UrlEncodedBytes>,
}

impl JsonWebKey {
    /// Instantiate a new RSA public key from the raw modulus (`n`) and public exponent (`e`),
    /// along with an optional (but recommended) key ID.
    pub fn new_rsa(n: Vec<u8>, e: Vec<u8>, kid: Option<JsonWebKeyId>) -> Self {
        Self {
            kty: JsonWebKeyType::RSA,
            use_: Some(JsonWebKeyUse::Signature),
            kid,
            alg: None,
            n: Some(Base64UrlEncodedBytes::new(n)),
            e: Some(Base64UrlEncodedBytes::new(e)),
            crv: None,
            x: None,
            y: None,
        }
    }

    /// Instantiate a new EC public key from the raw affine coordinates of a point on `crv`.
    pub fn new_ec(
        x: Vec<u8>,
        y: Vec<u8>,
        crv: JsonCurveType,
        kid: Option<JsonWebKeyId>,
    ) -> Self {
        Self {
            kty: JsonWebKeyType::EllipticCurve,
            use_: Some(JsonWebKeyUse::Signature),
            kid,
            alg: None,
            n: None,
            e: None,
            crv: Some(crv),
            x: Some(Base64UrlEncodedBytes::new(x)),
            y: Some(Base64UrlEncodedBytes::new(y)),
        }
    }

    /// Instantiate a new Octet Key-Pair public key from the raw public key bytes (`x`).
    pub fn new_okp(x: Vec<u8>, crv: JsonCurveType, kid: Option<JsonWebKeyId>) -> Self {
        Self {
            kty: JsonWebKeyType::OctetKeyPair,
            use_: Some(JsonWebKeyUse::Signature),
            kid,
            alg: None,
            n: None,
            e: None,
            crv: Some(crv),
            x: Some(Base64UrlEncodedBytes::new(x)),
            y: None,
        }
    }

    /// Restricts the key to a single algorithm (the JWK `alg` member).
    pub fn set_alg(mut self, alg: SigningAlgorithm) -> Self {
        self.alg = Some(alg.as_str().to_string());
        self
    }

    /// Returns the key ID, if any.
    pub fn key_id(&self) -> Option<&JsonWebKeyId> {
        self.kid.as_ref()
    }

    /// Returns the key type.
    pub fn key_type(&self) -> &JsonWebKeyType {
        &self.kty
    }

    /// Returns the key usage restriction, if any.
    pub fn key_use(&self) -> Option<&JsonWebKeyUse> {
        self.use_.as_ref()
    }

    /// Returns the curve of an elliptic curve or octet key pair key.
    pub fn curve(&self) -> Option<&JsonCurveType> {
        self.crv.as_ref()
    }

    /// Returns the JWK `alg` member, if any.
    pub fn algorithm(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    /// Verifies `signature` over `message` using this key and `signature_alg`.
    pub fn verify_signature(
        &self,
        signature_alg: SigningAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureVerificationError> {
        check_key_compatibility(self, signature_alg)
            .map_err(|e| SignatureVerificationError::InvalidKey(e.to_owned()))?;

        match signature_alg {
            SigningAlgorithm::Rs256 => verify_rsa_signature(
                self,
                rsa::Pkcs1v15Sign::new::<sha2::Sha256>(),
                &sha2::Sha256::digest(message),
                signature,
            ),
            SigningAlgorithm::Rs384 => verify_rsa_signature(
                self,
                rsa::Pkcs1v15Sign::new::<sha2::Sha384>(),
                &sha2::Sha384::digest(message),
                signature,
            ),
            SigningAlgorithm::Rs512 => verify_rsa_signature(
                self,
                rsa::Pkcs1v15Sign::new::<sha2::Sha512>(),
                &sha2::Sha512::digest(message),
                signature,
            ),
            SigningAlgorithm::Ps256 => verify_rsa_signature(
                self,
                rsa::Pss::new::<sha2::Sha256>(),
                &sha2::Sha256::digest(message),
                signature,
            ),
            SigningAlgorithm::Ps384 => verify_rsa_signature(
                self,
                rsa::Pss::new::<sha2::Sha384>(),
                &sha2::Sha384::digest(message),
                signature,
            ),
            SigningAlgorithm::Ps512 => verify_rsa_signature(
                self,
                rsa::Pss::new::<sha2::Sha512>(),
                &sha2::Sha512::digest(message),
                signature,
            ),
            SigningAlgorithm::Es256 => {
                let sec1 = ec_public_key_sec1(self, 32)?;
                let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                    .map_err(|_| invalid_key("invalid P-256 public key"))?;
                let signature = p256::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| bad_signature())?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| bad_signature())
            }
            SigningAlgorithm::Es384 => {
                let sec1 = ec_public_key_sec1(self, 48)?;
                let verifying_key = p384::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                    .map_err(|_| invalid_key("invalid P-384 public key"))?;
                let signature = p384::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| bad_signature())?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| bad_signature())
            }
            SigningAlgorithm::Es512 => {
                let sec1 = ec_public_key_sec1(self, 66)?;
                let verifying_key = p521::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                    .map_err(|_| invalid_key("invalid P-521 public key"))?;
                let signature = p521::ecdsa::Signature::from_slice(signature)
                    .map_err(|_| bad_signature())?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| bad_signature())
            }
            SigningAlgorithm::EdDsa => {
                let x = self
                    .x
                    .as_ref()
                    .ok_or_else(|| invalid_key("OKP public key `x` is missing"))?;
                let public_key: &[u8; ed25519_dalek::PUBLIC_KEY_LENGTH] = x
                    .as_ref()
                    .try_into()
                    .map_err(|_| invalid_key("invalid Ed25519 public key length"))?;
                let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(public_key)
                    .map_err(|_| invalid_key("invalid Ed25519 public key"))?;
                let signature =
                    ed25519_dalek::Signature::from_slice(signature).map_err(|_| bad_signature())?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| bad_signature())
            }
        }
    }
}

fn invalid_key(msg: &str) -> SignatureVerificationError {
    SignatureVerificationError::InvalidKey(msg.to_string())
}

fn bad_signature() -> SignatureVerificationError {
    SignatureVerificationError::SignatureInvalid("bad signature".to_string())
}

fn verify_rsa_signature<S>(
    key: &JsonWebKey,
    scheme: S,
    hashed: &[u8],
    signature: &[u8],
) -> Result<(), SignatureVerificationError>
where
    S: rsa::traits::SignatureScheme,
{
    let n = key
        .n
        .as_ref()
        .ok_or_else(|| invalid_key("RSA modulus `n` is missing"))?;
    let e = key
        .e
        .as_ref()
        .ok_or_else(|| invalid_key("RSA exponent `e` is missing"))?;

    let public_key = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(n.as_ref()),
        rsa::BigUint::from_bytes_be(e.as_ref()),
    )
    .map_err(|err| SignatureVerificationError::InvalidKey(err.to_string()))?;

    public_key
        .verify(scheme, hashed, signature)
        .map_err(|_| bad_signature())
}

// Returns the uncompressed SEC1 encoding of an EC public key, left-padding coordinates that were
// encoded without leading zero bytes.
fn ec_public_key_sec1(
    key: &JsonWebKey,
    coordinate_len: usize,
) -> Result<Vec<u8>, SignatureVerificationError> {
    let x = key
        .x
        .as_ref()
        .ok_or_else(|| invalid_key("EC `x` coordinate is missing"))?;
    let y = key
        .y
        .as_ref()
        .ok_or_else(|| invalid_key("EC `y` coordinate is missing"))?;

    let mut sec1 = Vec::with_capacity(1 + 2 * coordinate_len);
    sec1.push(0x04);
    let coordinates: [&[u8]; 2] = [x.as_ref(), y.as_ref()];
    for coordinate in coordinates {
        if coordinate.len() > coordinate_len {
            return Err(invalid_key("EC coordinate is too long for curve"));
        }
        sec1.resize(sec1.len() + coordinate_len - coordinate.len(), 0);
        sec1.extend_from_slice(coordinate);
    }
    Ok(sec1)
}
