use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::from_value;

use std::fmt::{Display, Formatter, Result as FormatterResult};


pub(crate) fn deserialize_string_or_vec<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: serde_json::Value = Deserialize::deserialize(deserializer)?;
    match from_value::<Vec<T>>(value.clone()) {
        Ok(val) => Ok(val),
        Err(_) => {
            let single_val: T = from_value(value).map_err(Error::custom)?;
            Ok(vec![single_val])
        }
    }
}

// Attempt to deserialize the value; if the value is null or an error occurs, return None.
// JWK members are loosely specified and key types may overload each other's member names, so an
// unexpected shape is ignored rather than failing the whole key set.
pub(crate) fn deserialize_option_or_none<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    let value: serde_json::Value = Deserialize::deserialize(deserializer)?;
    match from_value::<Option<T>>(value) {
        Ok(val) => Ok(val),
        Err(_) => Ok(None),
    }
}

// Some providers (e.g., AWS Cognito) return boolean claims as the strings "true" and "false".
pub(crate) mod serde_string_bool {
    use serde::{de, Deserializer};

    use std::fmt;

    struct BooleanLikeVisitor;

    impl<'de> de::Visitor<'de> for BooleanLikeVisitor {
        type Value = bool;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a boolean-like value")
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(v)
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if v.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                Err(E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }
    }

    struct OptionalBooleanLikeVisitor;

    impl<'de> de::Visitor<'de> for OptionalBooleanLikeVisitor {
        type Value = Option<bool>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a boolean-like value or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(BooleanLikeVisitor).map(Some)
        }
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_option(OptionalBooleanLikeVisitor)
    }
}

/// Timestamp as seconds since the unix epoch, either integral or fractional.
#[derive(Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub(crate) struct Timestamp(serde_json::Number);

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter) -> FormatterResult {
        Display::fmt(&self.0, f)
    }
}

pub(crate) fn timestamp_to_utc(timestamp: &Timestamp) -> Result<DateTime<Utc>, ()> {
    let seconds = &timestamp.0;
    let (secs, nsecs) = if let Some(secs) = seconds.as_i64() {
        (secs, 0u32)
    } else {
        let secs_f64 = seconds.as_f64().ok_or(())?;
        if !secs_f64.is_finite() {
            return Err(());
        }
        let secs = secs_f64.floor();
        (
            secs as i64,
            ((secs_f64 - secs) * 1_000_000_000.).floor() as u32,
        )
    };
    Utc.timestamp_opt(secs, nsecs).single().ok_or(())
}

pub(crate) mod serde_utc_seconds_opt {
    use crate::helpers::{timestamp_to_utc, Timestamp};

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds: Option<Timestamp> = Deserialize::deserialize(deserializer)?;
        seconds
            .map(|sec| {
                timestamp_to_utc(&sec).map_err(|_| {
                    serde::de::Error::custom(format!(
                        "failed to parse `{}` as UTC datetime (in seconds)",
                        sec
                    ))
                })
            })
            .transpose()
    }
}

/// Bytes decoded from an unpadded base64url JSON string.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub(crate) struct Base64UrlEncodedBytes(#[serde(with = "serde_base64url_byte_array")] Vec<u8>);

impl Base64UrlEncodedBytes {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Base64UrlEncodedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

mod serde_base64url_byte_array {
    use base64::prelude::BASE64_URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let base64_encoded = String::deserialize(deserializer)?;

        // Some providers pad their key material even though RFC 7518 forbids it.
        BASE64_URL_SAFE_NO_PAD
            .decode(base64_encoded.trim_end_matches('='))
            .map_err(|err| {
                D::Error::custom(format!(
                    "invalid base64url encoding `{}`: {:?}",
                    base64_encoded, err
                ))
            })
    }

    pub fn serialize<S>(v: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64_URL_SAFE_NO_PAD.encode(v))
    }
}

pub(crate) fn base64_url_decode(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_URL_SAFE_NO_PAD.decode(encoded)
}

pub(crate) fn base64_url_encode<T>(bytes: T) -> String
where
    T: AsRef<[u8]>,
{
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}
