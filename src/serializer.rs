//! Conversion of instances and solutions to a transport-safe text form and back.
//!
//! Every value crossing the wire is a [`SerializedPayload`]: the text `content` plus the
//! [`Encoding`] that says how to read it. Two encodings exist:
//!
//! - `json`: human-readable JSON, produced when the type exposes a JSON capability
//! - `pickle`: an opaque, self-describing binary snapshot (CBOR), base64-encoded so it
//!   fits in a JSON string field
//!
//! Types opt into the JSON tiers through the [`Serializable`] trait. A type that
//! implements the trait without overriding anything is always sent as `pickle`.
//!
//! ```
//! use algobench::serializer::{decode, encode, Encoding, Serializable};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Tour {
//!     cities: Vec<u32>,
//! }
//!
//! impl Serializable for Tour {
//!     const JSON_MODEL: bool = true;
//! }
//!
//! let tour = Tour { cities: vec![0, 2, 1] };
//! let payload = encode(&tour).unwrap();
//! assert_eq!(payload.encoding, Encoding::Json);
//! assert_eq!(payload.content, r#"{"cities":[0,2,1]}"#);
//! assert_eq!(decode::<Tour>(&payload).unwrap(), tour);
//! ```

use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{trace, warn};

/// Errors raised while encoding or decoding a payload.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The payload names an encoding other than `json` or `pickle`.
    #[error("unknown encoding '{0}'")]
    UnknownEncoding(String),
    /// JSON text could not be produced or parsed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// The binary snapshot could not be produced.
    #[error("binary: {0}")]
    BinaryEncode(#[from] ciborium::ser::Error<std::io::Error>),
    /// The binary snapshot could not be read back.
    #[error("binary: {0}")]
    Binary(#[from] ciborium::de::Error<std::io::Error>),
    /// The `pickle` content is not valid base64.
    #[error("base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A user-provided `from_json` factory failed.
    #[error("{0}")]
    Custom(anyhow::Error),
}

/// How the `content` of a [`SerializedPayload`] must be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Encoding {
    /// Self-describing JSON text.
    Json,
    /// Base64 of an opaque binary snapshot.
    Pickle,
}

impl Encoding {
    /// Wire name of the encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Pickle => "pickle",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Encoding::Json),
            "pickle" => Ok(Encoding::Pickle),
            other => Err(SerializationError::UnknownEncoding(other.to_owned())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = SerializationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Encoding> for String {
    fn from(value: Encoding) -> Self {
        value.as_str().to_owned()
    }
}

/// Text content together with the encoding needed to read it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPayload {
    /// JSON text or base64 text, depending on `encoding`.
    pub content: String,
    /// Decoding rule for `content`.
    pub encoding: Encoding,
}

impl SerializedPayload {
    /// Payload holding JSON text.
    pub fn json(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            encoding: Encoding::Json,
        }
    }

    /// Payload holding base64-encoded binary content.
    pub fn pickle(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            encoding: Encoding::Pickle,
        }
    }
}

/// Capability interface of every value that can be uploaded.
///
/// The serde bounds guarantee the binary fallback. The two JSON tiers are opt-in:
///
/// - set [`JSON_MODEL`](Serializable::JSON_MODEL) when the serde representation is the
///   canonical JSON form of the type
/// - override [`to_json`](Serializable::to_json) and
///   [`from_json`](Serializable::from_json) for a hand-written JSON mapping
pub trait Serializable: Serialize + DeserializeOwned {
    /// The serde representation doubles as the JSON form of the type.
    const JSON_MODEL: bool = false;

    /// Custom JSON view of the value. `None` means the type has no such view.
    fn to_json(&self) -> Option<serde_json::Value> {
        None
    }

    /// Custom factory reading the JSON text produced by [`to_json`](Serializable::to_json).
    /// `None` means the type has no such factory.
    fn from_json(_content: &str) -> Option<anyhow::Result<Self>> {
        None
    }
}

macro_rules! json_model {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Serializable for $ty {
                const JSON_MODEL: bool = true;
            }
        )*
    };
}

json_model!(
    bool, char, String, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32,
    f64,
);

impl<T: Serializable> Serializable for Vec<T> {
    const JSON_MODEL: bool = T::JSON_MODEL;
}

impl<T: Serializable> Serializable for Option<T> {
    const JSON_MODEL: bool = T::JSON_MODEL;
}

/// Converts `value` to a payload, preferring JSON and falling back to the binary form.
///
/// JSON produced by the serde model must parse back into `T`, otherwise the next tier is
/// tried. This catches lossy output such as non-finite floats written as `null`.
///
/// # Errors
/// Only when the binary snapshot itself fails or does not read back into `T`, which
/// requires a `Serialize` impl that disagrees with its `Deserialize` impl.
pub fn encode<T: Serializable>(value: &T) -> Result<SerializedPayload, SerializationError> {
    if T::JSON_MODEL {
        match serde_json::to_string(value) {
            Ok(content) => match serde_json::from_str::<T>(&content) {
                Ok(_) => return Ok(SerializedPayload::json(content)),
                Err(e) => warn!(
                    "json model of {} does not read back ({e}), trying next tier",
                    std::any::type_name::<T>()
                ),
            },
            Err(e) => warn!(
                "json model of {} failed ({e}), trying next tier",
                std::any::type_name::<T>()
            ),
        }
    }

    if let Some(json) = value.to_json() {
        return Ok(SerializedPayload::json(json.to_string()));
    }

    warn!(
        "no json capability for {}. Falling back to pickle.",
        std::any::type_name::<T>()
    );
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)?;
    ciborium::from_reader::<T, _>(bytes.as_slice())?;
    Ok(SerializedPayload::pickle(STANDARD.encode(bytes)))
}

/// Reads a payload back into a `T`.
///
/// JSON content is handed to the first capability `T` offers: the serde model, then the
/// `from_json` factory, then a structural parse of the JSON into `T`.
pub fn decode<T: Serializable>(payload: &SerializedPayload) -> Result<T, SerializationError> {
    match payload.encoding {
        Encoding::Json => {
            if T::JSON_MODEL {
                trace!("decoding json model");
                return Ok(serde_json::from_str(&payload.content)?);
            }
            if let Some(result) = T::from_json(&payload.content) {
                trace!("decoding with from_json factory");
                return result.map_err(SerializationError::Custom);
            }
            Ok(serde_json::from_str(&payload.content)?)
        }
        Encoding::Pickle => {
            let bytes = STANDARD.decode(payload.content.as_bytes())?;
            Ok(ciborium::from_reader(bytes.as_slice())?)
        }
    }
}

/// [`decode`] for an encoding that is still a raw wire string.
///
/// # Errors
/// [`SerializationError::UnknownEncoding`] when `encoding` is neither `json` nor `pickle`.
pub fn convert_from_string<T: Serializable>(
    content: &str,
    encoding: &str,
) -> Result<T, SerializationError> {
    let encoding = encoding.parse::<Encoding>()?;
    decode(&SerializedPayload {
        content: content.to_owned(),
        encoding,
    })
}

/// Parses a `json` payload without reconstructing any type.
pub fn decode_raw(payload: &SerializedPayload) -> Result<serde_json::Value, SerializationError> {
    match payload.encoding {
        Encoding::Json => Ok(serde_json::from_str(&payload.content)?),
        Encoding::Pickle => Err(SerializationError::Custom(anyhow::anyhow!(
            "pickle content has no untyped form"
        ))),
    }
}

#[cfg(test)]
mod serializer_tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct ModelValue {
        value: i64,
    }

    impl Serializable for ModelValue {
        const JSON_MODEL: bool = true;
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct CustomJson {
        value: i64,
    }

    impl Serializable for CustomJson {
        fn to_json(&self) -> Option<serde_json::Value> {
            Some(json!({ "value": self.value }))
        }

        fn from_json(content: &str) -> Option<anyhow::Result<Self>> {
            Some((|| -> anyhow::Result<Self> {
                let data: serde_json::Value = serde_json::from_str(content)?;
                let value = data["value"]
                    .as_i64()
                    .ok_or_else(|| anyhow::anyhow!("missing value"))?;
                Ok(CustomJson { value: value * 100 })
            })())
        }
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Inner {
        value: i32,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Opaque {
        non_serializable: Inner,
        tags: Vec<String>,
    }

    impl Serializable for Opaque {}

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct PlainStruct {
        value: i32,
    }

    impl Serializable for PlainStruct {}

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct BadKeys {
        map: HashMap<(u8, u8), u8>,
    }

    impl Serializable for BadKeys {
        const JSON_MODEL: bool = true;
    }

    #[test]
    fn json_model_is_compact_json() {
        let payload = encode(&ModelValue { value: 1 }).unwrap();
        assert_eq!(payload.content, r#"{"value":1}"#);
        assert_eq!(payload.encoding, Encoding::Json);
    }

    #[test]
    fn custom_to_json_is_used() {
        let payload = encode(&CustomJson { value: 1 }).unwrap();
        assert_eq!(payload.content, r#"{"value":1}"#);
        assert_eq!(payload.encoding, Encoding::Json);
    }

    #[test]
    fn from_json_factory_takes_precedence_over_structural_parse() {
        let decoded: CustomJson = decode(&SerializedPayload::json(r#"{"value":2}"#)).unwrap();
        assert_eq!(decoded, CustomJson { value: 200 });
    }

    #[test]
    fn no_capability_falls_back_to_pickle() {
        let value = Opaque {
            non_serializable: Inner { value: 3 },
            tags: vec!["a".into()],
        };
        let payload = encode(&value).unwrap();
        assert_eq!(payload.encoding, Encoding::Pickle);
        let mut bytes = Vec::new();
        ciborium::into_writer(&value, &mut bytes).unwrap();
        assert_eq!(payload.content, STANDARD.encode(bytes));
        assert_eq!(decode::<Opaque>(&payload).unwrap(), value);
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Route {
        length: f64,
    }

    impl Serializable for Route {
        const JSON_MODEL: bool = true;
    }

    #[test]
    fn non_finite_floats_fall_back_to_pickle() {
        let route = Route {
            length: f64::INFINITY,
        };
        let payload = encode(&route).unwrap();
        assert_eq!(payload.encoding, Encoding::Pickle);
        assert_eq!(decode::<Route>(&payload).unwrap(), route);

        let payload = encode(&Route { length: f64::NAN }).unwrap();
        assert_eq!(payload.encoding, Encoding::Pickle);
        assert!(decode::<Route>(&payload).unwrap().length.is_nan());

        let finite = encode(&Route { length: 2.5 }).unwrap();
        assert_eq!(finite, SerializedPayload::json(r#"{"length":2.5}"#));
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Sparse {
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<u32>,
        size: u32,
    }

    impl Serializable for Sparse {}

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    #[serde(untagged)]
    enum Move {
        Swap { from: usize, to: usize },
        Drop(usize),
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Meta {
        extra: serde_json::Value,
        #[serde(flatten)]
        fields: HashMap<String, u32>,
        moves: Vec<Move>,
    }

    impl Serializable for Meta {}

    #[test]
    fn pickle_reads_back_serde_attributes() {
        let sparse = Sparse { hint: None, size: 7 };
        let payload = encode(&sparse).unwrap();
        assert_eq!(payload.encoding, Encoding::Pickle);
        assert_eq!(decode::<Sparse>(&payload).unwrap(), sparse);

        let meta = Meta {
            extra: json!({ "a": 1, "b": [true, null] }),
            fields: HashMap::from([("depth".to_owned(), 3)]),
            moves: vec![Move::Swap { from: 0, to: 2 }, Move::Drop(1)],
        };
        let payload = encode(&meta).unwrap();
        assert_eq!(payload.encoding, Encoding::Pickle);
        assert_eq!(decode::<Meta>(&payload).unwrap(), meta);
    }

    #[test]
    fn pickle_round_trip_keeps_fields() {
        let payload = encode(&PlainStruct { value: 3 }).unwrap();
        let decoded: PlainStruct = decode(&payload).unwrap();
        assert_eq!(decoded.value, 3);
    }

    #[test]
    fn failing_json_model_falls_back_to_pickle() {
        let mut map = HashMap::new();
        map.insert((1, 2), 3);
        let value = BadKeys { map };
        let payload = encode(&value).unwrap();
        assert_eq!(payload.encoding, Encoding::Pickle);
        assert_eq!(decode::<BadKeys>(&payload).unwrap(), value);
    }

    #[test]
    fn plain_json_is_parsed_structurally() {
        let decoded: PlainStruct = decode(&SerializedPayload::json(r#"{"value":7}"#)).unwrap();
        assert_eq!(decoded, PlainStruct { value: 7 });
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        let err = convert_from_string::<ModelValue>("{}", "xml").unwrap_err();
        assert!(matches!(err, SerializationError::UnknownEncoding(name) if name == "xml"));
    }

    #[test]
    fn unknown_encoding_is_rejected_on_the_wire() {
        let err = serde_json::from_str::<SerializedPayload>(r#"{"content":"x","encoding":"yaml"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown encoding 'yaml'"));
    }

    #[test]
    fn convert_from_string_reads_both_encodings() {
        let value: ModelValue = convert_from_string(r#"{"value":4}"#, "json").unwrap();
        assert_eq!(value.value, 4);

        let pickled = encode(&PlainStruct { value: 9 }).unwrap();
        let value: PlainStruct = convert_from_string(&pickled.content, "pickle").unwrap();
        assert_eq!(value.value, 9);
    }

    #[test]
    fn corrupted_pickle_is_an_error() {
        assert!(matches!(
            decode::<PlainStruct>(&SerializedPayload::pickle("not base64!")),
            Err(SerializationError::Base64(_))
        ));
    }

    #[test]
    fn primitives_and_containers_are_json() {
        assert_eq!(encode(&10_i64).unwrap(), SerializedPayload::json("10"));
        assert_eq!(
            encode(&vec![1_u8, 2]).unwrap(),
            SerializedPayload::json("[1,2]")
        );
        assert_eq!(
            encode(&vec![PlainStruct { value: 1 }]).unwrap().encoding,
            Encoding::Pickle
        );
    }

    #[test]
    fn raw_decode_keeps_json_untyped() {
        let raw = decode_raw(&SerializedPayload::json(r#"{"value":[1,2]}"#)).unwrap();
        assert_eq!(raw, json!({ "value": [1, 2] }));
        assert!(decode_raw(&SerializedPayload::pickle("AA==")).is_err());
    }
}
