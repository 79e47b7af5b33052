//! Built-in content codecs

use serde_json::Value;

use crate::{Error, Result};

/// Converts between in-memory values and wire bytes for one media type
pub trait ContentCodec: Send + Sync {
    /// Normalized media type this codec is registered under
    fn media_type(&self) -> &str;

    /// Encode a value
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be represented in this format
    fn value_to_bytes(&self, value: &Value) -> Result<Vec<u8>>;

    /// Decode a payload
    ///
    /// # Errors
    ///
    /// Returns error if the payload is malformed for this format
    fn bytes_to_value(&self, bytes: &[u8]) -> Result<Value>;
}

/// `application/json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ContentCodec for JsonCodec {
    fn media_type(&self) -> &str {
        "application/json"
    }

    fn value_to_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn bytes_to_value(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(bytes).map_err(|e| Error::codec(self.media_type(), e))
    }
}

/// `text/plain`
///
/// Strings travel as their UTF-8 bytes and are the only values that survive a
/// round trip. Other values are rendered as JSON text and decode as that text,
/// so `42` comes back as `"42"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl ContentCodec for TextCodec {
    fn media_type(&self) -> &str {
        "text/plain"
    }

    fn value_to_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(match value {
            Value::String(s) => s.as_bytes().to_vec(),
            other => other.to_string().into_bytes(),
        })
    }

    fn bytes_to_value(&self, bytes: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::codec(self.media_type(), e))?;
        Ok(Value::String(text.to_string()))
    }
}

/// `application/octet-stream`
///
/// Decodes to an array of byte values, which are the only values that survive
/// a round trip. Strings are also accepted and sent raw, and null is sent as an
/// empty body; both decode as byte arrays (`"ab"` as `[97, 98]`, null as `[]`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OctetStreamCodec;

impl ContentCodec for OctetStreamCodec {
    fn media_type(&self) -> &str {
        "application/octet-stream"
    }

    fn value_to_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| Error::codec(self.media_type(), "array item is not a byte"))
                })
                .collect(),
            other => Err(Error::codec(
                self.media_type(),
                format!("cannot encode {other} as bytes"),
            )),
        }
    }

    fn bytes_to_value(&self, bytes: &[u8]) -> Result<Value> {
        Ok(Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()))
    }
}

/// `application/cbor`
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl ContentCodec for CborCodec {
    fn media_type(&self) -> &str {
        "application/cbor"
    }

    fn value_to_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf).map_err(|e| Error::codec(self.media_type(), e))?;
        Ok(buf)
    }

    fn bytes_to_value(&self, bytes: &[u8]) -> Result<Value> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        ciborium::de::from_reader(bytes).map_err(|e| Error::codec(self.media_type(), e))
    }
}
