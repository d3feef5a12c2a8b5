use bytes::Bytes;
use http::HeaderValue;
use snafu::{ResultExt as _, Snafu};

use crate::BoxedError;

/// Serializes request bodies and deserializes response bodies.
///
/// Codecs operate on a JSON-shaped tree so that any serialization format
/// with a serde data model can be plugged in.
pub trait BodyCodec: Send + Sync {
    /// The `Content-Type` of encoded bodies.
    fn content_type(&self) -> HeaderValue;

    /// Encodes a request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented in this format.
    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, BoxedError>;

    /// Decodes a response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed.
    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, BoxedError>;
}

/// Errors raised by [`JsonCodec`].
#[derive(Debug, Snafu)]
pub enum JsonCodecError {
    /// A request body could not be serialized.
    #[snafu(display("Failed to serialize JSON body"))]
    Serialize {
        /// The underlying error.
        source: serde_json::Error,
    },
    /// A response body could not be parsed.
    #[snafu(display("Failed to parse JSON body"))]
    Deserialize {
        /// The underlying error.
        source: serde_json::Error,
    },
}

impl crate::Error for JsonCodecError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// The default codec, backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn content_type(&self) -> HeaderValue {
        HeaderValue::from_static("application/json; charset=utf-8")
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, BoxedError> {
        let bytes: Result<_, JsonCodecError> = serde_json::to_vec(value).context(SerializeSnafu);
        Ok(Bytes::from(bytes.map_err(BoxedError::from_err)?))
    }

    fn decode(&self, body: &[u8]) -> Result<serde_json::Value, BoxedError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        let value: Result<_, JsonCodecError> = serde_json::from_slice(body).context(DeserializeSnafu);
        value.map_err(BoxedError::from_err)
    }
}
