//! Runtime argument values.
//!
//! Every argument passed to a service method is a [`Value`]. Scalars, ordered
//! sequences and string-keyed maps describe the structural shape of an
//! argument; composite objects are maps whose entries are their members in
//! declaration order. Any [`serde::Serialize`] type can be converted with
//! [`Value::from_serialize`].

use std::{
    any::Any,
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use http::HeaderValue;
use serde::Serialize;
use serde_json::Number;
use snafu::{ResultExt as _, Snafu};
use tokio::io::{AsyncRead, AsyncReadExt as _};

/// A runtime argument value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absence of a value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(Number),
    /// A string.
    String(String),
    /// An ordered collection, expanded with index suffixes when flattened.
    Seq(Vec<Value>),
    /// Ordered string-keyed entries: maps and composite objects.
    Map(Vec<(String, Value)>),
    /// A file, byte buffer, or stream destined for a multipart body.
    Part(Part),
    /// An already-encoded request body, passed through unchanged.
    Raw(RawBody),
    /// An opaque per-call value, attached to the request as a tag.
    Tag(Tag),
}

impl Value {
    /// Converts a serializable value into a [`Value`], preserving member order.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, ToValueError> {
        let json = serde_json::to_value(value).context(ToValueSnafu)?;
        Ok(Self::from(json))
    }

    /// Builds a composite value from `(member, value)` pairs.
    pub fn object<K: Into<String>>(members: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(
            members
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Builds a sequence value.
    pub fn seq(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::Seq(items.into_iter().map(Into::into).collect())
    }

    /// A file part read from `path` when the request is built.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::Part(Part::new(PartData::File(path.into())))
    }

    /// A byte-buffer part.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Part(Part::new(PartData::Bytes(data.into())))
    }

    /// A stream part, read to the end when the request is built.
    pub fn stream(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Part(Part::new(PartData::Stream(BodyStream::new(reader))))
    }

    /// An opaque tag value.
    pub fn tag<T: Any + Send + Sync>(value: T) -> Self {
        Self::Tag(Tag(Arc::new(value)))
    }

    /// Returns `true` if this is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the textual form of a scalar value.
    #[must_use]
    pub fn as_scalar_text(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Number(n) => Some(n.to_string()),
            Self::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// A short name for the kind of value, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Seq(_) => "sequence",
            Self::Map(_) => "map",
            Self::Part(part) => match part.data {
                PartData::File(_) => "file",
                PartData::Bytes(_) => "bytes",
                PartData::Stream(_) => "stream",
            },
            Self::Raw(_) => "raw body",
            Self::Tag(_) => "tag",
        }
    }

    /// Converts into a JSON tree for the body codec.
    ///
    /// Returns `None` for values that have no structural representation
    /// (parts, raw bodies, tags).
    pub(crate) fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Seq(items) => serde_json::Value::Array(
                items.iter().map(Self::to_json).collect::<Option<_>>()?,
            ),
            Self::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Some((k.clone(), v.to_json()?)))
                    .collect::<Option<_>>()?,
            ),
            Self::Part(_) | Self::Raw(_) | Self::Tag(_) => return None,
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Seq(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::Number(Number::from(value))
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::seq(value)
    }
}

impl From<Part> for Value {
    fn from(value: Part) -> Self {
        Self::Part(value)
    }
}

impl From<RawBody> for Value {
    fn from(value: RawBody) -> Self {
        Self::Raw(value)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Errors converting a serializable value into a [`Value`].
#[derive(Debug, Snafu)]
#[snafu(display("Failed to convert argument into a value"))]
pub struct ToValueError {
    source: serde_json::Error,
}

impl crate::Error for ToValueError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// A multipart-destined value with optional name and filename overrides.
///
/// Inside a composite value, a part is emitted as a single form field
/// without further recursion; its `name`, when set, replaces the member name.
#[derive(Debug, Clone)]
pub struct Part {
    pub(crate) name: Option<String>,
    pub(crate) filename: Option<String>,
    pub(crate) data: PartData,
}

impl Part {
    /// Creates an unnamed part.
    #[must_use]
    pub fn new(data: PartData) -> Self {
        Self {
            name: None,
            filename: None,
            data,
        }
    }

    /// Overrides the field name used for this part.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the filename reported for this part.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Returns the part payload.
    #[must_use]
    pub fn data(&self) -> &PartData {
        &self.data
    }
}

/// The payload of a [`Part`].
#[derive(Debug, Clone)]
pub enum PartData {
    /// A file on disk.
    File(PathBuf),
    /// An in-memory byte buffer.
    Bytes(Bytes),
    /// An asynchronous stream, consumed once.
    Stream(BodyStream),
}

impl PartData {
    /// Reads the whole payload into memory.
    pub(crate) async fn read(&self) -> std::io::Result<Bytes> {
        match self {
            Self::File(path) => tokio::fs::read(path).await.map(Bytes::from),
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Stream(stream) => stream.read_to_end().await,
        }
    }

    /// The filename implied by the payload itself.
    pub(crate) fn implied_filename(&self) -> Option<String> {
        match self {
            Self::File(path) => file_name(path),
            Self::Bytes(_) | Self::Stream(_) => None,
        }
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

type SharedReader = Arc<Mutex<Option<Box<dyn AsyncRead + Send + Unpin>>>>;

/// A one-shot asynchronous byte stream.
///
/// Clones share the same underlying reader; whichever clone reads first
/// consumes it.
#[derive(Clone)]
pub struct BodyStream {
    reader: SharedReader,
}

impl BodyStream {
    /// Wraps an asynchronous reader.
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Arc::new(Mutex::new(Some(Box::new(reader)))),
        }
    }

    /// Takes the underlying reader, leaving the stream consumed.
    ///
    /// Returns `None` if another clone already took it.
    #[must_use]
    pub fn take(&self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        self.reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    /// Reads the remaining bytes of the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the stream was already consumed.
    pub async fn read_to_end(&self) -> std::io::Result<Bytes> {
        let mut reader = self.take().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream was already consumed",
            )
        })?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream").finish_non_exhaustive()
    }
}

/// A request body that has already been encoded by the caller.
#[derive(Debug, Clone)]
pub struct RawBody {
    pub(crate) content_type: Option<HeaderValue>,
    pub(crate) bytes: Bytes,
}

impl RawBody {
    /// Creates a raw body with an optional content type.
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<HeaderValue>) -> Self {
        Self {
            content_type,
            bytes: bytes.into(),
        }
    }

    /// Returns the body bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Returns the declared content type.
    #[must_use]
    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }
}

/// An opaque shared value attached to the outgoing request.
#[derive(Clone)]
pub struct Tag(pub(crate) Arc<dyn Any + Send + Sync>);

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tag").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Profile {
        name: &'static str,
        tags: Vec<&'static str>,
        nickname: Option<&'static str>,
        age: u32,
    }

    #[test]
    fn test_from_serialize_preserves_member_order() {
        let value = Value::from_serialize(&Profile {
            name: "x",
            tags: vec!["a", "b"],
            nickname: None,
            age: 7,
        })
        .unwrap();

        let Value::Map(entries) = value else {
            unreachable!("expected map, got {value:?}");
        };
        let names: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["name", "tags", "nickname", "age"]);
        assert!(entries[2].1.is_null());
        assert_eq!(entries[3].1.as_scalar_text().as_deref(), Some("7"));
    }

    #[test]
    fn test_to_json_rejects_parts() {
        assert!(Value::bytes(&b"abc"[..]).to_json().is_none());
        let json = Value::object([("a", Value::from(1)), ("b", Value::seq(["x"]))])
            .to_json()
            .unwrap();
        assert_eq!(json, serde_json::json!({"a": 1, "b": ["x"]}));
    }

    #[tokio::test]
    async fn test_stream_is_consumed_once() {
        let stream = BodyStream::new(&b"hello"[..]);
        let shared = stream.clone();
        assert_eq!(stream.read_to_end().await.unwrap(), Bytes::from_static(b"hello"));
        assert!(shared.read_to_end().await.is_err());
    }
}
