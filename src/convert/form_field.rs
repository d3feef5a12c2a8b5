use std::path::PathBuf;

use bytes::Bytes;
use snafu::Snafu;

use crate::value::{BodyStream, Part, PartData, Value};

/// One flattened leaf destined for a query string, form, or multipart body.
#[derive(Debug, Clone)]
pub enum FormField {
    /// A text value.
    Value {
        /// The qualified field name.
        name: String,
        /// The field value.
        value: String,
        /// If true, the value is already percent-encoded.
        encoded: bool,
    },
    /// A file read when the request is built.
    File {
        /// The qualified field name.
        name: String,
        /// The reported filename; defaults to the file's own name.
        filename: Option<String>,
        /// The file location.
        path: PathBuf,
    },
    /// An in-memory byte buffer.
    Bytes {
        /// The qualified field name.
        name: String,
        /// The reported filename.
        filename: Option<String>,
        /// The part content.
        bytes: Bytes,
    },
    /// A stream read when the request is built.
    Stream {
        /// The qualified field name.
        name: String,
        /// The reported filename.
        filename: Option<String>,
        /// The part content.
        stream: BodyStream,
    },
}

impl FormField {
    /// Returns the qualified field name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Value { name, .. }
            | Self::File { name, .. }
            | Self::Bytes { name, .. }
            | Self::Stream { name, .. } => name,
        }
    }

    /// Builds a part field, preferring `filename` over the part's own.
    pub(crate) fn from_part(name: String, part: &Part, filename: Option<&str>) -> Self {
        let filename = filename
            .map(str::to_owned)
            .or_else(|| part.filename.clone());
        match &part.data {
            PartData::File(path) => Self::File {
                name,
                filename: filename.or_else(|| part.data.implied_filename()),
                path: path.clone(),
            },
            PartData::Bytes(bytes) => Self::Bytes {
                name,
                filename,
                bytes: bytes.clone(),
            },
            PartData::Stream(stream) => Self::Stream {
                name,
                filename,
                stream: stream.clone(),
            },
        }
    }
}

/// The error returned when a value cannot be flattened into form fields.
#[derive(Debug, Snafu)]
#[snafu(display("Field `{name}` cannot hold a {kind} value"))]
pub struct FlattenError {
    name: String,
    kind: &'static str,
}

impl crate::Error for FlattenError {
    fn is_retryable(&self) -> bool {
        false
    }
}

fn qualify(parent: &str, member: &str) -> String {
    if parent.is_empty() {
        member.to_owned()
    } else {
        format!("{parent}.{member}")
    }
}

/// Recursively expands `value` into `out`.
///
/// Sequences expand to `name[i]`, maps and composite objects to
/// `name.member` (or `member` under an empty root). Null leaves are skipped,
/// except that a null root takes the declared default.
pub(crate) fn flatten(
    name: &str,
    value: &Value,
    default: Option<&str>,
    encoded: bool,
    out: &mut Vec<FormField>,
) -> Result<(), FlattenError> {
    match value {
        Value::Null => {
            if let Some(default) = default {
                out.push(FormField::Value {
                    name: name.to_owned(),
                    value: default.to_owned(),
                    encoded,
                });
            }
        }
        Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            out.push(FormField::Value {
                name: name.to_owned(),
                value: value.as_scalar_text().unwrap_or_default(),
                encoded,
            });
        }
        Value::Seq(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten(&format!("{name}[{index}]"), item, None, encoded, out)?;
            }
        }
        Value::Map(entries) => {
            for (member, item) in entries {
                match item {
                    Value::Null => {}
                    Value::Part(part) => {
                        let member = part.name.as_deref().unwrap_or(member);
                        out.push(FormField::from_part(qualify(name, member), part, None));
                    }
                    _ => flatten(&qualify(name, member), item, None, encoded, out)?,
                }
            }
        }
        Value::Part(part) => {
            let name = match &part.name {
                Some(own) if name.is_empty() => own.clone(),
                _ => name.to_owned(),
            };
            out.push(FormField::from_part(name, part, None));
        }
        Value::Raw(_) | Value::Tag(_) => {
            return FlattenSnafu {
                name,
                kind: value.kind(),
            }
            .fail();
        }
    }
    Ok(())
}
