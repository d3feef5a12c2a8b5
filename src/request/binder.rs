//! Per-parameter binding strategies.
//!
//! A [`Binder`] is selected once per parameter when a method is compiled and
//! reused for every call. Applying it converts one runtime argument into
//! contributions on the call's [`Accumulator`]. Values are percent-encoded
//! here, as they are bound, unless the parameter is marked `encoded`.

use http::{HeaderName, HeaderValue};
use snafu::{OptionExt as _, ResultExt as _, ensure};

use super::{
    accumulator::{Accumulator, BodyContent, PendingBody},
    encoding::encode_component,
    error::{
        EmptyMapKeySnafu, EmptyPathSnafu, EncodeSnafu, FlattenSnafu, InvalidHeaderNameSnafu,
        InvalidHeaderValueSnafu, MissingValueSnafu, NotAMapSnafu, NullMapValueSnafu,
        ParameterError, PartInFormSnafu, UnsupportedTypeSnafu,
    },
};
use crate::{
    contract::{Role, TagKind, insert_tag},
    convert::{BodyCodec, FormField, FormFieldConverter, StringConverter},
    value::Value,
};

/// The converters available to binders.
pub(crate) struct BindContext<'a> {
    pub(crate) strings: &'a dyn StringConverter,
    pub(crate) fields: &'a dyn FormFieldConverter,
    pub(crate) codec: &'a dyn BodyCodec,
}

/// One parameter's binding strategy.
#[derive(Debug, Clone)]
pub(crate) enum Binder {
    Path {
        name: String,
        default: Option<String>,
        encoded: bool,
    },
    Query {
        name: String,
        default: Option<String>,
        encoded: bool,
    },
    QueryMap {
        encoded: bool,
    },
    Header {
        name: HeaderName,
    },
    HeaderMap,
    Field {
        name: String,
        default: Option<String>,
        encoded: bool,
    },
    FieldMap {
        encoded: bool,
    },
    Multipart {
        name: String,
        filename: Option<String>,
    },
    Body,
    Binary,
    Tag(TagKind),
    /// Applies the inner binder to each element of a sequence.
    Repeated(Box<Binder>),
}

impl Binder {
    pub(crate) fn role(&self) -> Role {
        match self {
            Self::Path { .. } => Role::Path,
            Self::Query { .. } | Self::QueryMap { .. } => Role::Query,
            Self::Header { .. } | Self::HeaderMap => Role::Header,
            Self::Field { .. } | Self::FieldMap { .. } => Role::Field,
            Self::Multipart { .. } => Role::Multipart,
            Self::Body => Role::Body,
            Self::Binary => Role::Binary,
            Self::Tag(_) => Role::Tag,
            Self::Repeated(inner) => inner.role(),
        }
    }

    pub(crate) fn apply(
        &self,
        acc: &mut Accumulator,
        value: &Value,
        cx: &BindContext<'_>,
    ) -> Result<(), ParameterError> {
        match self {
            Self::Path {
                name,
                default,
                encoded,
            } => {
                let text = match value {
                    Value::Null => default.clone().context(MissingValueSnafu {
                        role: Role::Path,
                        name,
                    })?,
                    other => cx.strings.convert(other).context(UnsupportedTypeSnafu {
                        role: Role::Path,
                        name,
                        kind: other.kind(),
                    })?,
                };
                ensure!(!text.is_empty(), EmptyPathSnafu { name });
                acc.set_path_param(name, encode_component(&text, *encoded).into_owned());
                Ok(())
            }
            Self::Query {
                name,
                default,
                encoded,
            } => {
                let fields = cx
                    .fields
                    .convert(name, value, default.as_deref(), *encoded)
                    .context(FlattenSnafu { role: Role::Query })?;
                add_query_fields(acc, fields)
            }
            Self::QueryMap { encoded } => {
                for (key, item) in map_entries(Role::Query, value)? {
                    ensure!(
                        !item.is_null(),
                        NullMapValueSnafu {
                            role: Role::Query,
                            key
                        }
                    );
                    let fields = cx
                        .fields
                        .convert(key, item, None, *encoded)
                        .context(FlattenSnafu { role: Role::Query })?;
                    add_query_fields(acc, fields)?;
                }
                Ok(())
            }
            Self::Header { name } => {
                let text = header_text(name.as_str(), value, cx)?;
                let header_value =
                    HeaderValue::from_str(&text).context(InvalidHeaderValueSnafu { name: name.as_str() })?;
                acc.set_header(name.clone(), header_value);
                Ok(())
            }
            Self::HeaderMap => {
                for (key, item) in map_entries(Role::Header, value)? {
                    ensure!(!key.is_empty(), EmptyMapKeySnafu { role: Role::Header });
                    let name = HeaderName::from_bytes(key.as_bytes())
                        .context(InvalidHeaderNameSnafu { name: key })?;
                    let text = header_text(key, item, cx)?;
                    let header_value =
                        HeaderValue::from_str(&text).context(InvalidHeaderValueSnafu { name: key })?;
                    acc.set_header(name, header_value);
                }
                Ok(())
            }
            Self::Field {
                name,
                default,
                encoded,
            } => {
                let fields = cx
                    .fields
                    .convert(name, value, default.as_deref(), *encoded)
                    .context(FlattenSnafu { role: Role::Field })?;
                add_form_fields(acc, fields)
            }
            Self::FieldMap { encoded } => {
                for (key, item) in map_entries(Role::Field, value)? {
                    ensure!(
                        !item.is_null(),
                        NullMapValueSnafu {
                            role: Role::Field,
                            key
                        }
                    );
                    let fields = cx
                        .fields
                        .convert(key, item, None, *encoded)
                        .context(FlattenSnafu { role: Role::Field })?;
                    add_form_fields(acc, fields)?;
                }
                Ok(())
            }
            Self::Multipart { name, filename } => match value {
                Value::Null => Ok(()),
                Value::Part(part) => {
                    let field_name = match &part.name {
                        Some(own) if name.is_empty() => own.clone(),
                        _ => name.clone(),
                    };
                    acc.add_field(FormField::from_part(field_name, part, filename.as_deref()));
                    Ok(())
                }
                other => UnsupportedTypeSnafu {
                    role: Role::Multipart,
                    name,
                    kind: other.kind(),
                }
                .fail(),
            },
            Self::Body => {
                let body = match value {
                    Value::Null => {
                        return MissingValueSnafu {
                            role: Role::Body,
                            name: "body",
                        }
                        .fail();
                    }
                    Value::Raw(raw) => PendingBody {
                        content: BodyContent::Bytes(raw.bytes.clone()),
                        force: raw.content_type.is_some(),
                        content_type: raw.content_type.clone(),
                    },
                    Value::String(text) => PendingBody {
                        content: BodyContent::Bytes(text.clone().into()),
                        content_type: Some(HeaderValue::from_static("text/plain; charset=utf-8")),
                        force: false,
                    },
                    Value::Part(part) => PendingBody {
                        content: BodyContent::Part(part.data.clone()),
                        content_type: Some(HeaderValue::from_static("application/octet-stream")),
                        force: false,
                    },
                    other => {
                        let json = other.to_json().context(UnsupportedTypeSnafu {
                            role: Role::Body,
                            name: "body",
                            kind: other.kind(),
                        })?;
                        PendingBody {
                            content: BodyContent::Bytes(cx.codec.encode(&json).context(EncodeSnafu)?),
                            content_type: Some(cx.codec.content_type()),
                            force: false,
                        }
                    }
                };
                acc.set_body(body);
                Ok(())
            }
            Self::Binary => match value {
                Value::Null => MissingValueSnafu {
                    role: Role::Binary,
                    name: "binary",
                }
                .fail(),
                Value::Part(part) => {
                    acc.set_body(PendingBody {
                        content: BodyContent::Part(part.data.clone()),
                        content_type: Some(HeaderValue::from_static("application/octet-stream")),
                        force: true,
                    });
                    Ok(())
                }
                other => UnsupportedTypeSnafu {
                    role: Role::Binary,
                    name: "binary",
                    kind: other.kind(),
                }
                .fail(),
            },
            Self::Tag(kind) => match value {
                Value::Null => Ok(()),
                Value::Tag(tag) if insert_tag(kind, &tag.0, acc.extensions_mut()) => Ok(()),
                other => UnsupportedTypeSnafu {
                    role: Role::Tag,
                    name: kind.type_name,
                    kind: other.kind(),
                }
                .fail(),
            },
            Self::Repeated(inner) => match value {
                Value::Null => Ok(()),
                Value::Seq(items) => items.iter().try_for_each(|item| inner.apply(acc, item, cx)),
                single => inner.apply(acc, single, cx),
            },
        }
    }
}

fn map_entries(role: Role, value: &Value) -> Result<&[(String, Value)], ParameterError> {
    match value {
        Value::Null => Ok(&[]),
        Value::Map(entries) => Ok(entries),
        other => NotAMapSnafu {
            role,
            kind: other.kind(),
        }
        .fail(),
    }
}

fn header_text(name: &str, value: &Value, cx: &BindContext<'_>) -> Result<String, ParameterError> {
    match value {
        Value::Null => Ok(String::new()),
        other => cx.strings.convert(other).context(UnsupportedTypeSnafu {
            role: Role::Header,
            name,
            kind: other.kind(),
        }),
    }
}

fn add_query_fields(acc: &mut Accumulator, fields: Vec<FormField>) -> Result<(), ParameterError> {
    for field in fields {
        match field {
            FormField::Value {
                name,
                value,
                encoded,
            } => acc.add_query(
                encode_component(&name, encoded).into_owned(),
                encode_component(&value, encoded).into_owned(),
            ),
            other => {
                return UnsupportedTypeSnafu {
                    role: Role::Query,
                    name: other.name(),
                    kind: part_kind(&other),
                }
                .fail();
            }
        }
    }
    Ok(())
}

fn add_form_fields(acc: &mut Accumulator, fields: Vec<FormField>) -> Result<(), ParameterError> {
    let url_encoded = acc.is_url_encoded();
    for field in fields {
        match field {
            FormField::Value {
                name,
                value,
                encoded,
            } if url_encoded => acc.add_field(FormField::Value {
                name: encode_component(&name, encoded).into_owned(),
                value: encode_component(&value, encoded).into_owned(),
                encoded: true,
            }),
            FormField::Value { .. } => acc.add_field(field),
            other => {
                ensure!(!url_encoded, PartInFormSnafu { name: other.name() });
                acc.add_field(other);
            }
        }
    }
    Ok(())
}

fn part_kind(field: &FormField) -> &'static str {
    match field {
        FormField::Value { .. } => "string",
        FormField::File { .. } => "file",
        FormField::Bytes { .. } => "bytes",
        FormField::Stream { .. } => "stream",
    }
}
