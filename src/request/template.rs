//! The request template compiler.
//!
//! A [`RequestTemplate`] is compiled once per method from its
//! [`MethodDescriptor`], validated, and reused for every call. Validation
//! failures are [`ContractError`]s raised when the contract is loaded.

use std::{
    any::TypeId,
    collections::{HashMap, HashSet},
    sync::{Arc, LazyLock},
};

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use regex::Regex;
use snafu::{OptionExt as _, ResultExt as _, ensure};

use super::{
    binder::Binder,
    error::{
        BodyWithFormSnafu, ContractError, DuplicateTagSnafu, EncodingRequiredSnafu,
        InvalidHeaderParamSnafu, InvalidPathNameSnafu, InvalidStaticHeaderSnafu,
        MethodBaseUrlSnafu, MissingVerbSnafu, MultipleBodiesSnafu, MultipleEncodingsSnafu,
        MultipleVerbsSnafu, NonStringMapKeySnafu, QueryPlaceholderSnafu, UnboundPlaceholderSnafu,
        UnknownPlaceholderSnafu, UnsupportedShapeSnafu,
    },
};
use crate::{
    IntoBaseUrl as _,
    base_url::BaseUrl,
    contract::{
        Download, Encoding, MethodDescriptor, Param, ParamType, Returns, Role, StaticHeader,
    },
    http::{DynamicHeader, Interceptor},
};

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-zA-Z][a-zA-Z0-9_-]*)\}").expect("valid regex"));

#[allow(clippy::expect_used)]
static PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").expect("valid regex"));

/// How the request body is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No body parameter and no form encoding.
    None,
    /// A body parameter encoded by the body codec.
    Json,
    /// `application/x-www-form-urlencoded` from field parameters.
    UrlEncoded,
    /// `multipart/form-data` from field and multipart parameters.
    Multipart,
    /// A raw `application/octet-stream` body.
    Binary,
}

/// The compiled, immutable plan for one method.
pub struct RequestTemplate {
    pub(crate) method_name: Arc<str>,
    pub(crate) verb: Method,
    pub(crate) path: String,
    pub(crate) literal_query: Option<String>,
    pub(crate) base_url: Option<BaseUrl>,
    pub(crate) mode: BodyMode,
    pub(crate) headers: HeaderMap,
    pub(crate) binders: Vec<Binder>,
    pub(crate) dynamic_headers: Vec<Arc<dyn DynamicHeader>>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) net_interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) download: Option<Download>,
    pub(crate) returns: Returns,
}

impl std::fmt::Debug for RequestTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTemplate")
            .field("method_name", &self.method_name)
            .field("verb", &self.verb)
            .field("path", &self.path)
            .field("literal_query", &self.literal_query)
            .field("mode", &self.mode)
            .field("headers", &self.headers)
            .field("binders", &self.binders)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

impl RequestTemplate {
    /// Compiles and validates a method descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`ContractError`] describing the first invalid declaration.
    pub fn compile(descriptor: &MethodDescriptor) -> Result<Self, ContractError> {
        let method = descriptor.name.as_str();

        let mut routes = descriptor.routes.iter();
        let (verb, route) = routes.next().context(MissingVerbSnafu { method })?;
        if let Some((second, _)) = routes.next() {
            return MultipleVerbsSnafu {
                method,
                first: verb.clone(),
                second: second.clone(),
            }
            .fail();
        }

        ensure!(
            descriptor.encodings.len() <= 1,
            MultipleEncodingsSnafu { method }
        );
        let encoding = descriptor.encodings.first().copied();

        let (path, literal_query) = match route.split_once('?') {
            Some((path, query)) => {
                ensure!(
                    !PLACEHOLDER.is_match(query),
                    QueryPlaceholderSnafu { method, query }
                );
                (path.to_owned(), (!query.is_empty()).then(|| query.to_owned()))
            }
            None => (route.clone(), None),
        };
        let placeholders: HashSet<&str> = PLACEHOLDER
            .captures_iter(&path)
            .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
            .collect();

        let headers = static_headers(method, &descriptor.headers)?;

        let base_url = descriptor
            .base_url
            .as_deref()
            .map(|url| url.into_base_url().context(MethodBaseUrlSnafu { method }))
            .transpose()?;

        let mut mode = match encoding {
            Some(Encoding::FormUrlEncoded) => BodyMode::UrlEncoded,
            Some(Encoding::Multipart) => BodyMode::Multipart,
            None => BodyMode::None,
        };
        let mut bound_paths = HashSet::new();
        let mut tags: HashMap<TypeId, usize> = HashMap::new();
        let mut body_index = None;
        let mut binders = Vec::with_capacity(descriptor.params.len());

        for (index, param) in descriptor.params.iter().enumerate() {
            let check = ParamCheck {
                method,
                index,
                param,
            };
            match param.role {
                Role::Path => {
                    ensure!(
                        PARAM_NAME.is_match(&param.name),
                        InvalidPathNameSnafu {
                            method,
                            index,
                            name: &param.name
                        }
                    );
                    ensure!(
                        placeholders.contains(param.name.as_str()),
                        UnknownPlaceholderSnafu {
                            method,
                            path: &path,
                            name: &param.name
                        }
                    );
                    bound_paths.insert(param.name.as_str());
                }
                Role::Field => check.require(
                    matches!(
                        encoding,
                        Some(Encoding::FormUrlEncoded | Encoding::Multipart)
                    ),
                    "form or multipart",
                )?,
                Role::Multipart => {
                    check.require(encoding == Some(Encoding::Multipart), "multipart")?;
                }
                Role::Body | Role::Binary => {
                    ensure!(
                        encoding.is_none(),
                        BodyWithFormSnafu {
                            method,
                            index,
                            role: param.role
                        }
                    );
                    ensure!(body_index.is_none(), MultipleBodiesSnafu { method, index });
                    body_index = Some(index);
                    mode = if param.role == Role::Body {
                        BodyMode::Json
                    } else {
                        BodyMode::Binary
                    };
                }
                Role::Tag => {
                    if let Some(kind) = &param.tag
                        && let Some(previous) = tags.insert(kind.id, index)
                    {
                        return DuplicateTagSnafu {
                            method,
                            index,
                            previous,
                            type_name: kind.type_name,
                        }
                        .fail();
                    }
                }
                Role::Query | Role::Header => {}
            }
            binders.push(check.binder()?);
        }

        if let Some(name) = placeholders.iter().find(|name| !bound_paths.contains(*name)) {
            return UnboundPlaceholderSnafu {
                method,
                name: *name,
            }
            .fail();
        }

        Ok(Self {
            method_name: Arc::from(method),
            verb: verb.clone(),
            path,
            literal_query,
            base_url,
            mode,
            headers,
            binders,
            dynamic_headers: descriptor.dynamic_headers.clone(),
            interceptors: descriptor.interceptors.clone(),
            net_interceptors: descriptor.net_interceptors.clone(),
            download: descriptor.download.clone(),
            returns: descriptor.returns,
        })
    }

    /// The HTTP verb.
    #[must_use]
    pub fn verb(&self) -> &Method {
        &self.verb
    }

    /// The path template, without any literal query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The body mode.
    #[must_use]
    pub fn body_mode(&self) -> BodyMode {
        self.mode
    }

    /// The number of parameter binders.
    #[must_use]
    pub fn binder_count(&self) -> usize {
        self.binders.len()
    }

    /// Substitutes encoded path values into the path template.
    pub(crate) fn expand_path(&self, values: &HashMap<String, String>) -> String {
        PLACEHOLDER
            .replace_all(&self.path, |captures: &regex::Captures<'_>| {
                let whole = captures.get(0).map_or("", |m| m.as_str());
                captures
                    .get(1)
                    .and_then(|name| values.get(name.as_str()))
                    .map_or_else(|| whole.to_owned(), Clone::clone)
            })
            .into_owned()
    }
}

fn static_headers(method: &str, declared: &[StaticHeader]) -> Result<HeaderMap, ContractError> {
    let mut headers = HeaderMap::new();
    for header in declared {
        let (name, value) = match header {
            StaticHeader::Line(line) => match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => (name.trim(), value.trim()),
                _ => {
                    return InvalidStaticHeaderSnafu {
                        method,
                        header: line,
                    }
                    .fail();
                }
            },
            StaticHeader::Pair(name, value) => (name.as_str(), value.as_str()),
        };
        let invalid = || InvalidStaticHeaderSnafu {
            method,
            header: format!("{name}: {value}"),
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .ok()
            .with_context(invalid)?;
        let value = HeaderValue::from_str(value).ok().with_context(invalid)?;
        headers.append(name, value);
    }
    Ok(headers)
}

struct ParamCheck<'a> {
    method: &'a str,
    index: usize,
    param: &'a Param,
}

impl ParamCheck<'_> {
    fn require(&self, ok: bool, required: &'static str) -> Result<(), ContractError> {
        ensure!(
            ok,
            EncodingRequiredSnafu {
                method: self.method,
                index: self.index,
                role: self.param.role,
                required,
            }
        );
        Ok(())
    }

    fn unsupported(&self, shape: &'static str) -> ContractError {
        UnsupportedShapeSnafu {
            method: self.method,
            index: self.index,
            role: self.param.role,
            shape,
        }
        .build()
    }

    fn string_keys(&self) -> Result<(), ContractError> {
        if let ParamType::Map { key } = self.param.ty {
            ensure!(
                key.is_text,
                NonStringMapKeySnafu {
                    method: self.method,
                    index: self.index,
                    role: self.param.role,
                    key: key.type_name,
                }
            );
        }
        Ok(())
    }

    /// Selects the binder for the parameter's role and static shape.
    fn binder(&self) -> Result<Binder, ContractError> {
        let param = self.param;
        self.string_keys()?;

        let scalar = match param.role {
            Role::Path => Binder::Path {
                name: param.name.clone(),
                default: param.default_value.clone(),
                encoded: param.encoded,
            },
            Role::Query => match param.ty {
                ParamType::Map { .. } => {
                    return Ok(Binder::QueryMap {
                        encoded: param.encoded,
                    });
                }
                _ => Binder::Query {
                    name: param.name.clone(),
                    default: param.default_value.clone(),
                    encoded: param.encoded,
                },
            },
            Role::Header => match param.ty {
                ParamType::Map { .. } => return Ok(Binder::HeaderMap),
                _ => Binder::Header {
                    name: HeaderName::from_bytes(param.name.as_bytes())
                        .ok()
                        .context(InvalidHeaderParamSnafu {
                            method: self.method,
                            index: self.index,
                            name: &param.name,
                        })?,
                },
            },
            Role::Field => match param.ty {
                ParamType::Map { .. } => {
                    return Ok(Binder::FieldMap {
                        encoded: param.encoded,
                    });
                }
                _ => Binder::Field {
                    name: param.name.clone(),
                    default: param.default_value.clone(),
                    encoded: param.encoded,
                },
            },
            Role::Multipart => Binder::Multipart {
                name: param.name.clone(),
                filename: param.filename.clone(),
            },
            Role::Body => return Ok(Binder::Body),
            Role::Binary => Binder::Binary,
            Role::Tag => match &param.tag {
                Some(kind) => Binder::Tag(*kind),
                None => return Err(self.unsupported("untyped tag")),
            },
        };

        match param.ty {
            ParamType::Scalar => Ok(scalar),
            ParamType::Sequence
                if matches!(
                    param.role,
                    Role::Query | Role::Header | Role::Field | Role::Multipart
                ) =>
            {
                Ok(Binder::Repeated(Box::new(scalar)))
            }
            ParamType::Sequence => Err(self.unsupported("sequence")),
            ParamType::Map { .. } => Err(self.unsupported("map")),
        }
    }
}
