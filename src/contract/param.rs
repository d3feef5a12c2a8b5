use std::{
    any::{Any, TypeId, type_name},
    fmt,
    sync::Arc,
};

use http::Extensions;

/// The declared purpose of a method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Substituted into a `{name}` placeholder of the path template.
    Path,
    /// Appended to the query string.
    Query,
    /// Sent as a request header.
    Header,
    /// A form field, in url-encoded or multipart bodies.
    Field,
    /// A multipart part (file, byte buffer, or stream).
    Multipart,
    /// The request body, encoded by the body codec.
    Body,
    /// A raw `application/octet-stream` body.
    Binary,
    /// An opaque value attached to the request for interceptors.
    Tag,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Field => "field",
            Self::Multipart => "multipart",
            Self::Body => "body",
            Self::Binary => "binary",
            Self::Tag => "tag",
        })
    }
}

/// The static shape of a parameter, used to select its binder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// A single value.
    Scalar,
    /// An ordered collection; each element is bound separately.
    Sequence,
    /// A keyed collection; each entry is bound under its key.
    Map {
        /// The declared key type.
        key: MapKey,
    },
}

impl ParamType {
    /// A map keyed by `K`.
    ///
    /// Only string-typed keys can be bound; other key types are rejected
    /// when the contract is compiled.
    #[must_use]
    pub fn map<K: 'static>() -> Self {
        let id = TypeId::of::<K>();
        Self::Map {
            key: MapKey {
                type_name: type_name::<K>(),
                is_text: id == TypeId::of::<String>() || id == TypeId::of::<&'static str>(),
            },
        }
    }
}

/// The key type of a [`ParamType::Map`] parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapKey {
    pub(crate) type_name: &'static str,
    pub(crate) is_text: bool,
}

impl MapKey {
    /// The name of the key type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

type InsertTag = fn(&dyn Any, &mut Extensions) -> bool;

/// The static type of a tag parameter.
#[derive(Clone, Copy)]
pub(crate) struct TagKind {
    pub(crate) id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) insert: InsertTag,
}

impl TagKind {
    fn of<T: Clone + Send + Sync + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            insert: |value, extensions| match value.downcast_ref::<T>() {
                Some(value) => {
                    extensions.insert(value.clone());
                    true
                }
                None => false,
            },
        }
    }
}

impl fmt::Debug for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// The binding declaration of one method parameter.
///
/// ```
/// use flare::contract::{Param, ParamType};
///
/// let id = Param::path("id");
/// let tags = Param::query("tag").sequence();
/// let extra = Param::query_map().of_type(ParamType::map::<String>());
/// # let _ = (id, tags, extra);
/// ```
#[derive(Debug, Clone)]
pub struct Param {
    pub(crate) role: Role,
    pub(crate) name: String,
    pub(crate) default_value: Option<String>,
    pub(crate) encoded: bool,
    pub(crate) filename: Option<String>,
    pub(crate) ty: ParamType,
    pub(crate) tag: Option<TagKind>,
}

impl Param {
    fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            default_value: None,
            encoded: false,
            filename: None,
            ty: ParamType::Scalar,
            tag: None,
        }
    }

    /// A path parameter bound to the `{name}` placeholder.
    pub fn path(name: impl Into<String>) -> Self {
        Self::new(Role::Path, name)
    }

    /// A query parameter.
    ///
    /// Composite values are flattened into `name.member` and `name[i]`
    /// parameters.
    pub fn query(name: impl Into<String>) -> Self {
        Self::new(Role::Query, name)
    }

    /// A map of query parameters, one per entry.
    #[must_use]
    pub fn query_map() -> Self {
        Self::new(Role::Query, "").of_type(ParamType::map::<String>())
    }

    /// A request header.
    pub fn header(name: impl Into<String>) -> Self {
        Self::new(Role::Header, name)
    }

    /// A map of request headers, one per entry.
    #[must_use]
    pub fn header_map() -> Self {
        Self::new(Role::Header, "").of_type(ParamType::map::<String>())
    }

    /// A form field. Requires a url-encoded or multipart method.
    pub fn field(name: impl Into<String>) -> Self {
        Self::new(Role::Field, name)
    }

    /// A map of form fields, one per entry.
    #[must_use]
    pub fn field_map() -> Self {
        Self::new(Role::Field, "").of_type(ParamType::map::<String>())
    }

    /// A multipart part. Requires a multipart method.
    pub fn multipart(name: impl Into<String>) -> Self {
        Self::new(Role::Multipart, name)
    }

    /// The request body, encoded by the configured codec.
    #[must_use]
    pub fn body() -> Self {
        Self::new(Role::Body, "")
    }

    /// A raw binary request body.
    #[must_use]
    pub fn binary() -> Self {
        Self::new(Role::Binary, "")
    }

    /// A tag of static type `T`, attached to the request extensions.
    ///
    /// Arguments bound to this parameter must be [`Value::Tag`](crate::Value::Tag)
    /// values holding a `T`, or null.
    #[must_use]
    pub fn tag<T: Clone + Send + Sync + 'static>() -> Self {
        let mut param = Self::new(Role::Tag, type_name::<T>());
        param.tag = Some(TagKind::of::<T>());
        param
    }

    /// The value used when the argument is null.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.default_value = (!value.is_empty()).then_some(value);
        self
    }

    /// Marks the value as already percent-encoded.
    #[must_use]
    pub fn encoded(mut self) -> Self {
        self.encoded = true;
        self
    }

    /// Overrides the filename reported for multipart parts.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Declares the parameter as an ordered collection.
    #[must_use]
    pub fn sequence(self) -> Self {
        self.of_type(ParamType::Sequence)
    }

    /// Declares the static shape of the parameter.
    #[must_use]
    pub fn of_type(mut self, ty: ParamType) -> Self {
        self.ty = ty;
        self
    }

    /// Returns the binding role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the binding name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the static shape.
    #[must_use]
    pub fn param_type(&self) -> ParamType {
        self.ty
    }
}

/// Inserts a tag value into the request extensions.
///
/// Returns `false` if the value is not of the declared type.
pub(crate) fn insert_tag(kind: &TagKind, value: &Arc<dyn Any + Send + Sync>, extensions: &mut Extensions) -> bool {
    (kind.insert)(value.as_ref(), extensions)
}
