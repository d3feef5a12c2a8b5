//! Service contracts and their binding metadata.
//!
//! A [`ServiceContract`] is an explicit binding table: one
//! [`MethodDescriptor`] per remotely invocable method, each declaring its
//! HTTP verb and path template, body encoding, headers, interceptors and the
//! role of every parameter. Contracts are read-only once handed to
//! [`Flare::create`](crate::Flare::create), which compiles every method
//! eagerly.
//!
//! ```
//! use flare::contract::{MethodDescriptor, Param, ReturnShape, ServiceContract};
//!
//! let contract = ServiceContract::new("users")
//!     .method(
//!         MethodDescriptor::new("get_user")
//!             .get("/users/{id}")
//!             .param(Param::path("id"))
//!             .param(Param::query("verbose"))
//!             .returns(ReturnShape::Structured),
//!     )
//!     .method(
//!         MethodDescriptor::new("upload")
//!             .post("/files")
//!             .multipart()
//!             .param(Param::multipart("file")),
//!     );
//! # let _ = contract;
//! ```

mod param;

use std::{path::PathBuf, sync::Arc};

use http::Method;

use crate::http::{DynamicHeader, Interceptor};

pub use param::{MapKey, Param, ParamType, Role};
pub(crate) use param::{TagKind, insert_tag};

/// A declared service: a named set of method descriptors.
#[derive(Debug, Clone)]
pub struct ServiceContract {
    pub(crate) name: String,
    pub(crate) methods: Vec<MethodDescriptor>,
}

impl ServiceContract {
    /// Creates an empty contract.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Adds a method.
    #[must_use]
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Returns the contract name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared methods.
    #[must_use]
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }
}

/// The body encoding declared on a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `application/x-www-form-urlencoded`.
    FormUrlEncoded,
    /// `multipart/form-data`.
    Multipart,
}

/// A static header declaration.
#[derive(Debug, Clone)]
pub(crate) enum StaticHeader {
    /// A `"Name: Value"` line.
    Line(String),
    /// A separate name and value.
    Pair(String, String),
}

/// The shape a method's successful response body is resolved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnShape {
    /// The whole body as text.
    Text,
    /// The body bytes with their content type, unmodified.
    Raw,
    /// The body persisted to a file.
    File,
    /// The body as a readable stream.
    Stream,
    /// The body bytes.
    Bytes,
    /// No body.
    Void,
    /// The body decoded by the body codec.
    #[default]
    Structured,
}

/// The declared return of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Returns {
    /// The shape of a successful body.
    pub shape: ReturnShape,
    /// If true, the caller receives the whole response, success or error,
    /// and inspects the status itself.
    pub wrapped: bool,
}

/// A method-level instruction to persist the response body to a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Download {
    pub(crate) path: Option<PathBuf>,
    pub(crate) overwrite: bool,
}

impl Download {
    /// Persists to a process temp file.
    #[must_use]
    pub fn temp() -> Self {
        Self::default()
    }

    /// Persists to `path`.
    pub fn to(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            overwrite: false,
        }
    }

    /// If true, an existing file at the target path is removed first.
    #[must_use]
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

/// Binding metadata for one method.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub(crate) name: String,
    pub(crate) routes: Vec<(Method, String)>,
    pub(crate) encodings: Vec<Encoding>,
    pub(crate) headers: Vec<StaticHeader>,
    pub(crate) dynamic_headers: Vec<Arc<dyn DynamicHeader>>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) net_interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) base_url: Option<String>,
    pub(crate) download: Option<Download>,
    pub(crate) returns: Returns,
    pub(crate) params: Vec<Param>,
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("routes", &self.routes)
            .field("encodings", &self.encodings)
            .field("headers", &self.headers)
            .field("dynamic_headers", &self.dynamic_headers.len())
            .field("interceptors", &self.interceptors.len())
            .field("net_interceptors", &self.net_interceptors.len())
            .field("base_url", &self.base_url)
            .field("download", &self.download)
            .field("returns", &self.returns)
            .field("params", &self.params)
            .finish()
    }
}

impl MethodDescriptor {
    /// Creates a descriptor with no route.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
            encodings: Vec::new(),
            headers: Vec::new(),
            dynamic_headers: Vec::new(),
            interceptors: Vec::new(),
            net_interceptors: Vec::new(),
            base_url: None,
            download: None,
            returns: Returns::default(),
            params: Vec::new(),
        }
    }

    /// Declares the HTTP verb and path template.
    ///
    /// Exactly one route must be declared.
    #[must_use]
    pub fn http(mut self, method: Method, path: impl Into<String>) -> Self {
        self.routes.push((method, path.into()));
        self
    }

    /// Declares a `GET` route.
    #[must_use]
    pub fn get(self, path: impl Into<String>) -> Self {
        self.http(Method::GET, path)
    }

    /// Declares a `POST` route.
    #[must_use]
    pub fn post(self, path: impl Into<String>) -> Self {
        self.http(Method::POST, path)
    }

    /// Declares a `PUT` route.
    #[must_use]
    pub fn put(self, path: impl Into<String>) -> Self {
        self.http(Method::PUT, path)
    }

    /// Declares a `PATCH` route.
    #[must_use]
    pub fn patch(self, path: impl Into<String>) -> Self {
        self.http(Method::PATCH, path)
    }

    /// Declares a `DELETE` route.
    #[must_use]
    pub fn delete(self, path: impl Into<String>) -> Self {
        self.http(Method::DELETE, path)
    }

    /// Declares a `HEAD` route.
    #[must_use]
    pub fn head(self, path: impl Into<String>) -> Self {
        self.http(Method::HEAD, path)
    }

    /// Declares an `OPTIONS` route.
    #[must_use]
    pub fn options(self, path: impl Into<String>) -> Self {
        self.http(Method::OPTIONS, path)
    }

    /// Declares a `TRACE` route.
    #[must_use]
    pub fn trace(self, path: impl Into<String>) -> Self {
        self.http(Method::TRACE, path)
    }

    /// Sends the body as `application/x-www-form-urlencoded`.
    #[must_use]
    pub fn form_url_encoded(mut self) -> Self {
        self.encodings.push(Encoding::FormUrlEncoded);
        self
    }

    /// Sends the body as `multipart/form-data`.
    #[must_use]
    pub fn multipart(mut self) -> Self {
        self.encodings.push(Encoding::Multipart);
        self
    }

    /// Adds a static header in `"Name: Value"` form.
    #[must_use]
    pub fn header(mut self, line: impl Into<String>) -> Self {
        self.headers.push(StaticHeader::Line(line.into()));
        self
    }

    /// Adds a static header from a name and a value.
    #[must_use]
    pub fn header_pair(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push(StaticHeader::Pair(name.into(), value.into()));
        self
    }

    /// Adds a dynamic header provider, invoked on every call.
    #[must_use]
    pub fn dynamic_header(mut self, provider: Arc<dyn DynamicHeader>) -> Self {
        self.dynamic_headers.push(provider);
        self
    }

    /// Adds an application interceptor, run before the global ones.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Adds a network interceptor, run before the global ones.
    #[must_use]
    pub fn net_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.net_interceptors.push(interceptor);
        self
    }

    /// Overrides the base URL for this method.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Persists the response body to a file.
    #[must_use]
    pub fn download(mut self, download: Download) -> Self {
        self.download = Some(download);
        self
    }

    /// Declares the shape of a successful response body.
    #[must_use]
    pub fn returns(mut self, shape: ReturnShape) -> Self {
        self.returns.shape = shape;
        self
    }

    /// Returns the whole response to the caller instead of only its body.
    #[must_use]
    pub fn wrapped(mut self) -> Self {
        self.returns.wrapped = true;
        self
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared parameters.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Returns the declared return.
    #[must_use]
    pub fn declared_returns(&self) -> Returns {
        self.returns
    }
}
