use http::Method;
use snafu::Snafu;

use crate::{BoxedError, base_url::InvalidBaseUrl, contract::Role, convert::FlattenError};

/// Errors in a service contract, raised when the contract is loaded.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ContractError {
    /// The contract has no name.
    #[snafu(display("Service contract name must not be empty"))]
    EmptyContractName,
    /// Two methods share a name.
    #[snafu(display("Method `{method}` is declared more than once in `{contract}`"))]
    DuplicateMethod {
        /// The contract name.
        contract: String,
        /// The duplicated method name.
        method: String,
    },
    /// No HTTP verb was declared.
    #[snafu(display("{method}: an HTTP method is required (e.g. GET, POST)"))]
    MissingVerb {
        /// The method name.
        method: String,
    },
    /// More than one HTTP verb was declared.
    #[snafu(display("{method}: only one HTTP method is allowed, found {first} and {second}"))]
    MultipleVerbs {
        /// The method name.
        method: String,
        /// The first declared verb.
        first: Method,
        /// The second declared verb.
        second: Method,
    },
    /// More than one body encoding was declared.
    #[snafu(display("{method}: only one encoding is allowed"))]
    MultipleEncodings {
        /// The method name.
        method: String,
    },
    /// The literal query string contains a placeholder.
    #[snafu(display(
        "{method}: URL query string `{query}` must not have replace blocks; use a query parameter"
    ))]
    QueryPlaceholder {
        /// The method name.
        method: String,
        /// The literal query string.
        query: String,
    },
    /// A static header is malformed.
    #[snafu(display("{method}: header must be in the form \"Name: Value\", found `{header}`"))]
    InvalidStaticHeader {
        /// The method name.
        method: String,
        /// The header declaration.
        header: String,
    },
    /// The method's base URL override is invalid.
    #[snafu(display("{method}: invalid base URL"))]
    MethodBaseUrl {
        /// The method name.
        method: String,
        /// The underlying error.
        source: InvalidBaseUrl,
    },
    /// A path parameter name is not a legal placeholder name.
    #[snafu(display("{method}: path parameter #{index} name must match [a-zA-Z][a-zA-Z0-9_-]*, found `{name}`"))]
    InvalidPathName {
        /// The method name.
        method: String,
        /// The parameter position.
        index: usize,
        /// The declared name.
        name: String,
    },
    /// A path parameter names a placeholder the template lacks.
    #[snafu(display("{method}: URL `{path}` does not contain `{{{name}}}`"))]
    UnknownPlaceholder {
        /// The method name.
        method: String,
        /// The path template.
        path: String,
        /// The declared name.
        name: String,
    },
    /// A placeholder has no path parameter.
    #[snafu(display("{method}: URL placeholder `{{{name}}}` is not bound by any path parameter"))]
    UnboundPlaceholder {
        /// The method name.
        method: String,
        /// The placeholder name.
        name: String,
    },
    /// A parameter role needs an encoding the method does not declare.
    #[snafu(display("{method}: {role} parameter #{index} requires {required} encoding"))]
    EncodingRequired {
        /// The method name.
        method: String,
        /// The parameter position.
        index: usize,
        /// The parameter role.
        role: Role,
        /// The encoding(s) that would allow it.
        required: &'static str,
    },
    /// A body parameter was combined with a form encoding.
    #[snafu(display("{method}: {role} parameter #{index} cannot be used with form or multipart encoding"))]
    BodyWithForm {
        /// The method name.
        method: String,
        /// The parameter position.
        index: usize,
        /// The parameter role.
        role: Role,
    },
    /// More than one body or binary parameter was declared.
    #[snafu(display("{method}: parameter #{index} is a second request body"))]
    MultipleBodies {
        /// The method name.
        method: String,
        /// The parameter position.
        index: usize,
    },
    /// Two tag parameters share a static type.
    #[snafu(display(
        "{method}: tag type {type_name} of parameter #{index} duplicates parameter #{previous}"
    ))]
    DuplicateTag {
        /// The method name.
        method: String,
        /// The parameter position.
        index: usize,
        /// The earlier parameter position.
        previous: usize,
        /// The tag type.
        type_name: &'static str,
    },
    /// A map parameter has non-string keys.
    #[snafu(display("{method}: {role} map parameter #{index} keys must be strings, found {key}"))]
    NonStringMapKey {
        /// The method name.
        method: String,
        /// The parameter position.
        index: usize,
        /// The parameter role.
        role: Role,
        /// The declared key type.
        key: &'static str,
    },
    /// A role does not accept the declared parameter shape.
    #[snafu(display("{method}: {role} parameter #{index} cannot be a {shape}"))]
    UnsupportedShape {
        /// The method name.
        method: String,
        /// The parameter position.
        index: usize,
        /// The parameter role.
        role: Role,
        /// The declared shape.
        shape: &'static str,
    },
    /// A header parameter name is empty or illegal.
    #[snafu(display("{method}: header parameter #{index} has invalid name `{name}`"))]
    InvalidHeaderParam {
        /// The method name.
        method: String,
        /// The parameter position.
        index: usize,
        /// The declared name.
        name: String,
    },
}

impl crate::Error for ContractError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors in the arguments of one call, raised before any network I/O.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParameterError {
    /// The number of arguments does not match the parameters.
    #[snafu(display("Argument count ({found}) doesn't match expected count ({expected})"))]
    ArgumentCount {
        /// The declared parameter count.
        expected: usize,
        /// The supplied argument count.
        found: usize,
    },
    /// A required argument is null.
    #[snafu(display("{role} parameter `{name}` value must not be null"))]
    MissingValue {
        /// The parameter role.
        role: Role,
        /// The parameter name.
        name: String,
    },
    /// A path argument resolved to empty text.
    #[snafu(display("Path parameter `{name}` value must not be empty"))]
    EmptyPath {
        /// The parameter name.
        name: String,
    },
    /// The argument's runtime type is not accepted by the role.
    #[snafu(display("{role} parameter `{name}` does not accept a {kind} value"))]
    UnsupportedType {
        /// The parameter role.
        role: Role,
        /// The parameter name.
        name: String,
        /// The runtime kind found.
        kind: &'static str,
    },
    /// A map argument was expected.
    #[snafu(display("{role} map parameter requires a map, found {kind}"))]
    NotAMap {
        /// The parameter role.
        role: Role,
        /// The runtime kind found.
        kind: &'static str,
    },
    /// A map argument has an empty key.
    #[snafu(display("{role} map contained an empty key"))]
    EmptyMapKey {
        /// The parameter role.
        role: Role,
    },
    /// A map argument has a null value.
    #[snafu(display("{role} map contained null value for key `{key}`"))]
    NullMapValue {
        /// The parameter role.
        role: Role,
        /// The offending key.
        key: String,
    },
    /// A composite argument could not be flattened.
    #[snafu(display("Failed to flatten {role} parameter"))]
    Flatten {
        /// The parameter role.
        role: Role,
        /// The underlying error.
        source: FlattenError,
    },
    /// A file, byte or stream field was bound in a url-encoded form.
    #[snafu(display("Field `{name}` holds binary content, which requires multipart encoding"))]
    PartInForm {
        /// The field name.
        name: String,
    },
    /// A header name is not legal on the wire.
    #[snafu(display("Invalid header name `{name}`"))]
    InvalidHeaderName {
        /// The header name.
        name: String,
        /// The underlying error.
        source: http::header::InvalidHeaderName,
    },
    /// A header value is not legal on the wire.
    #[snafu(display("Invalid value for header `{name}`"))]
    InvalidHeaderValue {
        /// The header name.
        name: String,
        /// The underlying error.
        source: http::header::InvalidHeaderValue,
    },
    /// The body codec failed.
    #[snafu(display("Failed to encode request body"))]
    Encode {
        /// The underlying error.
        source: BoxedError,
    },
    /// A file or stream part could not be read.
    #[snafu(display("Failed to read content of `{name}`"))]
    ReadPart {
        /// The field name.
        name: String,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The built URL is not a valid URI.
    #[snafu(display("Built URL `{url}` is invalid"))]
    InvalidUrl {
        /// The built URL.
        url: String,
        /// The underlying error.
        source: http::uri::InvalidUri,
    },
    /// The request could not be assembled.
    #[snafu(display("Failed to assemble request"))]
    Assemble {
        /// The underlying error.
        source: http::Error,
    },
}

impl crate::Error for ParameterError {
    fn is_retryable(&self) -> bool {
        false
    }
}
