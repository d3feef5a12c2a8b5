//! Request template compilation and per-call request building.
//!
//! [`RequestTemplate::compile`] validates a method descriptor once. Each call
//! then seeds a fresh accumulator from the template, applies every parameter
//! binder to its argument in order, and merges global configuration into
//! one wire-ready `http::Request<Bytes>`.

mod accumulator;
mod binder;
mod encoding;
mod error;
mod multipart;
mod template;

use std::sync::Arc;

use bytes::Bytes;
use http::Request;
use snafu::ensure;

pub(crate) use accumulator::Globals;
pub(crate) use binder::BindContext;
pub use error::{ContractError, ParameterError};
pub(crate) use error::{DuplicateMethodSnafu, EmptyContractNameSnafu};
pub use template::{BodyMode, RequestTemplate};

use self::{accumulator::Accumulator, error::ArgumentCountSnafu};
use crate::value::Value;

/// The record of one method invocation, attached to every request.
///
/// Interceptors read it from the request extensions.
#[derive(Debug, Clone)]
pub struct Invocation {
    contract: Arc<str>,
    method: Arc<str>,
    arguments: Vec<Value>,
}

impl Invocation {
    /// Records an invocation, copying the arguments.
    pub fn new(contract: Arc<str>, method: Arc<str>, arguments: &[Value]) -> Self {
        Self {
            contract,
            method,
            arguments: arguments.to_vec(),
        }
    }

    /// The contract name.
    #[must_use]
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// The method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The arguments, in parameter order.
    #[must_use]
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }
}

/// Builds the wire request for one call.
pub(crate) async fn build_request(
    template: &RequestTemplate,
    contract: &Arc<str>,
    args: &[Value],
    cx: &BindContext<'_>,
    globals: &Globals<'_>,
) -> Result<Request<Bytes>, ParameterError> {
    ensure!(
        args.len() == template.binders.len(),
        ArgumentCountSnafu {
            expected: template.binders.len(),
            found: args.len(),
        }
    );

    let mut acc = Accumulator::new(template.mode);
    for (binder, value) in template.binders.iter().zip(args) {
        binder.apply(&mut acc, value, cx)?;
    }

    let invocation = Invocation::new(contract.clone(), template.method_name.clone(), args);
    acc.build(template, globals, invocation).await
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use http::{HeaderMap, HeaderValue, Method, header};

    use super::*;
    use crate::{
        IntoBaseUrl as _,
        base_url::BaseUrl,
        contract::{MethodDescriptor, Param, ParamType},
        convert::{FlatteningConverter, JsonCodec, ScalarStringConverter},
        http::{DynamicHeader, HttpHeader},
        value::{Part, PartData, RawBody},
    };

    #[derive(Debug, Clone, PartialEq)]
    struct RequestId(u32);

    struct Env {
        base: BaseUrl,
        headers: HeaderMap,
        dynamic: Vec<Arc<dyn DynamicHeader>>,
    }

    impl Env {
        fn new() -> Self {
            Self {
                base: "http://api.test/v1".into_base_url().unwrap(),
                headers: HeaderMap::new(),
                dynamic: Vec::new(),
            }
        }

        async fn build(
            &self,
            descriptor: MethodDescriptor,
            args: Vec<Value>,
        ) -> Result<Request<Bytes>, ParameterError> {
            let template = RequestTemplate::compile(&descriptor).unwrap();
            let cx = BindContext {
                strings: &ScalarStringConverter,
                fields: &FlatteningConverter,
                codec: &JsonCodec,
            };
            let globals = Globals {
                base_url: &self.base,
                headers: &self.headers,
                dynamic_headers: &self.dynamic,
            };
            build_request(&template, &Arc::from("svc"), &args, &cx, &globals).await
        }
    }

    fn body_text(request: &Request<Bytes>) -> &str {
        std::str::from_utf8(request.body()).unwrap()
    }

    #[tokio::test]
    async fn test_path_and_query_binding() {
        let descriptor = MethodDescriptor::new("get_user")
            .get("/users/{id}")
            .param(Param::path("id"))
            .param(Param::query("verbose"));

        let request = Env::new()
            .build(descriptor, vec!["42".into(), true.into()])
            .await
            .unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.uri().path(), "/v1/users/42");
        assert_eq!(request.uri().query(), Some("verbose=true"));
        assert!(!request.uri().to_string().contains('{'));
        assert_eq!(request.headers()[header::USER_AGENT], concat!("flare/", env!("CARGO_PKG_VERSION")));
        assert!(request.headers().get(header::CONTENT_TYPE).is_none());

        let invocation = request.extensions().get::<Invocation>().unwrap();
        assert_eq!(invocation.contract(), "svc");
        assert_eq!(invocation.method(), "get_user");
        assert_eq!(invocation.arguments().len(), 2);
    }

    #[tokio::test]
    async fn test_values_are_encoded_at_bind() {
        let descriptor = MethodDescriptor::new("m")
            .get("/files/{name}?lang=en")
            .param(Param::path("name"))
            .param(Param::query("q"))
            .param(Param::query("raw").encoded())
            .param(Param::query("tag").sequence());

        let request = Env::new()
            .build(
                descriptor,
                vec![
                    "a b/c".into(),
                    "x&y=z".into(),
                    "%2F".into(),
                    Value::seq(["t1", "t2"]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(request.uri().path(), "/v1/files/a%20b%2Fc");
        assert_eq!(
            request.uri().query(),
            Some("lang=en&q=x%26y%3Dz&raw=%2F&tag=t1&tag=t2")
        );
    }

    #[tokio::test]
    async fn test_query_defaults_and_nulls() {
        let descriptor = MethodDescriptor::new("m")
            .get("/items")
            .param(Param::query("page").default_value("1"))
            .param(Param::query("sort"))
            .param(Param::query_map());

        let filters: Value = [("kind", "book"), ("lang", "en")].into_iter().collect();
        let request = Env::new()
            .build(descriptor, vec![Value::Null, Value::Null, filters])
            .await
            .unwrap();

        assert_eq!(request.uri().query(), Some("page=1&kind=book&lang=en"));
    }

    #[tokio::test]
    async fn test_query_map_rejects_null_values() {
        let descriptor = MethodDescriptor::new("m").get("/items").param(Param::query_map());
        let filters = Value::object([("kind", Value::Null)]);

        let err = Env::new().build(descriptor, vec![filters]).await.unwrap_err();
        assert!(matches!(err, ParameterError::NullMapValue { key, .. } if key == "kind"));
    }

    #[tokio::test]
    async fn test_path_requires_value() {
        let descriptor = MethodDescriptor::new("m")
            .get("/users/{id}")
            .param(Param::path("id"));
        let err = Env::new().build(descriptor.clone(), vec![Value::Null]).await.unwrap_err();
        assert!(matches!(err, ParameterError::MissingValue { .. }));

        let err = Env::new().build(descriptor, vec!["".into()]).await.unwrap_err();
        assert!(matches!(err, ParameterError::EmptyPath { .. }));
    }

    #[tokio::test]
    async fn test_argument_count_is_checked() {
        let descriptor = MethodDescriptor::new("m").get("/a").param(Param::query("q"));
        let err = Env::new().build(descriptor, vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            ParameterError::ArgumentCount {
                expected: 1,
                found: 0
            }
        ));
    }

    #[tokio::test]
    async fn test_url_encoded_form() {
        let descriptor = MethodDescriptor::new("m")
            .post("/form")
            .form_url_encoded()
            .param(Param::field(""))
            .param(Param::field("note"));

        let user = Value::object([(
            "user",
            Value::object([("name", Value::from("x y")), ("tags", Value::seq(["a", "b"]))]),
        )]);
        let request = Env::new()
            .build(descriptor, vec![user, Value::Null])
            .await
            .unwrap();

        assert_eq!(
            request.headers()[header::CONTENT_TYPE],
            "application/x-www-form-urlencoded"
        );
        assert_eq!(
            body_text(&request),
            "user.name=x%20y&user.tags%5B0%5D=a&user.tags%5B1%5D=b"
        );
    }

    #[tokio::test]
    async fn test_url_encoded_form_rejects_parts() {
        let descriptor = MethodDescriptor::new("m")
            .post("/form")
            .form_url_encoded()
            .param(Param::field("doc"));

        let err = Env::new()
            .build(descriptor, vec![Value::bytes(&b"x"[..])])
            .await
            .unwrap_err();
        assert!(matches!(err, ParameterError::PartInForm { .. }));
    }

    #[tokio::test]
    async fn test_multipart_body() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"file-content").unwrap();

        let descriptor = MethodDescriptor::new("upload")
            .post("/upload")
            .multipart()
            .param(Param::field("title"))
            .param(Param::multipart("doc").filename("doc.bin"))
            .param(Param::multipart("attachments").sequence());

        let request = Env::new()
            .build(
                descriptor,
                vec![
                    "hello".into(),
                    Value::bytes(&b"raw-bytes"[..]),
                    Value::seq([Value::file(file.path())]),
                ],
            )
            .await
            .unwrap();

        let content_type = request.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary=flare-"));
        let body = body_text(&request);
        assert!(body.contains("name=\"title\"\r\n\r\nhello\r\n"));
        assert!(body.contains("name=\"doc\"; filename=\"doc.bin\"\r\nContent-Type: application/octet-stream\r\n\r\nraw-bytes"));
        let file_name = file.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(body.contains(&format!("name=\"attachments\"; filename=\"{file_name}\"")));
        assert!(body.contains("file-content"));
    }

    #[tokio::test]
    async fn test_multipart_rejects_text() {
        let descriptor = MethodDescriptor::new("upload")
            .post("/upload")
            .multipart()
            .param(Param::multipart("doc"));

        let err = Env::new().build(descriptor, vec!["text".into()]).await.unwrap_err();
        assert!(matches!(err, ParameterError::UnsupportedType { kind: "string", .. }));
    }

    #[tokio::test]
    async fn test_json_body() {
        let descriptor = MethodDescriptor::new("create").post("/users").param(Param::body());
        let user = Value::object([("name", Value::from("A")), ("age", Value::from(3))]);

        let request = Env::new().build(descriptor, vec![user]).await.unwrap();

        assert_eq!(
            request.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(body_text(&request), r#"{"name":"A","age":3}"#);
    }

    #[tokio::test]
    async fn test_raw_body_passes_through() {
        let descriptor = MethodDescriptor::new("create")
            .post("/users")
            .header("Content-Type: application/vnd.test+json")
            .param(Param::body());

        let raw = RawBody::new("<x/>", Some(HeaderValue::from_static("application/xml")));
        let request = Env::new()
            .build(descriptor.clone(), vec![Value::Raw(raw)])
            .await
            .unwrap();
        assert_eq!(request.headers()[header::CONTENT_TYPE], "application/xml");
        assert_eq!(body_text(&request), "<x/>");

        let request = Env::new()
            .build(descriptor, vec![Value::object([("a", Value::from(1))])])
            .await
            .unwrap();
        assert_eq!(
            request.headers()[header::CONTENT_TYPE],
            "application/vnd.test+json"
        );
    }

    #[tokio::test]
    async fn test_body_requires_value() {
        let descriptor = MethodDescriptor::new("create").post("/users").param(Param::body());
        let err = Env::new().build(descriptor, vec![Value::Null]).await.unwrap_err();
        assert!(matches!(err, ParameterError::MissingValue { .. }));
    }

    #[tokio::test]
    async fn test_binary_body() {
        let descriptor = MethodDescriptor::new("put")
            .put("/blob")
            .header("Content-Type: text/plain")
            .param(Param::binary());

        let stream = Value::Part(Part::new(PartData::Stream(crate::value::BodyStream::new(
            &b"streamed"[..],
        ))));
        let request = Env::new().build(descriptor.clone(), vec![stream]).await.unwrap();
        assert_eq!(
            request.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(body_text(&request), "streamed");

        let err = Env::new()
            .build(descriptor, vec![Value::from(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, ParameterError::UnsupportedType { .. }));
    }

    #[tokio::test]
    async fn test_empty_body_for_post() {
        let request = Env::new()
            .build(MethodDescriptor::new("ping").post("/ping"), vec![])
            .await
            .unwrap();
        assert!(request.body().is_empty());
        assert_eq!(request.headers()[header::CONTENT_LENGTH], "0");
    }

    #[tokio::test]
    async fn test_header_precedence() {
        let descriptor = MethodDescriptor::new("m")
            .get("/a")
            .header("X-Static: method")
            .header("X-Local: method")
            .param(Param::header("X-Local"))
            .param(Param::header_map())
            .dynamic_header(Arc::new(|_: &Invocation| {
                Some(HttpHeader::new("X-Dynamic", "local"))
            }));

        let mut env = Env::new();
        env.headers
            .insert("x-static", HeaderValue::from_static("global"));
        env.headers
            .insert("x-global", HeaderValue::from_static("global"));
        env.headers
            .insert(header::USER_AGENT, HeaderValue::from_static("other"));
        let global: Arc<dyn DynamicHeader> =
            Arc::new(|_: &Invocation| Some(HttpHeader::new("X-Dynamic", "global")));
        let empty: Arc<dyn DynamicHeader> =
            Arc::new(|_: &Invocation| Some(HttpHeader::new("X-Empty", "")));
        env.dynamic = vec![global, empty];

        let extra: Value = [("X-Map", "m")].into_iter().collect();
        let request = env
            .build(descriptor, vec!["call".into(), extra])
            .await
            .unwrap();
        let headers = request.headers();

        assert_eq!(headers["x-static"], "method");
        assert_eq!(headers["x-local"], "call");
        assert_eq!(headers["x-map"], "m");
        assert_eq!(headers["x-global"], "global");
        assert_eq!(headers["x-dynamic"], "local");
        assert!(headers.get("x-empty").is_none());
        assert!(headers[header::USER_AGENT].to_str().unwrap().starts_with("flare/"));
    }

    #[tokio::test]
    async fn test_header_map_rejects_empty_key() {
        let descriptor = MethodDescriptor::new("m").get("/a").param(Param::header_map());
        let extra: Value = [("", "v")].into_iter().collect();
        let err = Env::new().build(descriptor, vec![extra]).await.unwrap_err();
        assert!(matches!(err, ParameterError::EmptyMapKey { .. }));
    }

    #[tokio::test]
    async fn test_tags_are_attached() {
        let descriptor = MethodDescriptor::new("m")
            .get("/a")
            .param(Param::tag::<RequestId>());

        let request = Env::new()
            .build(descriptor.clone(), vec![Value::tag(RequestId(9))])
            .await
            .unwrap();
        assert_eq!(request.extensions().get::<RequestId>(), Some(&RequestId(9)));

        let err = Env::new()
            .build(descriptor, vec![Value::tag("wrong")])
            .await
            .unwrap_err();
        assert!(matches!(err, ParameterError::UnsupportedType { kind: "tag", .. }));
    }

    #[tokio::test]
    async fn test_method_base_url_override() {
        let descriptor = MethodDescriptor::new("m")
            .get("status")
            .base_url("https://status.test/root/")
            .param(Param::query("q").of_type(ParamType::Scalar));

        let request = Env::new().build(descriptor, vec!["1".into()]).await.unwrap();
        assert_eq!(request.uri().to_string(), "https://status.test/root/status?q=1");
    }
}
