//! Per-call request state.
//!
//! An [`Accumulator`] is seeded from a compiled template, mutated by each
//! binder in argument order, then consumed once to produce the wire request.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use http::{
    Extensions, HeaderMap, HeaderName, HeaderValue, Method, Request, Uri,
    header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT},
};
use snafu::ResultExt as _;

use super::{
    Invocation,
    error::{AssembleSnafu, InvalidUrlSnafu, ParameterError, ReadPartSnafu},
    multipart::MultipartWriter,
    template::{BodyMode, RequestTemplate},
};
use crate::{
    base_url::BaseUrl,
    convert::FormField,
    http::DynamicHeader,
    value::PartData,
};

const USER_AGENT_VALUE: &str = concat!("flare/", env!("CARGO_PKG_VERSION"));

/// The content of a body set by a body or binary parameter.
#[derive(Debug)]
pub(crate) enum BodyContent {
    Bytes(Bytes),
    Part(PartData),
}

/// A body set by a body or binary parameter, read when the request is built.
#[derive(Debug)]
pub(crate) struct PendingBody {
    pub(crate) content: BodyContent,
    pub(crate) content_type: Option<HeaderValue>,
    /// If true, `content_type` replaces any declared `Content-Type` header.
    pub(crate) force: bool,
}

/// Global configuration merged into every request.
pub(crate) struct Globals<'a> {
    pub(crate) base_url: &'a BaseUrl,
    pub(crate) headers: &'a HeaderMap,
    pub(crate) dynamic_headers: &'a [Arc<dyn DynamicHeader>],
}

#[derive(Debug)]
pub(crate) struct Accumulator {
    mode: BodyMode,
    path_params: HashMap<String, String>,
    query: Vec<(String, String)>,
    fields: Vec<FormField>,
    headers: HeaderMap,
    body: Option<PendingBody>,
    extensions: Extensions,
}

impl Accumulator {
    pub(crate) fn new(mode: BodyMode) -> Self {
        Self {
            mode,
            path_params: HashMap::new(),
            query: Vec::new(),
            fields: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            extensions: Extensions::new(),
        }
    }

    pub(crate) fn is_url_encoded(&self) -> bool {
        self.mode == BodyMode::UrlEncoded
    }

    pub(crate) fn set_path_param(&mut self, name: &str, value: String) {
        self.path_params.insert(name.to_owned(), value);
    }

    /// Adds an already-encoded query parameter.
    pub(crate) fn add_query(&mut self, name: String, value: String) {
        self.query.push((name, value));
    }

    pub(crate) fn add_field(&mut self, field: FormField) {
        self.fields.push(field);
    }

    /// Sets a per-call header; the last write for a name wins.
    pub(crate) fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub(crate) fn set_body(&mut self, body: PendingBody) {
        self.body = Some(body);
    }

    pub(crate) fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Consumes the accumulator and produces the wire request.
    pub(crate) async fn build(
        self,
        template: &RequestTemplate,
        globals: &Globals<'_>,
        invocation: Invocation,
    ) -> Result<Request<Bytes>, ParameterError> {
        let uri = self.uri(template, globals)?;

        let mut headers = template.headers.clone();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }

        let has_body = self.mode != BodyMode::None || self.body.is_some();
        let (body, content_type, force) = match self.mode {
            BodyMode::UrlEncoded => {
                let form = url_encoded_form(&self.fields);
                let content_type = HeaderValue::from_static("application/x-www-form-urlencoded");
                (form, Some(content_type), true)
            }
            BodyMode::Multipart => {
                let mut writer = MultipartWriter::new();
                let content_type = HeaderValue::from_str(&writer.content_type()).ok();
                write_multipart(&mut writer, self.fields).await?;
                (writer.finish(), content_type, true)
            }
            BodyMode::None | BodyMode::Json | BodyMode::Binary => match self.body {
                Some(pending) => {
                    let bytes = match pending.content {
                        BodyContent::Bytes(bytes) => bytes,
                        BodyContent::Part(data) => data
                            .read()
                            .await
                            .context(ReadPartSnafu { name: "body" })?,
                    };
                    (bytes, pending.content_type, pending.force)
                }
                None => (Bytes::new(), None, false),
            },
        };

        if has_body {
            if let Some(content_type) = content_type
                && (force || !headers.contains_key(CONTENT_TYPE))
            {
                headers.insert(CONTENT_TYPE, content_type);
            }
        } else if requires_body(&template.verb) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        }

        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        for name in globals.headers.keys() {
            if !headers.contains_key(name) {
                for value in globals.headers.get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        for provider in globals
            .dynamic_headers
            .iter()
            .chain(&template.dynamic_headers)
        {
            let Some(header) = provider.header(&invocation) else {
                continue;
            };
            match header.to_parts() {
                Some((name, value)) => {
                    headers.insert(name, value);
                }
                None => tracing::warn!(
                    method = %invocation.method(),
                    name = %header.name,
                    "Skipping invalid dynamic header"
                ),
            }
        }

        let mut request = Request::builder()
            .method(template.verb.clone())
            .uri(uri)
            .body(body)
            .context(AssembleSnafu)?;
        *request.headers_mut() = headers;

        let mut extensions = self.extensions;
        extensions.insert(invocation);
        *request.extensions_mut() = extensions;
        Ok(request)
    }

    fn uri(&self, template: &RequestTemplate, globals: &Globals<'_>) -> Result<Uri, ParameterError> {
        let relative = template.expand_path(&self.path_params);

        let mut query = template.literal_query.clone().unwrap_or_default();
        for (name, value) in &self.query {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(name);
            query.push('=');
            query.push_str(value);
        }

        let base = template.base_url.as_ref().unwrap_or(globals.base_url);
        let url = base.join(relative.trim_start_matches('/'), &query);
        Uri::try_from(url.as_str()).context(InvalidUrlSnafu { url })
    }
}

fn requires_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Joins value fields, which binders have already encoded.
fn url_encoded_form(fields: &[FormField]) -> Bytes {
    let mut form = String::new();
    for field in fields {
        if let FormField::Value { name, value, .. } = field {
            if !form.is_empty() {
                form.push('&');
            }
            form.push_str(name);
            form.push('=');
            form.push_str(value);
        }
    }
    Bytes::from(form)
}

async fn write_multipart(
    writer: &mut MultipartWriter,
    fields: Vec<FormField>,
) -> Result<(), ParameterError> {
    for field in fields {
        match field {
            FormField::Value { name, value, .. } => writer.text(&name, &value),
            FormField::File {
                name,
                filename,
                path,
            } => {
                let content = tokio::fs::read(&path)
                    .await
                    .context(ReadPartSnafu { name: &name })?;
                writer.part(&name, filename.as_deref(), &content);
            }
            FormField::Bytes {
                name,
                filename,
                bytes,
            } => writer.part(&name, filename.as_deref(), &bytes),
            FormField::Stream {
                name,
                filename,
                stream,
            } => {
                let content = stream
                    .read_to_end()
                    .await
                    .context(ReadPartSnafu { name: &name })?;
                writer.part(&name, filename.as_deref(), &content);
            }
        }
    }
    Ok(())
}
