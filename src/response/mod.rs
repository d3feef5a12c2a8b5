//! Response classification and return-shape resolution.
//!
//! Every exchange becomes an [`InternalResponse`]: a success carrying the
//! body resolved into the method's declared [`ReturnShape`], or an error
//! carrying the fully buffered error body. Non-2xx responses never fail
//! here; turning them into errors is the call adapter's job.

mod download;

use std::{io::Cursor, path::PathBuf, string::FromUtf8Error};

use bytes::Bytes;
use http::{HeaderMap, StatusCode, header::CONTENT_TYPE};
use snafu::{ResultExt as _, Snafu, ensure};

use crate::{
    BoxedError,
    contract::{Download, ReturnShape, Returns},
    convert::BodyCodec,
    http::Exchange,
    value::{BodyStream, RawBody},
};

/// The status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    message: String,
    headers: HeaderMap,
}

impl ResponseHead {
    /// Creates a head. The message is the status code's canonical reason.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            message: status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
        }
    }

    /// The status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason phrase.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// A successful response body, resolved into its declared shape.
#[derive(Debug)]
pub enum Resolved {
    /// The whole body as text.
    Text(String),
    /// The body bytes and content type, unmodified.
    Raw(RawBody),
    /// The file the body was written to.
    File(PathBuf),
    /// A readable stream over the body.
    Stream(BodyStream),
    /// The body bytes.
    Bytes(Bytes),
    /// No body was requested.
    Void,
    /// The body decoded by the body codec.
    Structured(serde_json::Value),
}

impl Resolved {
    /// A short name for the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Raw(_) => "raw",
            Self::File(_) => "file",
            Self::Stream(_) => "stream",
            Self::Bytes(_) => "bytes",
            Self::Void => "void",
            Self::Structured(_) => "structured",
        }
    }
}

/// The outcome of one executed call, before return-shape adaptation.
///
/// Exactly one side is populated, and the status always matches it.
#[derive(Debug)]
pub struct InternalResponse {
    head: ResponseHead,
    side: Side,
}

#[derive(Debug)]
enum Side {
    /// A 2xx response; `None` for 204 and 205.
    Success(Option<Resolved>),
    /// Any other response, with its buffered body.
    Error(Bytes),
}

impl InternalResponse {
    /// Creates a success outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is not 2xx.
    pub fn success(head: ResponseHead, body: Option<Resolved>) -> Result<Self, StatusMismatch> {
        ensure!(
            head.status.is_success(),
            StatusMismatchSnafu {
                status: head.status,
                expected: "success",
            }
        );
        Ok(Self {
            head,
            side: Side::Success(body),
        })
    }

    /// Creates an error outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is 2xx.
    pub fn error(head: ResponseHead, body: Bytes) -> Result<Self, StatusMismatch> {
        ensure!(
            !head.status.is_success(),
            StatusMismatchSnafu {
                status: head.status,
                expected: "error",
            }
        );
        Ok(Self {
            head,
            side: Side::Error(body),
        })
    }

    /// Takes the body of a success outcome, or returns an error outcome
    /// unchanged.
    pub(crate) fn into_success(self) -> Result<Option<Resolved>, Self> {
        match self.side {
            Side::Success(body) => Ok(body),
            Side::Error(_) => Err(self),
        }
    }

    /// Returns `true` for a success outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.side, Side::Success(_))
    }

    /// The status line and headers.
    #[must_use]
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// The status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.head().status
    }

    /// The reason phrase.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.head().message
    }

    /// The resolved body of a success outcome.
    #[must_use]
    pub fn body(&self) -> Option<&Resolved> {
        match &self.side {
            Side::Success(body) => body.as_ref(),
            Side::Error(_) => None,
        }
    }

    /// The buffered body of an error outcome.
    #[must_use]
    pub fn error_body(&self) -> Option<&Bytes> {
        match &self.side {
            Side::Success(_) => None,
            Side::Error(body) => Some(body),
        }
    }
}

/// The error returned when an outcome is built with a status on the wrong
/// side.
#[derive(Debug, Snafu)]
#[snafu(display("Status {status} does not belong to the {expected} side of a response"))]
pub struct StatusMismatch {
    status: StatusCode,
    expected: &'static str,
}

impl crate::Error for StatusMismatch {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Errors resolving a successful body into its declared shape.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResolveError {
    /// A text body is not valid UTF-8.
    #[snafu(display("Response body is not valid UTF-8"))]
    Text {
        /// The underlying error.
        source: FromUtf8Error,
    },
    /// The body codec failed.
    #[snafu(display("Failed to decode response body"))]
    Decode {
        /// The underlying error.
        source: BoxedError,
    },
    /// A structured body does not match the requested type.
    #[snafu(display("Response body does not match the requested type"))]
    Deserialize {
        /// The underlying error.
        source: serde_json::Error,
    },
    /// An existing download target could not be removed.
    #[snafu(display("Failed to remove existing file {}", path.display()))]
    RemoveExisting {
        /// The download target.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The download target could not be created.
    #[snafu(display("Failed to create file {}", path.display()))]
    CreateFile {
        /// The download target.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The download target could not be written.
    #[snafu(display("Failed to write file {}", path.display()))]
    WriteFile {
        /// The download target.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// A downloaded file could not be read back.
    #[snafu(display("Failed to read back file {}", path.display()))]
    ReadBack {
        /// The downloaded file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// A temp file could not be created.
    #[snafu(display("Failed to create temp file"))]
    TempFile {
        /// The underlying error.
        source: std::io::Error,
    },
    /// A temp file could not be kept.
    #[snafu(display("Failed to keep temp file"))]
    KeepTempFile {
        /// The underlying error.
        source: tempfile::PathPersistError,
    },
}

impl crate::Error for ResolveError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Classifies an exchange and resolves a successful body.
pub(crate) async fn resolve(
    exchange: Exchange,
    returns: Returns,
    download: Option<&Download>,
    codec: &dyn BodyCodec,
) -> Result<InternalResponse, ResolveError> {
    let (parts, body) = exchange.into_parts();
    let head = ResponseHead::new(parts.status, parts.headers);

    if !head.status.is_success() {
        tracing::debug!(status = head.status.as_u16(), len = body.len(), "Error response");
        return Ok(InternalResponse {
            head,
            side: Side::Error(body),
        });
    }

    if matches!(
        head.status,
        StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT
    ) {
        return Ok(InternalResponse {
            head,
            side: Side::Success(None),
        });
    }

    let resolved = match returns.shape {
        ReturnShape::Text => Resolved::Text(String::from_utf8(body.to_vec()).context(TextSnafu)?),
        ReturnShape::Raw => Resolved::Raw(RawBody {
            content_type: head.headers.get(CONTENT_TYPE).cloned(),
            bytes: body,
        }),
        ReturnShape::File => Resolved::File(download::persist(&body, download).await?),
        ReturnShape::Stream | ReturnShape::Bytes | ReturnShape::Void => match download {
            Some(_) => {
                let path = download::persist(&body, download).await?;
                rewrap(returns.shape, path).await?
            }
            None => match returns.shape {
                ReturnShape::Stream => Resolved::Stream(BodyStream::new(Cursor::new(body))),
                ReturnShape::Bytes => Resolved::Bytes(body),
                _ => Resolved::Void,
            },
        },
        ReturnShape::Structured => {
            Resolved::Structured(codec.decode(&body).context(DecodeSnafu)?)
        }
    };

    Ok(InternalResponse {
        head,
        side: Side::Success(Some(resolved)),
    })
}

/// Reopens a persisted body in the requested shape.
async fn rewrap(shape: ReturnShape, path: PathBuf) -> Result<Resolved, ResolveError> {
    match shape {
        ReturnShape::Stream => {
            let file = tokio::fs::File::open(&path)
                .await
                .context(ReadBackSnafu { path: &path })?;
            Ok(Resolved::Stream(BodyStream::new(file)))
        }
        ReturnShape::Bytes => {
            let bytes = tokio::fs::read(&path)
                .await
                .context(ReadBackSnafu { path: &path })?;
            Ok(Resolved::Bytes(Bytes::from(bytes)))
        }
        _ => Ok(Resolved::Void),
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;
    use crate::convert::JsonCodec;

    fn exchange(status: u16, body: &'static [u8]) -> Exchange {
        let mut response = http::Response::new(Bytes::from_static(body));
        *response.status_mut() = StatusCode::from_u16(status).unwrap();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response
    }

    fn shape(shape: ReturnShape) -> Returns {
        Returns {
            shape,
            wrapped: false,
        }
    }

    #[tokio::test]
    async fn test_no_content_has_null_body() {
        for status in [204, 205] {
            let response = resolve(exchange(status, b""), shape(ReturnShape::Structured), None, &JsonCodec)
                .await
                .unwrap();
            assert!(response.is_success());
            assert!(response.body().is_none());
        }
    }

    #[tokio::test]
    async fn test_error_body_is_buffered() {
        let response = resolve(
            exchange(404, b"no such user"),
            shape(ReturnShape::Structured),
            None,
            &JsonCodec,
        )
        .await
        .unwrap();

        assert!(!response.is_success());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.message(), "Not Found");
        assert_eq!(response.error_body().unwrap(), "no such user");
    }

    #[tokio::test]
    async fn test_error_skips_shape_decoding() {
        let response = resolve(exchange(500, b"<html>"), shape(ReturnShape::Structured), None, &JsonCodec)
            .await
            .unwrap();
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_shapes() {
        let text = resolve(exchange(200, b"hello"), shape(ReturnShape::Text), None, &JsonCodec)
            .await
            .unwrap();
        assert!(matches!(text.body(), Some(Resolved::Text(t)) if t == "hello"));

        let raw = resolve(exchange(200, b"hello"), shape(ReturnShape::Raw), None, &JsonCodec)
            .await
            .unwrap();
        let Some(Resolved::Raw(raw)) = raw.body() else {
            unreachable!("expected raw body");
        };
        assert_eq!(raw.content_type().unwrap(), "text/plain");
        assert_eq!(raw.bytes(), "hello");

        let structured = resolve(exchange(200, br#"{"id":1}"#), shape(ReturnShape::Structured), None, &JsonCodec)
            .await
            .unwrap();
        assert!(matches!(
            structured.body(),
            Some(Resolved::Structured(v)) if v["id"] == 1
        ));

        let void = resolve(exchange(200, b"ignored"), shape(ReturnShape::Void), None, &JsonCodec)
            .await
            .unwrap();
        assert!(matches!(void.body(), Some(Resolved::Void)));
    }

    #[tokio::test]
    async fn test_stream_shape() {
        let response = resolve(exchange(200, b"chunked"), shape(ReturnShape::Stream), None, &JsonCodec)
            .await
            .unwrap();
        let Some(Resolved::Stream(stream)) = response.body() else {
            unreachable!("expected stream body");
        };
        assert_eq!(stream.read_to_end().await.unwrap(), "chunked");
    }

    #[tokio::test]
    async fn test_invalid_utf8_text() {
        let err = resolve(exchange(200, &[0xff, 0xfe]), shape(ReturnShape::Text), None, &JsonCodec)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Text { .. }));
    }

    #[tokio::test]
    async fn test_bytes_without_download() {
        let response = resolve(exchange(200, b"\x00\x01"), shape(ReturnShape::Bytes), None, &JsonCodec)
            .await
            .unwrap();
        assert!(matches!(response.body(), Some(Resolved::Bytes(b)) if b.as_ref() == b"\x00\x01"));
    }

    #[tokio::test]
    async fn test_bytes_with_download() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("payload.bin");
        tokio::fs::write(&target, b"stale").await.unwrap();
        let download = Download::to(&target).overwrite(true);

        let response = resolve(
            exchange(200, b"\x00\x01"),
            shape(ReturnShape::Bytes),
            Some(&download),
            &JsonCodec,
        )
        .await
        .unwrap();

        assert!(matches!(response.body(), Some(Resolved::Bytes(b)) if b.as_ref() == b"\x00\x01"));
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"\x00\x01");
    }

    #[tokio::test]
    async fn test_file_shape_defaults_to_temp() {
        let response = resolve(exchange(200, b"file body"), shape(ReturnShape::File), None, &JsonCodec)
            .await
            .unwrap();
        let Some(Resolved::File(path)) = response.body() else {
            unreachable!("expected file body");
        };
        assert_eq!(tokio::fs::read(path).await.unwrap(), b"file body");
        tokio::fs::remove_file(path).await.unwrap();
    }

    #[test]
    fn test_constructors_reject_wrong_side() {
        let ok = ResponseHead::new(StatusCode::OK, HeaderMap::new());
        let missing = ResponseHead::new(StatusCode::NOT_FOUND, HeaderMap::new());

        assert!(InternalResponse::success(ok.clone(), None).is_ok());
        assert!(InternalResponse::error(ok, Bytes::new()).is_err());
        assert!(InternalResponse::success(missing.clone(), None).is_err());
        assert!(InternalResponse::error(missing, Bytes::new()).is_ok());
    }

    #[test]
    fn test_sides_are_exclusive() {
        let ok = ResponseHead::new(StatusCode::OK, HeaderMap::new());
        let missing = ResponseHead::new(StatusCode::NOT_FOUND, HeaderMap::new());

        let success = InternalResponse::success(ok, Some(Resolved::Void)).unwrap();
        assert!(success.is_success());
        assert!(success.error_body().is_none());
        assert!(matches!(success.into_success(), Ok(Some(Resolved::Void))));

        let error = InternalResponse::error(missing, Bytes::from_static(b"gone")).unwrap();
        assert!(!error.is_success());
        assert!(error.body().is_none());
        let error = error.into_success().unwrap_err();
        assert_eq!(error.error_body().unwrap(), "gone");
    }
}
