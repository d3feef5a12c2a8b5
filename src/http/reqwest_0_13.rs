use super::{HttpClient, HttpResponse};

use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use snafu::{ResultExt as _, Snafu};

use crate::config::TlsSettings;

impl HttpClient for reqwest::Client {
    /// The response type is `reqwest::Response`.
    type Response = reqwest::Response;
    /// The error type is `reqwest::Error`.
    type Error = reqwest::Error;

    /// Executes an `http::Request` using the `reqwest::Client`.
    ///
    /// The generic `http::Request<Bytes>` is converted into a
    /// `reqwest::Request` before sending; extensions are not carried over.
    async fn execute(&self, request: Request<Bytes>) -> Result<Self::Response, Self::Error> {
        let (parts, body) = request.into_parts();
        let reqwest_request = self
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers)
            .body(body)
            .build()?;

        reqwest::Client::execute(self, reqwest_request).await
    }
}

impl HttpResponse for reqwest::Response {
    type Error = reqwest::Error;

    fn status(&self) -> StatusCode {
        self.status()
    }

    fn headers(&self) -> HeaderMap {
        self.headers().clone()
    }

    async fn body(self) -> Result<Bytes, Self::Error> {
        self.bytes().await
    }
}

impl crate::Error for reqwest::Error {
    fn is_retryable(&self) -> bool {
        self.is_connect() || self.is_timeout()
    }
}

/// Errors building a `reqwest` client from [`TlsSettings`].
#[derive(Debug, Snafu)]
pub enum TlsError {
    /// A root certificate could not be parsed.
    #[snafu(display("Failed to parse root certificate #{index}"))]
    Certificate {
        /// Position of the certificate in the settings.
        index: usize,
        /// The underlying error.
        source: reqwest::Error,
    },
    /// The client could not be built.
    #[snafu(display("Failed to build HTTP client"))]
    Build {
        /// The underlying error.
        source: reqwest::Error,
    },
}

impl crate::Error for TlsError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Builds a `reqwest` client honoring the TLS override points.
///
/// # Errors
///
/// Returns an error if a PEM certificate is malformed or the TLS backend
/// rejects the configuration.
pub fn reqwest_client(settings: &TlsSettings) -> Result<reqwest::Client, TlsError> {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .danger_accept_invalid_hostnames(settings.accept_invalid_hostnames);

    for (index, pem) in settings.root_certificates_pem.iter().enumerate() {
        let certificate =
            reqwest::Certificate::from_pem(pem.as_bytes()).context(CertificateSnafu { index })?;
        builder = builder.add_root_certificate(certificate);
    }

    builder.build().context(BuildSnafu)
}
