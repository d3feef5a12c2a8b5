//! HTTP client and response abstractions.
//!
//! This module defines traits that decouple the framework from any specific
//! HTTP implementation. Users provide their own [`HttpClient`] (e.g. backed
//! by `reqwest`, `hyper`, or an in-memory test double) and the framework
//! operates against these traits. The client is type-erased once, when a
//! [`Flare`](crate::Flare) is built, so calls never carry its type.
//!
//! Around the client sit the pluggable hooks of the transport boundary:
//! [`Interceptor`] chains, the [`Dispatcher`] that runs enqueued calls, and
//! [`DynamicHeader`] providers.

mod dispatch;
mod header;
mod interceptor;
#[cfg(feature = "http-client-reqwest-0_13")]
mod reqwest_0_13;

use std::{convert::Infallible, pin::Pin};

use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};

use crate::BoxedError;

pub use dispatch::{DispatchError, Dispatcher, TaskDispatcher};
pub use header::{DynamicHeader, HttpHeader};
pub use interceptor::{Interceptor, LoggingInterceptor, Next};
#[cfg(feature = "http-client-reqwest-0_13")]
pub use reqwest_0_13::{TlsError, reqwest_client};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A response whose body has been read into memory.
///
/// This is what interceptors observe and what the response resolver
/// consumes.
pub type Exchange = http::Response<Bytes>;

/// Defines the common interface for HTTP requests.
pub trait HttpClient: Send + Sync {
    /// The error type returned by the client for a failed request.
    type Error: crate::Error;

    /// The associated response type returned by this HTTP client.
    type Response: HttpResponse;

    /// Executes an HTTP request and returns an owned response.
    ///
    /// # Arguments
    ///
    /// * `request`: The `http::Request` to be executed. The body is provided as `bytes::Bytes`.
    ///
    /// # Returns
    ///
    /// A `Future` that resolves to a `Result` containing the `Self::Response` on success,
    /// or `Self::Error` on failure.
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send;
}

/// Defines the common interface for HTTP responses.
pub trait HttpResponse: Send + Sync {
    /// The error type when getting the response body.
    type Error: crate::Error;

    /// Returns the HTTP status code of the response.
    fn status(&self) -> StatusCode;

    /// Returns the response's HTTP headers.
    fn headers(&self) -> HeaderMap;

    /// Consumes the response and asynchronously returns its body as `bytes::Bytes`.
    fn body(self) -> impl Future<Output = Result<Bytes, Self::Error>> + Send;
}

impl HttpResponse for http::Response<Bytes> {
    type Error = Infallible;

    fn status(&self) -> StatusCode {
        self.status()
    }

    fn headers(&self) -> HeaderMap {
        self.headers().clone()
    }

    async fn body(self) -> Result<Bytes, Self::Error> {
        Ok(self.into_body())
    }
}

/// An object-safe view of an [`HttpClient`].
pub(crate) trait Transport: Send + Sync {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Exchange, BoxedError>>;
}

impl<C: HttpClient> Transport for C {
    fn send(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Exchange, BoxedError>> {
        Box::pin(async move {
            let response = self
                .execute(request)
                .await
                .map_err(BoxedError::from_err)?;
            let status = response.status();
            let headers = response.headers();
            let body = response.body().await.map_err(BoxedError::from_err)?;

            let mut exchange = http::Response::new(body);
            *exchange.status_mut() = status;
            *exchange.headers_mut() = headers;
            Ok(exchange)
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use http::{Request, StatusCode};
    use snafu::Snafu;

    use super::HttpClient;

    #[derive(Debug, Snafu)]
    #[snafu(display("mock connection refused"))]
    pub struct MockError;

    impl crate::Error for MockError {
        fn is_retryable(&self) -> bool {
            true
        }
    }

    /// A client answering every request with one canned response and
    /// recording what it was sent.
    #[derive(Clone, Default)]
    pub struct MockClient {
        pub status: Option<StatusCode>,
        pub content_type: Option<&'static str>,
        pub body: Bytes,
        pub fail: bool,
        pub delay: Option<std::time::Duration>,
        pub seen: Arc<Mutex<Vec<Request<Bytes>>>>,
    }

    impl MockClient {
        pub fn json(status: u16, body: &'static str) -> Self {
            Self {
                status: StatusCode::from_u16(status).ok(),
                content_type: Some("application/json"),
                body: Bytes::from_static(body.as_bytes()),
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn requests(&self) -> Vec<Request<Bytes>> {
            let mut seen = self.seen.lock().unwrap();
            std::mem::take(&mut *seen)
        }
    }

    impl HttpClient for MockClient {
        type Error = MockError;
        type Response = http::Response<Bytes>;

        async fn execute(&self, request: Request<Bytes>) -> Result<Self::Response, Self::Error> {
            self.seen.lock().unwrap().push(request);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return MockSnafu.fail();
            }
            let mut response = http::Response::new(self.body.clone());
            *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
            if let Some(content_type) = self.content_type {
                response.headers_mut().insert(
                    http::header::CONTENT_TYPE,
                    http::HeaderValue::from_static(content_type),
                );
            }
            Ok(response)
        }
    }
}
