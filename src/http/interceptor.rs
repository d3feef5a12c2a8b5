use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use http::Request;

use super::{BoxFuture, Exchange, Transport};
use crate::BoxedError;

/// A hook around the exchange of one request.
///
/// Interceptors may inspect or rewrite the request, short-circuit with their
/// own response, or pass the request on through [`Next::run`].
///
/// Method-level interceptors run before global ones, and application
/// interceptors run before network interceptors.
pub trait Interceptor: Send + Sync {
    /// Handles one request.
    fn intercept<'a>(
        &'a self,
        request: Request<Bytes>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Exchange, BoxedError>>;
}

/// The remainder of an interceptor chain, ending at the transport.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Interceptor>], transport: &'a dyn Transport) -> Self {
        Self { chain, transport }
    }

    /// Passes the request to the next interceptor, or to the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if a later interceptor or the transport fails.
    pub async fn run(self, request: Request<Bytes>) -> Result<Exchange, BoxedError> {
        match self.chain.split_first() {
            Some((first, rest)) => {
                first
                    .intercept(request, Next::new(rest, self.transport))
                    .await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// Emits one `tracing` event per exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn intercept<'a>(
        &'a self,
        request: Request<Bytes>,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Exchange, BoxedError>> {
        Box::pin(async move {
            let method = request.method().clone();
            let uri = request.uri().clone();
            let sent = request.body().len();
            let started = Instant::now();

            let result = next.run(request).await;
            let elapsed_ms = started.elapsed().as_millis();
            match &result {
                Ok(exchange) => tracing::info!(
                    %method,
                    %uri,
                    status = exchange.status().as_u16(),
                    sent,
                    received = exchange.body().len(),
                    elapsed_ms,
                    "HTTP exchange"
                ),
                Err(error) => tracing::info!(%method, %uri, %error, elapsed_ms, "HTTP exchange failed"),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{HeaderValue, StatusCode};

    use super::*;
    use crate::http::mock::MockClient;

    struct Stamp(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Interceptor for Stamp {
        fn intercept<'a>(
            &'a self,
            mut request: Request<Bytes>,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<Exchange, BoxedError>> {
            Box::pin(async move {
                self.1.lock().unwrap().push(self.0);
                request
                    .headers_mut()
                    .append("x-seen", HeaderValue::from_static(self.0));
                next.run(request).await
            })
        }
    }

    struct ShortCircuit;

    impl Interceptor for ShortCircuit {
        fn intercept<'a>(
            &'a self,
            _request: Request<Bytes>,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Result<Exchange, BoxedError>> {
            Box::pin(async move {
                let mut response = http::Response::new(Bytes::from_static(b"cached"));
                *response.status_mut() = StatusCode::ACCEPTED;
                Ok(response)
            })
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(Stamp("local", order.clone())),
            Arc::new(LoggingInterceptor),
            Arc::new(Stamp("global", order.clone())),
        ];
        let client = MockClient::json(200, "{}");

        let exchange = Next::new(&chain, &client)
            .run(Request::new(Bytes::new()))
            .await
            .unwrap();

        assert_eq!(exchange.status(), StatusCode::OK);
        assert_eq!(*order.lock().unwrap(), ["local", "global"]);
        let sent = client.requests();
        let seen: Vec<_> = sent[0].headers().get_all("x-seen").iter().collect();
        assert_eq!(seen, ["local", "global"]);
    }

    #[tokio::test]
    async fn test_interceptor_can_short_circuit() {
        let chain: Vec<Arc<dyn Interceptor>> = vec![Arc::new(ShortCircuit)];
        let client = MockClient::json(200, "{}");

        let exchange = Next::new(&chain, &client)
            .run(Request::new(Bytes::new()))
            .await
            .unwrap();

        assert_eq!(exchange.status(), StatusCode::ACCEPTED);
        assert!(client.requests().is_empty());
    }
}
