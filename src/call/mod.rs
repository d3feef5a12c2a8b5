//! Executable calls and their outcomes.
//!
//! A [`Call`] wraps one method invocation. It runs at most once, either
//! awaited directly with [`Call::execute`] or handed to the dispatch pool
//! with [`Call::enqueue`]. [`Clone`] yields a fresh, unexecuted call with the
//! same template and arguments, for retries.

mod adapter;

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use http::StatusCode;
use snafu::{ResultExt as _, Snafu, ensure};
use tokio::sync::Notify;

pub use adapter::{FromReply, Json, Reply};
pub(crate) use adapter::adapt;

use crate::{
    BoxedError,
    client::Flare,
    http::DispatchError,
    request::{ParameterError, RequestTemplate},
    response::{InternalResponse, ResolveError},
    value::Value,
};

/// Errors from executing a call.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CallError {
    /// The call was already executed or enqueued.
    #[snafu(display("Call already executed"))]
    AlreadyExecuted,
    /// The call was canceled.
    #[snafu(display("Call canceled"))]
    Canceled,
    /// An argument could not be bound.
    #[snafu(display("Failed to build request"))]
    Parameter {
        /// The underlying error.
        source: ParameterError,
    },
    /// The transport or an interceptor failed.
    #[snafu(display("Transport failed"))]
    Transport {
        /// The underlying error.
        source: BoxedError,
    },
    /// The call did not finish within the configured timeout.
    #[snafu(display("Call timed out after {timeout:?}"))]
    Timeout {
        /// The configured timeout.
        timeout: Duration,
        /// The underlying error.
        source: tokio::time::error::Elapsed,
    },
    /// A successful body could not be resolved.
    #[snafu(display("Failed to resolve response"))]
    Resolve {
        /// The underlying error.
        source: ResolveError,
    },
    /// The server answered with a non-2xx status.
    #[snafu(display("HTTP {} {message}", status.as_u16()))]
    Http {
        /// The status code.
        status: StatusCode,
        /// The reason phrase.
        message: String,
        /// The full error response.
        response: Box<InternalResponse>,
    },
    /// The resolved body does not have the requested shape.
    #[snafu(display("Expected a {expected} response body, found {found}"))]
    ShapeMismatch {
        /// The requested shape.
        expected: &'static str,
        /// The resolved shape.
        found: &'static str,
    },
    /// The call could not be handed to the dispatch pool.
    #[snafu(display("Failed to dispatch call"))]
    Dispatch {
        /// The underlying error.
        source: DispatchError,
    },
}

impl crate::Error for CallError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source } => source.is_retryable(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => status.is_server_error(),
            Self::AlreadyExecuted
            | Self::Canceled
            | Self::Parameter { .. }
            | Self::Resolve { .. }
            | Self::ShapeMismatch { .. }
            | Self::Dispatch { .. } => false,
        }
    }
}

#[derive(Debug, Default)]
struct CallState {
    executed: AtomicBool,
    canceled: AtomicBool,
    notify: Notify,
}

impl CallState {
    /// Resolves once the call is canceled.
    async fn canceled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.canceled.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// One invocation of a service method.
pub struct Call {
    flare: Arc<Flare>,
    contract: Arc<str>,
    template: Arc<RequestTemplate>,
    args: Arc<[Value]>,
    state: Arc<CallState>,
}

impl Call {
    pub(crate) fn new(
        flare: Arc<Flare>,
        contract: Arc<str>,
        template: Arc<RequestTemplate>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            flare,
            contract,
            template,
            args: args.into(),
            state: Arc::default(),
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
        &self.template.method_name
    }

    /// The compiled template this call builds its request from.
    #[must_use]
    pub fn template(&self) -> &RequestTemplate {
        &self.template
    }

    /// Returns `true` once the call was executed or enqueued.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.state.executed.load(Ordering::Acquire)
    }

    /// Returns `true` once the call was canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::Acquire)
    }

    /// Cancels the call. Idempotent.
    ///
    /// A call canceled before it runs never reaches the transport; a call
    /// canceled while in flight is abandoned and fails with
    /// [`CallError::Canceled`].
    pub fn cancel(&self) {
        if !self.state.canceled.swap(true, Ordering::AcqRel) {
            tracing::debug!(contract = %self.contract, method = self.method(), "Call canceled");
            self.state.notify.notify_waiters();
        }
    }

    /// Executes the call and waits for its outcome.
    ///
    /// Non-2xx responses are returned as [`InternalResponse::Error`], not
    /// as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the call was already executed, was canceled, or
    /// failed before a response arrived.
    pub async fn execute(&self) -> Result<InternalResponse, CallError> {
        self.mark_executed()?;
        self.run().await
    }

    /// Runs the call on the dispatch pool and passes its outcome to
    /// `callback`, exactly once.
    ///
    /// A panic in `callback` is caught and logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the call was already executed or the dispatcher
    /// refused it.
    pub fn enqueue<F>(&self, callback: F) -> Result<(), CallError>
    where
        F: FnOnce(Result<InternalResponse, CallError>) + Send + 'static,
    {
        self.mark_executed()?;

        let call = self.share();
        let task = async move {
            let result = call.run().await;
            if panic::catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
                tracing::error!(
                    contract = %call.contract,
                    method = call.method(),
                    "Call callback panicked"
                );
            }
        };
        self.flare.dispatch(Box::pin(task)).context(DispatchSnafu)
    }

    fn mark_executed(&self) -> Result<(), CallError> {
        ensure!(
            !self.state.executed.swap(true, Ordering::AcqRel),
            AlreadyExecutedSnafu
        );
        Ok(())
    }

    async fn run(&self) -> Result<InternalResponse, CallError> {
        ensure!(!self.is_canceled(), CanceledSnafu);

        let exchange = async {
            let exchange = self.flare.exchange(&self.contract, &self.template, &self.args);
            match self.flare.timeout() {
                Some(timeout) => tokio::time::timeout(timeout, exchange)
                    .await
                    .context(TimeoutSnafu { timeout })?,
                None => exchange.await,
            }
        };

        tokio::select! {
            biased;
            () = self.state.canceled() => CanceledSnafu.fail(),
            result = exchange => result,
        }
    }

    /// A handle to this same call, sharing its state.
    fn share(&self) -> Self {
        Self {
            flare: self.flare.clone(),
            contract: self.contract.clone(),
            template: self.template.clone(),
            args: self.args.clone(),
            state: self.state.clone(),
        }
    }
}

impl Clone for Call {
    /// Returns a fresh, unexecuted call with the same template and arguments.
    fn clone(&self) -> Self {
        Self {
            state: Arc::default(),
            ..self.share()
        }
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("contract", &self.contract)
            .field("method", &self.method())
            .field("executed", &self.is_executed())
            .field("canceled", &self.is_canceled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::{
        Flare,
        contract::{MethodDescriptor, Param, ServiceContract},
        http::{
            DispatchError, Dispatcher, BoxFuture,
            mock::MockClient,
        },
    };

    fn service(client: MockClient) -> crate::Service {
        Flare::builder()
            .base_url("http://api.test")
            .unwrap()
            .http_client(client)
            .build()
            .create(
                &ServiceContract::new("users").method(
                    MethodDescriptor::new("get_user")
                        .get("/users/{id}")
                        .param(Param::path("id")),
                ),
            )
            .unwrap()
    }

    fn get_user(client: MockClient) -> Call {
        service(client).call("get_user", vec!["42".into()]).unwrap()
    }

    #[tokio::test]
    async fn test_execute_once() {
        let call = get_user(MockClient::json(200, r#"{"id":42}"#));

        let response = call.execute().await.unwrap();
        assert!(response.is_success());
        assert!(call.is_executed());

        let err = call.execute().await.unwrap_err();
        assert!(matches!(err, CallError::AlreadyExecuted));
    }

    #[tokio::test]
    async fn test_clone_is_fresh() {
        let client = MockClient::json(200, "{}");
        let call = get_user(client.clone());
        call.execute().await.unwrap();

        let retry = call.clone();
        assert!(!retry.is_executed());
        retry.execute().await.unwrap();
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_error_status_is_an_outcome() {
        let call = get_user(MockClient::json(404, r#"{"error":"missing"}"#));

        let response = call.execute().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.error_body().unwrap(), r#"{"error":"missing"}"#);
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let call = get_user(MockClient::failing());

        let err = call.execute().await.unwrap_err();
        assert!(matches!(err, CallError::Transport { .. }));
        assert!(crate::Error::is_retryable(&err));
    }

    #[tokio::test]
    async fn test_cancel_before_execute() {
        let client = MockClient::json(200, "{}");
        let call = get_user(client.clone());

        call.cancel();
        call.cancel();
        assert!(call.is_canceled());

        let err = call.execute().await.unwrap_err();
        assert!(matches!(err, CallError::Canceled));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_in_flight() {
        let client = MockClient {
            delay: Some(Duration::from_secs(30)),
            ..MockClient::json(200, "{}")
        };
        let call = get_user(client);

        let canceler = call.share();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceler.cancel();
        });

        let err = call.execute().await.unwrap_err();
        assert!(matches!(err, CallError::Canceled));
    }

    #[tokio::test]
    async fn test_timeout() {
        let client = MockClient {
            delay: Some(Duration::from_secs(30)),
            ..MockClient::json(200, "{}")
        };
        let service = Flare::builder()
            .base_url("http://api.test")
            .unwrap()
            .http_client(client)
            .timeout(Duration::from_millis(10))
            .build()
            .create(&ServiceContract::new("s").method(MethodDescriptor::new("slow").get("/slow")))
            .unwrap();

        let err = service.call("slow", vec![]).unwrap().execute().await.unwrap_err();
        assert!(matches!(err, CallError::Timeout { .. }));
        assert!(crate::Error::is_retryable(&err));
    }

    #[tokio::test]
    async fn test_enqueue_invokes_callback_once() {
        let call = get_user(MockClient::json(200, "{}"));
        let (tx, rx) = oneshot::channel();

        call.enqueue(move |result| {
            drop(tx.send(result.map(|r| r.status())));
        })
        .unwrap();

        assert_eq!(rx.await.unwrap().unwrap(), StatusCode::OK);
        assert!(matches!(
            call.enqueue(|_| {}).unwrap_err(),
            CallError::AlreadyExecuted
        ));
    }

    #[derive(Default)]
    struct Spawning {
        tasks: std::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    }

    impl Dispatcher for Spawning {
        fn dispatch(&self, task: BoxFuture<'static, ()>) -> Result<(), DispatchError> {
            self.tasks.lock().unwrap().push(tokio::spawn(task));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_enqueue_survives_panicking_callback() {
        let dispatcher = Arc::new(Spawning::default());
        let service = Flare::builder()
            .base_url("http://api.test")
            .unwrap()
            .http_client(MockClient::json(200, "{}"))
            .dispatcher(dispatcher.clone() as Arc<dyn Dispatcher>)
            .build()
            .create(&ServiceContract::new("s").method(MethodDescriptor::new("ping").get("/ping")))
            .unwrap();

        service
            .call("ping", vec![])
            .unwrap()
            .enqueue(|_| unreachable!("callback failure"))
            .unwrap();
        let (tx, rx) = oneshot::channel();
        service
            .call("ping", vec![])
            .unwrap()
            .enqueue(move |result| drop(tx.send(result.is_ok())))
            .unwrap();

        assert!(rx.await.unwrap());
        let tasks = std::mem::take(&mut *dispatcher.tasks.lock().unwrap());
        assert_eq!(tasks.len(), 2);
        for task in tasks {
            // A panic escaping the callback would surface as a JoinError.
            task.await.unwrap();
        }
    }

    struct Refusing;

    impl Dispatcher for Refusing {
        fn dispatch(&self, _task: BoxFuture<'static, ()>) -> Result<(), DispatchError> {
            Err(DispatchError::Rejected {
                reason: "shutting down".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn test_enqueue_rejected_by_dispatcher() {
        let service = Flare::builder()
            .base_url("http://api.test")
            .unwrap()
            .http_client(MockClient::json(200, "{}"))
            .dispatcher(Arc::new(Refusing))
            .build()
            .create(&ServiceContract::new("s").method(MethodDescriptor::new("ping").get("/ping")))
            .unwrap();

        let err = service
            .call("ping", vec![])
            .unwrap()
            .enqueue(|_| {})
            .unwrap_err();
        assert!(matches!(err, CallError::Dispatch { .. }));
    }
}
