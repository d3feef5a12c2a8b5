//! The framework entry point and the services it creates.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bon::Builder;
use http::HeaderMap;
use snafu::{OptionExt as _, ResultExt as _, Snafu, ensure};

use crate::{
    BaseUrl, IntoBaseUrl,
    cache::{ServiceId, TemplateCache},
    call::{self, Call, CallError, FromReply, Reply},
    config::{BaseUrlSnafu, FlareSettings, SettingsError},
    contract::{MethodDescriptor, ServiceContract},
    convert::{
        BodyCodec, FlatteningConverter, FormFieldConverter, JsonCodec, ScalarStringConverter,
        StringConverter,
    },
    client::builder::{SetBaseUrl, SetHeaders, SetLogEnabled, SetTimeout},
    http::{
        BoxFuture, DispatchError, Dispatcher, DynamicHeader, HttpClient, Interceptor,
        LoggingInterceptor, Next, TaskDispatcher, Transport,
    },
    request::{
        self, BindContext, ContractError, DuplicateMethodSnafu, EmptyContractNameSnafu, Globals,
        RequestTemplate,
    },
    response::{self, InternalResponse},
    value::Value,
};

fn erase<C: HttpClient + 'static>(client: C) -> Arc<dyn Transport> {
    Arc::new(client)
}

/// Immutable framework configuration.
///
/// Build one with [`Flare::builder`], then turn contracts into callable
/// [`Service`]s with [`Flare::create`]. Nothing can be changed after
/// `build()`; templates compiled for one `Flare` are shared by its clones.
///
/// ```no_run
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use flare::{
///     Flare,
///     call::Json,
///     contract::{MethodDescriptor, Param, ServiceContract},
/// };
///
/// #[derive(serde::Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// let flare = Flare::builder()
///     .base_url("https://api.example.com/v1")?
///     .http_client(reqwest::Client::new())
///     .build();
///
/// let users = flare.create(
///     &ServiceContract::new("users").method(
///         MethodDescriptor::new("get_user")
///             .get("/users/{id}")
///             .param(Param::path("id"))
///             .param(Param::query("verbose")),
///     ),
/// )?;
///
/// let Json(user) = users
///     .invoke_as::<Json<User>>("get_user", vec!["42".into(), true.into()])
///     .await?;
/// println!("{} {}", user.id, user.name);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Builder)]
#[builder(state_mod(name = "builder"))]
pub struct Flare {
    /// The URL every relative path is resolved against.
    #[builder(setters(name = "base_url_parsed"))]
    base_url: BaseUrl,

    /// The transport.
    #[builder(with = |client: impl HttpClient + 'static| erase(client))]
    http_client: Arc<dyn Transport>,

    /// The pool that runs enqueued calls.
    #[builder(default = Arc::new(TaskDispatcher::new()) as Arc<dyn Dispatcher>)]
    dispatcher: Arc<dyn Dispatcher>,

    /// Encodes request bodies and decodes structured responses.
    #[builder(default = Arc::new(JsonCodec) as Arc<dyn BodyCodec>)]
    codec: Arc<dyn BodyCodec>,

    /// Converts path and header arguments to text.
    #[builder(default = Arc::new(ScalarStringConverter) as Arc<dyn StringConverter>)]
    string_converter: Arc<dyn StringConverter>,

    /// Flattens query and form arguments.
    #[builder(default = Arc::new(FlatteningConverter) as Arc<dyn FormFieldConverter>)]
    form_field_converter: Arc<dyn FormFieldConverter>,

    /// Headers added to every request unless already set.
    #[builder(default)]
    headers: HeaderMap,

    /// Header providers run before each method's own.
    #[builder(default)]
    dynamic_headers: Vec<Arc<dyn DynamicHeader>>,

    /// Application interceptors, run after each method's own.
    #[builder(default)]
    interceptors: Vec<Arc<dyn Interceptor>>,

    /// Network interceptors, run after each method's own.
    #[builder(default)]
    net_interceptors: Vec<Arc<dyn Interceptor>>,

    /// The per-call timeout.
    timeout: Option<Duration>,

    /// If true, a [`LoggingInterceptor`] runs between the application and
    /// network interceptors.
    #[builder(default = false)]
    log_enabled: bool,

    #[builder(skip)]
    cache: TemplateCache,
}

impl std::fmt::Debug for Flare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flare")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("dynamic_headers", &self.dynamic_headers.len())
            .field("interceptors", &self.interceptors.len())
            .field("net_interceptors", &self.net_interceptors.len())
            .field("timeout", &self.timeout)
            .field("log_enabled", &self.log_enabled)
            .field("templates", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl<S: builder::State> FlareBuilder<S> {
    /// Sets the base URL.
    ///
    /// Accepts any type that implements [`IntoBaseUrl`], including `&str`,
    /// [`String`], [`Url`](url::Url), and [`BaseUrl`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or is not HTTP(S).
    pub fn base_url<U: IntoBaseUrl>(
        self,
        url: U,
    ) -> Result<FlareBuilder<builder::SetBaseUrl<S>>, U::Error>
    where
        S::BaseUrl: builder::IsUnset,
    {
        Ok(self.base_url_parsed(url.into_base_url()?))
    }
}

impl Flare {
    /// Starts a builder from loaded settings.
    ///
    /// The transport still has to be supplied; with the bundled reqwest
    /// client, build it with [`reqwest_client`](crate::http::reqwest_client)
    /// from the same settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or a header is invalid.
    #[allow(clippy::type_complexity)]
    pub fn builder_from_settings(
        settings: &FlareSettings,
    ) -> Result<FlareBuilder<SetLogEnabled<SetTimeout<SetHeaders<SetBaseUrl<builder::Empty>>>>>, SettingsError>
    {
        let base_url = settings
            .base_url
            .as_str()
            .into_base_url()
            .context(BaseUrlSnafu)?;
        Ok(Self::builder()
            .base_url_parsed(base_url)
            .headers(settings.header_map()?)
            .maybe_timeout(settings.timeout())
            .log_enabled(settings.log_enabled))
    }

    /// Compiles every method of `contract` and returns a callable service.
    ///
    /// # Errors
    ///
    /// Returns an error if the contract or any of its methods is malformed.
    pub fn create(&self, contract: &ServiceContract) -> Result<Service, ContractError> {
        ensure!(!contract.name().is_empty(), EmptyContractNameSnafu);

        let name: Arc<str> = Arc::from(contract.name());
        let id = self.cache.register();
        let mut methods = HashMap::with_capacity(contract.methods().len());
        for descriptor in contract.methods() {
            ensure!(
                !methods.contains_key(descriptor.name()),
                DuplicateMethodSnafu {
                    contract: contract.name(),
                    method: descriptor.name(),
                }
            );
            self.cache.get_or_compile(id, &name, descriptor)?;
            methods.insert(descriptor.name().to_owned(), descriptor.clone());
        }

        tracing::debug!(contract = %name, methods = methods.len(), "Created service");
        Ok(Service {
            flare: Arc::new(self.clone()),
            id,
            contract: name,
            methods: Arc::new(methods),
        })
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn dispatch(&self, task: BoxFuture<'static, ()>) -> Result<(), DispatchError> {
        self.dispatcher.dispatch(task)
    }

    /// Builds the request, runs the interceptor chains and the transport,
    /// and resolves the response.
    pub(crate) async fn exchange(
        &self,
        contract: &Arc<str>,
        template: &RequestTemplate,
        args: &[Value],
    ) -> Result<InternalResponse, CallError> {
        let cx = BindContext {
            strings: &*self.string_converter,
            fields: &*self.form_field_converter,
            codec: &*self.codec,
        };
        let globals = Globals {
            base_url: &self.base_url,
            headers: &self.headers,
            dynamic_headers: &self.dynamic_headers,
        };
        let request = request::build_request(template, contract, args, &cx, &globals)
            .await
            .context(call::ParameterSnafu)?;

        tracing::debug!(
            contract = %contract,
            method = %template.method_name,
            verb = %request.method(),
            uri = %request.uri(),
            "Dispatching call"
        );

        let chain = self.chain(template);
        let exchange = Next::new(&chain, &*self.http_client)
            .run(request)
            .await
            .context(call::TransportSnafu)?;

        let response = response::resolve(
            exchange,
            template.returns,
            template.download.as_ref(),
            &*self.codec,
        )
        .await
        .context(call::ResolveSnafu)?;
        tracing::debug!(
            contract = %contract,
            method = %template.method_name,
            status = response.status().as_u16(),
            "Resolved response"
        );
        Ok(response)
    }

    /// Method application, global application, logging, method network,
    /// then global network interceptors.
    fn chain(&self, template: &RequestTemplate) -> Vec<Arc<dyn Interceptor>> {
        let mut chain = Vec::with_capacity(
            template.interceptors.len()
                + self.interceptors.len()
                + usize::from(self.log_enabled)
                + template.net_interceptors.len()
                + self.net_interceptors.len(),
        );
        chain.extend(template.interceptors.iter().cloned());
        chain.extend(self.interceptors.iter().cloned());
        if self.log_enabled {
            chain.push(Arc::new(LoggingInterceptor));
        }
        chain.extend(template.net_interceptors.iter().cloned());
        chain.extend(self.net_interceptors.iter().cloned());
        chain
    }
}

/// Errors from invoking a service method.
#[derive(Debug, Snafu)]
pub enum InvokeError {
    /// The contract has no method with this name.
    #[snafu(display("Contract `{contract}` has no method `{method}`"))]
    UnknownMethod {
        /// The contract name.
        contract: String,
        /// The requested method name.
        method: String,
    },
    /// The method could not be compiled.
    #[snafu(display("Invalid method"))]
    Contract {
        /// The underlying error.
        source: ContractError,
    },
    /// The call failed.
    #[snafu(display("Call failed"))]
    Call {
        /// The underlying error.
        source: CallError,
    },
}

impl crate::Error for InvokeError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Call { source } => source.is_retryable(),
            Self::UnknownMethod { .. } | Self::Contract { .. } => false,
        }
    }
}

/// A callable implementation of one service contract.
///
/// Each method invocation resolves the method's compiled template, binds
/// the arguments, and runs the call. Clones share everything.
#[derive(Clone)]
pub struct Service {
    flare: Arc<Flare>,
    id: ServiceId,
    contract: Arc<str>,
    methods: Arc<HashMap<String, MethodDescriptor>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("Service")
            .field("contract", &self.contract)
            .field("methods", &methods)
            .finish_non_exhaustive()
    }
}

impl Service {
    /// The contract name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.contract
    }

    /// Returns `true` if the contract declares `method`.
    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Creates an unexecuted call of `method` with `args`, in parameter
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if the method is unknown or cannot be compiled.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Call, InvokeError> {
        let descriptor = self.methods.get(method).context(UnknownMethodSnafu {
            contract: &*self.contract,
            method,
        })?;
        let template = self
            .flare
            .cache
            .get_or_compile(self.id, &self.contract, descriptor)
            .context(ContractSnafu)?;
        Ok(Call::new(
            self.flare.clone(),
            self.contract.clone(),
            template,
            args,
        ))
    }

    /// Invokes `method` and adapts the outcome to its declared return.
    ///
    /// For methods not declared as wrapped, a non-2xx status is returned
    /// as [`CallError::Http`].
    ///
    /// # Errors
    ///
    /// Returns an error if the call cannot be created or fails.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Reply, InvokeError> {
        let call = self.call(method, args)?;
        call::adapt(call).await.context(CallSnafu)
    }

    /// Invokes `method` and converts the reply into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the reply does not convert.
    pub async fn invoke_as<T: FromReply>(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> Result<T, InvokeError> {
        let reply = self.invoke(method, args).await?;
        T::from_reply(reply).context(CallSnafu)
    }
}
