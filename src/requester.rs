//! The request pipeline.
//!
//! [`Requester`] is the main entry point. Use [`RequesterBuilder`] to
//! configure the executor, plugins, stubbing, parsing and completion strategy.
//! Configuration is immutable once built and shared by every request.

use crate::api::Api;
use crate::cancel::CancelHandle;
use crate::classify::{classify, DataResult};
use crate::completion::{AlwaysProceed, CompletionStrategy, Decision};
use crate::executor::{Executor, ExecutorResponse, ReqwestExecutor, TransportError};
use crate::parser::{decode, Parser, ParserFactory, SharedParser};
use crate::plugin::{Plugin, PluginChain};
use crate::request::{build_request, TransportRequest};
use crate::response::ParsedResponse;
use crate::stub::StubStrategy;
use crate::target::{ServiceDiscovery, TargetResolver};
use crate::{Result, ServiceError};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinError};
use url::Url;

/// Executes [`Api`] requests through the plugin chain, stubbing, the
/// completion strategy and typed decoding.
///
/// The requester is cheap to clone and meant to be reused.
///
/// # Examples
///
/// ```no_run
/// use requester::{Api, Endpoint, ParameterEncoding, Parameters, Requester, RetryPolicy, RetryStrategy};
/// use http::Method;
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// struct CreateUser {
///     name: String,
/// }
///
/// impl Api for CreateUser {
///     fn endpoint(&self) -> Endpoint {
///         Endpoint::path("/users")
///     }
///
///     fn method(&self) -> Method {
///         Method::POST
///     }
///
///     fn parameters(&self) -> Parameters {
///         let mut params = Parameters::new();
///         params.insert("name".into(), self.name.clone().into());
///         params
///     }
///
///     fn encoding(&self) -> ParameterEncoding {
///         ParameterEncoding::Json
///     }
/// }
///
/// # async fn example() -> Result<(), requester::ServiceError> {
/// let requester = Requester::builder()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .completion_strategy(RetryPolicy::new(RetryStrategy::ExponentialBackoff {
///         initial_delay: Duration::from_millis(100),
///         max_delay: Duration::from_secs(10),
///         max_retries: 3,
///         jitter: true,
///     }))
///     .build()?;
///
/// let created = requester
///     .send::<_, User>(CreateUser { name: "Alice".to_string() })
///     .await?;
/// println!("Created user with ID: {}", created.data.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Requester {
    inner: Arc<RequesterInner>,
}

struct RequesterInner {
    resolver: TargetResolver,
    executor: Arc<dyn Executor>,
    plugins: PluginChain,
    stub_strategy: StubStrategy,
    parser_factory: Arc<dyn ParserFactory>,
    completion: Arc<dyn CompletionStrategy>,
}

/// The final classified result of a request and how many attempts it took.
struct Outcome {
    result: DataResult,
    attempts: usize,
}

/// Aborts the attempt task if the pipeline future is dropped mid-attempt.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Requester {
    /// Creates a new `RequesterBuilder`.
    pub fn builder() -> RequesterBuilder {
        RequesterBuilder::new()
    }

    /// Executes `api` and decodes the payload into `T`.
    ///
    /// Dropping the future cancels the request.
    pub async fn send<A, T>(&self, api: A) -> Result<ParsedResponse<T>>
    where
        A: Api,
        T: DeserializeOwned + Send + 'static,
    {
        self.execute::<T>(Arc::new(api), &CancelHandle::new())
            .await
            .unwrap_or_else(|| Err(ServiceError::transport(TransportError::Cancelled)))
    }

    /// Executes `api` and returns the untyped result.
    ///
    /// Dropping the future cancels the request.
    pub async fn send_raw<A: Api>(&self, api: A) -> DataResult {
        match self.run(Arc::new(api), &CancelHandle::new()).await {
            Some(outcome) => outcome.result,
            None => Err(ServiceError::transport(TransportError::Cancelled)),
        }
    }

    /// Starts `api` in the background and calls `completion` with the decoded result.
    ///
    /// `completion` runs exactly once, unless the returned handle is cancelled
    /// first, in which case it never runs. Must be called within a Tokio runtime.
    pub fn request<A, T, F>(&self, api: A, completion: F) -> CancelHandle
    where
        A: Api,
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<ParsedResponse<T>>) + Send + 'static,
    {
        let handle = CancelHandle::new();
        let requester = self.clone();
        let task_handle = handle.clone();

        tokio::spawn(async move {
            let Some(result) = requester.execute::<T>(Arc::new(api), &task_handle).await else {
                return;
            };
            if task_handle.is_cancelled() {
                return;
            }
            completion(result);
        });

        handle
    }

    /// Starts `api` in the background and calls `completion` with the untyped result.
    ///
    /// Same delivery guarantees as [`request`](Self::request).
    pub fn request_raw<A, F>(&self, api: A, completion: F) -> CancelHandle
    where
        A: Api,
        F: FnOnce(DataResult) + Send + 'static,
    {
        let handle = CancelHandle::new();
        let requester = self.clone();
        let task_handle = handle.clone();

        tokio::spawn(async move {
            let Some(outcome) = requester.run(Arc::new(api), &task_handle).await else {
                return;
            };
            if task_handle.is_cancelled() {
                return;
            }
            completion(outcome.result);
        });

        handle
    }

    /// Runs the pipeline and decodes a successful result. `None` if cancelled.
    async fn execute<T>(
        &self,
        api: Arc<dyn Api>,
        handle: &CancelHandle,
    ) -> Option<Result<ParsedResponse<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let start_time = Instant::now();
        let outcome = self.run(api.clone(), handle).await?;

        let response = match outcome.result {
            Ok(response) => response,
            Err(e) => return Some(Err(e)),
        };

        let parser: Arc<dyn Parser> = self.inner.parser_factory.make(api.as_ref());
        let decoded = tokio::task::spawn_blocking(move || {
            decode::<T>(&response, parser.as_ref()).map(|data| (data, response))
        })
        .await;

        match decoded {
            Ok(Ok((data, response))) => Some(Ok(ParsedResponse::new(
                data,
                response,
                start_time.elapsed(),
                outcome.attempts,
            ))),
            Ok(Err(e)) => Some(Err(e)),
            Err(e) => {
                tracing::error!(api = %api.name(), error = %e, "Decoding task did not complete");
                unfinished_decode(e, handle)
            }
        }
    }

    /// Resolves, builds and executes `api` until the completion strategy
    /// accepts a result. `None` if cancelled.
    async fn run(&self, api: Arc<dyn Api>, handle: &CancelHandle) -> Option<Outcome> {
        let request = match self
            .inner
            .resolver
            .resolve(api.as_ref())
            .and_then(|target| build_request(&target))
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(api = %api.name(), error = %e, "Request could not be built");
                return Some(Outcome {
                    result: Err(e),
                    attempts: 0,
                });
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            let prepared = self.inner.plugins.prepare(request.clone(), api.as_ref());

            tracing::debug!(
                api = %api.name(),
                method = %prepared.method,
                url = %prepared.url,
                attempt = attempt,
                "Executing request attempt"
            );

            let attempt_start = Instant::now();
            let raw = self.perform(prepared.clone(), api.clone(), handle).await?;
            let result = classify(raw, &prepared);
            tracing::debug!(
                api = %api.name(),
                attempt = attempt,
                latency_ms = attempt_start.elapsed().as_millis() as u64,
                success = result.is_ok(),
                "Attempt completed"
            );
            let result = self.inner.plugins.process(result, api.as_ref());

            let delay = match self
                .inner
                .completion
                .decide(&result, api.as_ref(), attempt)
                .await
            {
                Decision::Proceed => {
                    if let Err(e) = &result {
                        tracing::warn!(
                            api = %api.name(),
                            error = %e,
                            attempt = attempt,
                            "Request failed"
                        );
                    }
                    return Some(Outcome {
                        result,
                        attempts: attempt,
                    });
                }
                Decision::Retry => None,
                Decision::RetryAfter(delay) => Some(delay),
            };

            if handle.is_cancelled() {
                return None;
            }
            if let Some(delay) = delay {
                abortable(handle, tokio::time::sleep(delay)).await?;
            }
        }
    }

    /// Produces the raw outcome of one attempt: placeholder, stub or executor.
    async fn perform(
        &self,
        request: TransportRequest,
        api: Arc<dyn Api>,
        handle: &CancelHandle,
    ) -> Option<ExecutorResponse> {
        let executor = self.inner.executor.clone();

        match &self.inner.stub_strategy {
            StubStrategy::Disabled => {
                if let Some(data) = api.placeholder_data() {
                    tracing::debug!(api = %api.name(), "Serving placeholder data");
                    return Some(ExecutorResponse::completed(StatusCode::OK, data));
                }
                abortable(handle, async move { executor.execute(request).await }).await
            }
            StubStrategy::Enabled { delay, provider } => {
                let delay = *delay;
                let provider = provider.clone();
                abortable(handle, async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match provider.respond(&request, api.as_ref()).into_executor_response() {
                        Some(raw) => {
                            tracing::debug!(api = %api.name(), "Serving stub response");
                            raw
                        }
                        None => executor.execute(request).await,
                    }
                })
                .await
            }
        }
    }
}

/// Runs `future` as its own task with `handle` pointed at it.
///
/// Returns `None` if the task was aborted through the handle.
async fn abortable<F>(handle: &CancelHandle, future: F) -> Option<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let task = tokio::spawn(future);
    let _guard = AbortOnDrop(task.abort_handle());

    if !handle.repoint(task.abort_handle()) {
        return None;
    }

    let output = task.await;
    handle.clear();

    match output {
        Ok(output) => Some(output),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => None,
    }
}

/// Settles a decoding task that did not return.
///
/// Panics are re-raised. `None` only if the request was cancelled; otherwise
/// the caller still gets a result.
fn unfinished_decode<T>(error: JoinError, handle: &CancelHandle) -> Option<Result<T>> {
    if error.is_panic() {
        std::panic::resume_unwind(error.into_panic());
    }
    if handle.is_cancelled() {
        return None;
    }
    Some(Err(ServiceError::transport(TransportError::Other(format!(
        "decoding task did not complete: {}",
        error
    )))))
}

/// Builder for configuring and creating a [`Requester`].
///
/// # Examples
///
/// ```no_run
/// use requester::{HeaderPlugin, LoggingPlugin, RequesterBuilder, StaticDiscovery};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), requester::ServiceError> {
/// let requester = RequesterBuilder::new()
///     .base_url("https://api.example.com")?
///     .discovery(StaticDiscovery::new().with_relation("user", "https://users.example.com/{id}"))
///     .timeout(Duration::from_secs(30))
///     .default_header("User-Agent", "my-app/1.0")?
///     .plugin(HeaderPlugin::new().with_header("x-api-key", "secret")?)
///     .plugin(LoggingPlugin::new())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RequesterBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    executor: Option<Arc<dyn Executor>>,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    plugins: Vec<Arc<dyn Plugin>>,
    stub_strategy: StubStrategy,
    parser_factory: Option<Arc<dyn ParserFactory>>,
    completion: Option<Arc<dyn CompletionStrategy>>,
}

impl RequesterBuilder {
    /// Creates a new `RequesterBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            executor: None,
            discovery: None,
            plugins: Vec::new(),
            stub_strategy: StubStrategy::Disabled,
            parser_factory: None,
            completion: None,
        }
    }

    /// Sets the base URL that path endpoints are joined onto.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| ServiceError::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| ServiceError::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the request timeout of the default executor.
    ///
    /// Ignored when a custom executor is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the default `reqwest` executor.
    pub fn executor(mut self, executor: impl Executor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Sets the service discovery used for relation endpoints.
    pub fn discovery(mut self, discovery: impl ServiceDiscovery + 'static) -> Self {
        self.discovery = Some(Arc::new(discovery));
        self
    }

    /// Appends a plugin. Plugins run in the order they are added.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Sets the stub strategy.
    pub fn stub_strategy(mut self, strategy: StubStrategy) -> Self {
        self.stub_strategy = strategy;
        self
    }

    /// Uses `parser` for every API.
    pub fn parser(mut self, parser: impl Parser + 'static) -> Self {
        self.parser_factory = Some(Arc::new(SharedParser(Arc::new(parser))));
        self
    }

    /// Chooses the parser per API.
    ///
    /// By default every API is parsed with [`JsonParser`](crate::JsonParser).
    pub fn parser_factory(mut self, factory: impl ParserFactory + 'static) -> Self {
        self.parser_factory = Some(Arc::new(factory));
        self
    }

    /// Sets the completion strategy.
    ///
    /// By default every result is accepted as is.
    pub fn completion_strategy(mut self, strategy: impl CompletionStrategy) -> Self {
        self.completion = Some(Arc::new(strategy));
        self
    }

    /// Builds the configured `Requester`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default HTTP client cannot be created.
    pub fn build(self) -> Result<Requester> {
        let executor = match self.executor {
            Some(executor) => executor,
            None => {
                let http_client = reqwest::Client::builder().build().map_err(|e| {
                    ServiceError::Configuration(format!("Failed to build HTTP client: {}", e))
                })?;
                let mut executor = ReqwestExecutor::new(http_client);
                if let Some(timeout) = self.timeout {
                    executor = executor.with_timeout(timeout);
                }
                Arc::new(executor)
            }
        };

        Ok(Requester {
            inner: Arc::new(RequesterInner {
                resolver: TargetResolver::new(self.base_url, self.discovery, self.default_headers),
                executor,
                plugins: PluginChain::new(self.plugins),
                stub_strategy: self.stub_strategy,
                parser_factory: self
                    .parser_factory
                    .unwrap_or_else(|| Arc::new(SharedParser::default())),
                completion: self.completion.unwrap_or_else(|| Arc::new(AlwaysProceed)),
            }),
        })
    }
}

impl Default for RequesterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
