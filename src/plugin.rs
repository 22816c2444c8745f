//! Request/response lifecycle plugins.
//!
//! A [`Plugin`] may observe or rewrite each request at four points:
//!
//! 1. [`mutate_request`](Plugin::mutate_request), folded over the chain before sending
//! 2. [`will_send`](Plugin::will_send), after all request mutations
//! 3. [`did_receive`](Plugin::did_receive), after classification
//! 4. [`mutate_result`](Plugin::mutate_result), folded over the chain before the
//!    completion strategy sees the result
//!
//! All hooks run again for every retried attempt.

use crate::api::Api;
use crate::classify::DataResult;
use crate::request::TransportRequest;
use crate::{Result, ServiceError};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;

/// An observer/mutator attached to every request a requester issues.
///
/// Every hook defaults to a no-op. Plugins are shared across concurrent
/// requests, so any state they keep must be synchronized.
///
/// # Examples
///
/// ```
/// use requester::{Api, Plugin, TransportRequest};
/// use http::HeaderValue;
///
/// struct BearerAuth(String);
///
/// impl Plugin for BearerAuth {
///     fn mutate_request(&self, mut request: TransportRequest, _api: &dyn Api) -> TransportRequest {
///         if let Ok(value) = HeaderValue::try_from(format!("Bearer {}", self.0)) {
///             request.headers.insert(http::header::AUTHORIZATION, value);
///         }
///         request
///     }
/// }
/// ```
pub trait Plugin: Send + Sync {
    /// Rewrites the request before it is sent.
    fn mutate_request(&self, request: TransportRequest, _api: &dyn Api) -> TransportRequest {
        request
    }

    /// Observes the final request just before it is sent.
    fn will_send(&self, _request: &TransportRequest, _api: &dyn Api) {}

    /// Observes the classified result of an attempt.
    fn did_receive(&self, _result: &DataResult, _api: &dyn Api) {}

    /// Rewrites the classified result.
    fn mutate_result(&self, result: DataResult, _api: &dyn Api) -> DataResult {
        result
    }
}

/// The ordered plugin list of a requester.
#[derive(Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    /// Creates a chain from plugins in invocation order.
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    /// Appends a plugin to the end of the chain.
    pub fn push(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Returns the number of plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if the chain has no plugins.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Runs request mutation then send notification, in chain order.
    pub fn prepare(&self, request: TransportRequest, api: &dyn Api) -> TransportRequest {
        let request = self
            .plugins
            .iter()
            .fold(request, |request, plugin| plugin.mutate_request(request, api));
        for plugin in &self.plugins {
            plugin.will_send(&request, api);
        }
        request
    }

    /// Runs receive notification then result mutation, in chain order.
    pub fn process(&self, result: DataResult, api: &dyn Api) -> DataResult {
        for plugin in &self.plugins {
            plugin.did_receive(&result, api);
        }
        self.plugins
            .iter()
            .fold(result, |result, plugin| plugin.mutate_result(result, api))
    }
}

/// Inserts a fixed set of headers into every request.
///
/// Headers already present on the request are overwritten.
#[derive(Debug, Clone, Default)]
pub struct HeaderPlugin {
    headers: HeaderMap,
}

impl HeaderPlugin {
    /// Creates an empty plugin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| ServiceError::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| ServiceError::Configuration(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}

impl Plugin for HeaderPlugin {
    fn mutate_request(&self, mut request: TransportRequest, _api: &dyn Api) -> TransportRequest {
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        request
    }
}

/// Logs every attempt with `tracing`.
///
/// Client errors are logged at `error`, server errors and transport failures
/// at `warn`, everything else at `info`. Holds no state, so overlapping
/// requests cannot garble each other's records; per-attempt latency is logged
/// by the requester itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPlugin;

impl LoggingPlugin {
    /// Creates a logging plugin.
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for LoggingPlugin {
    fn will_send(&self, request: &TransportRequest, api: &dyn Api) {
        tracing::info!(
            api = %api.name(),
            method = %request.method,
            url = %request.url,
            "Sending request"
        );
    }

    fn did_receive(&self, result: &DataResult, api: &dyn Api) {
        match result {
            Ok(response) if response.status.is_client_error() => {
                tracing::error!(
                    api = %api.name(),
                    status = response.status.as_u16(),
                    url = %response.request.url,
                    response = %response.text(),
                    "Client error (4xx)"
                );
            }
            Ok(response) if response.status.is_server_error() => {
                tracing::warn!(
                    api = %api.name(),
                    status = response.status.as_u16(),
                    url = %response.request.url,
                    response = %response.text(),
                    "Server error (5xx)"
                );
            }
            Ok(response) => {
                tracing::info!(
                    api = %api.name(),
                    status = response.status.as_u16(),
                    url = %response.request.url,
                    "Received HTTP response"
                );
            }
            Err(e) => {
                tracing::warn!(
                    api = %api.name(),
                    error = %e,
                    "Request failed"
                );
            }
        }
    }
}
