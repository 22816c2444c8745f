//! The transport boundary.
//!
//! An [`Executor`] performs one request and reports the raw outcome as three
//! independent signals: optional body, optional status and optional transport
//! error. Reconciling those signals is the classifier's job, not the
//! executor's. Cancellation is handled by the pipeline, which drives each
//! execution in its own abortable task.

use crate::request::TransportRequest;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A transport-level failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request was cancelled before it completed.
    #[error("request was cancelled")]
    Cancelled,

    /// The transport reported neither a status nor an error.
    #[error("unknown transport error")]
    Unknown,

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::Connection(error.to_string())
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

/// The raw outcome of one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutorResponse {
    /// The response body, if any was read.
    pub body: Option<Bytes>,
    /// The HTTP status, if a response was received.
    pub status: Option<StatusCode>,
    /// The response headers. Empty when no response was received.
    pub headers: HeaderMap,
    /// The transport failure, if any.
    pub error: Option<TransportError>,
}

impl ExecutorResponse {
    /// A response with a status and body and no error.
    pub fn completed(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            body: Some(body.into()),
            status: Some(status),
            headers: HeaderMap::new(),
            error: None,
        }
    }

    /// A failure with no response.
    pub fn failed(error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Attaches response headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Performs transport requests.
///
/// Implementations must be safe to call concurrently. The future may be
/// dropped at any await point when the caller cancels.
///
/// # Examples
///
/// ```
/// use requester::{Executor, ExecutorResponse, TransportRequest};
/// use http::StatusCode;
///
/// struct AlwaysOk;
///
/// #[async_trait::async_trait]
/// impl Executor for AlwaysOk {
///     async fn execute(&self, _request: TransportRequest) -> ExecutorResponse {
///         ExecutorResponse::completed(StatusCode::OK, "{}")
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Executes `request` and reports the raw outcome.
    async fn execute(&self, request: TransportRequest) -> ExecutorResponse;
}

/// An [`Executor`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl ReqwestExecutor {
    /// Wraps an existing `reqwest::Client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Sets a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for ReqwestExecutor {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Executor for ReqwestExecutor {
    async fn execute(&self, request: TransportRequest) -> ExecutorResponse {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            "Executing HTTP request"
        );

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return ExecutorResponse {
                    body: None,
                    status: e.status(),
                    headers: HeaderMap::new(),
                    error: Some(e.into()),
                };
            }
        };

        let status = response.status();
        let headers = response.headers().clone();

        match response.bytes().await {
            Ok(body) => ExecutorResponse::completed(status, body).with_headers(headers),
            Err(e) => ExecutorResponse {
                body: None,
                status: Some(status),
                headers,
                error: Some(e.into()),
            },
        }
    }
}
