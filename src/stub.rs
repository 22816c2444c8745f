//! Canned responses in place of the real executor.
//!
//! With [`StubStrategy::Enabled`] every attempt first asks the configured
//! [`StubProvider`]; it may answer with a synthetic response, a synthetic
//! transport error, or [`StubResponse::Continue`] to fall through to the
//! executor. An optional delay is slept on the runtime timer before the
//! provider is consulted.

use crate::api::Api;
use crate::executor::{ExecutorResponse, TransportError};
use crate::request::TransportRequest;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// What a stub provider answers for one attempt.
#[derive(Debug, Clone)]
pub enum StubResponse {
    /// A synthetic network response.
    Network {
        /// The status to report.
        status: StatusCode,
        /// The body to report.
        body: Bytes,
        /// The headers to report.
        headers: HeaderMap,
    },
    /// A synthetic transport failure.
    Error(TransportError),
    /// Use the real executor.
    Continue,
}

impl StubResponse {
    /// A synthetic response with no headers.
    pub fn network(status: StatusCode, body: impl Into<Bytes>) -> Self {
        StubResponse::Network {
            status,
            body: body.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Converts a synthetic answer into the executor's raw form.
    ///
    /// Returns `None` for [`StubResponse::Continue`].
    pub(crate) fn into_executor_response(self) -> Option<ExecutorResponse> {
        match self {
            StubResponse::Network {
                status,
                body,
                headers,
            } => Some(ExecutorResponse::completed(status, body).with_headers(headers)),
            StubResponse::Error(error) => Some(ExecutorResponse::failed(error)),
            StubResponse::Continue => None,
        }
    }
}

/// Produces stub responses. Implemented for any matching closure.
pub trait StubProvider: Send + Sync {
    /// Answers for one attempt of `request`.
    fn respond(&self, request: &TransportRequest, api: &dyn Api) -> StubResponse;
}

impl<F> StubProvider for F
where
    F: Fn(&TransportRequest, &dyn Api) -> StubResponse + Send + Sync,
{
    fn respond(&self, request: &TransportRequest, api: &dyn Api) -> StubResponse {
        self(request, api)
    }
}

/// Whether and how a requester substitutes stub responses.
///
/// # Examples
///
/// ```
/// use requester::{Api, StubResponse, StubStrategy, TransportRequest};
/// use http::StatusCode;
/// use std::time::Duration;
///
/// let strategy = StubStrategy::delayed(Duration::from_millis(50), |_req: &TransportRequest, _api: &dyn Api| {
///     StubResponse::network(StatusCode::OK, r#"{"ok":true}"#)
/// });
/// assert!(strategy.is_enabled());
/// ```
#[derive(Clone, Default)]
pub enum StubStrategy {
    /// Always use the executor (or placeholder data).
    #[default]
    Disabled,
    /// Consult `provider` after `delay` on every attempt.
    Enabled {
        /// Time to wait before answering.
        delay: Duration,
        /// The response source.
        provider: Arc<dyn StubProvider>,
    },
}

impl StubStrategy {
    /// Stubs every attempt immediately.
    pub fn immediate(provider: impl StubProvider + 'static) -> Self {
        Self::delayed(Duration::ZERO, provider)
    }

    /// Stubs every attempt after `delay`.
    pub fn delayed(delay: Duration, provider: impl StubProvider + 'static) -> Self {
        StubStrategy::Enabled {
            delay,
            provider: Arc::new(provider),
        }
    }

    /// Returns `true` unless stubbing is disabled.
    pub fn is_enabled(&self) -> bool {
        matches!(self, StubStrategy::Enabled { .. })
    }
}

impl fmt::Debug for StubStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubStrategy::Disabled => f.write_str("Disabled"),
            StubStrategy::Enabled { delay, .. } => {
                f.debug_struct("Enabled").field("delay", delay).finish_non_exhaustive()
            }
        }
    }
}
