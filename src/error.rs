//! Error types for the request pipeline.
//!
//! Every failure a caller can observe is a value of [`ServiceError`]. Variants
//! that originate after the transport produced a response keep that response,
//! so callers and plugins can inspect the status, headers and raw bytes
//! without issuing the request again.

use crate::executor::TransportError;
use crate::response::DataResponse;
use http::StatusCode;
use serde::de::DeserializeOwned;

/// The main error type for pipeline requests.
///
/// # Examples
///
/// ```no_run
/// use requester::{Requester, ServiceError};
/// # use requester::{Api, Endpoint};
/// # struct Health;
/// # impl Api for Health {
/// #     fn endpoint(&self) -> Endpoint { Endpoint::path("/health") }
/// # }
///
/// # async fn example() -> Result<(), ServiceError> {
/// let requester = Requester::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match requester.send::<_, serde_json::Value>(Health).await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(ServiceError::Parsing { message, response }) => {
///         eprintln!("Undecodable body ({}): {}", response.status, message);
///     }
///     Err(ServiceError::Api { body, .. }) => eprintln!("Server said: {}", body),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum ServiceError {
    /// The API definition could not be resolved into a concrete target.
    ///
    /// Raised before any network activity, e.g. for an unknown discovery
    /// relation or a missing template variable. Never retried.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The transport request could not be built from the resolved target.
    ///
    /// Typically a parameter value the chosen encoding cannot represent.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The executor (or a stub) reported a transport-level failure.
    ///
    /// `response` is present when the transport also reported a status.
    #[error("Transport error: {error}")]
    Transport {
        /// The underlying transport failure
        error: TransportError,
        /// The partial response, when a status was received
        response: Option<Box<DataResponse>>,
    },

    /// The response body could not be decoded into the expected type.
    #[error("Failed to parse response (status {}): {message}", .response.status)]
    Parsing {
        /// The parser or deserializer error message
        message: String,
        /// The response that failed to parse
        response: Box<DataResponse>,
    },

    /// The response body decoded as an application-level error envelope.
    #[error("API error (status {}): {body}", .response.status)]
    Api {
        /// The decoded error envelope
        body: serde_json::Value,
        /// The response carrying the envelope
        response: Box<DataResponse>,
    },

    /// Invalid configuration was supplied to the builder.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ServiceError {
    /// Builds a transport failure with no response attached.
    pub fn transport(error: TransportError) -> Self {
        ServiceError::Transport {
            error,
            response: None,
        }
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Transport failures other than cancellation are retryable, as are
    /// parsing and API errors whose response carried a 5xx or 429 status.
    ///
    /// # Examples
    ///
    /// ```
    /// use requester::{ServiceError, TransportError};
    ///
    /// assert!(ServiceError::transport(TransportError::Timeout).is_retryable());
    /// assert!(!ServiceError::transport(TransportError::Cancelled).is_retryable());
    /// assert!(!ServiceError::Resolution("no such relation".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport { error, .. } => !matches!(error, TransportError::Cancelled),
            ServiceError::Parsing { response, .. } | ServiceError::Api { response, .. } => {
                response.status.is_server_error()
                    || response.status == StatusCode::TOO_MANY_REQUESTS
            }
            ServiceError::Resolution(_) => false,
            ServiceError::Encoding(_) => false,
            ServiceError::Configuration(_) => false,
            ServiceError::InvalidUrl(_) => false,
        }
    }

    /// Returns the response attached to this error, if any.
    pub fn response(&self) -> Option<&DataResponse> {
        match self {
            ServiceError::Transport { response, .. } => response.as_deref(),
            ServiceError::Parsing { response, .. } => Some(response),
            ServiceError::Api { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has a response.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(|response| response.status)
    }

    /// Returns the raw response body as text if this error has a response.
    pub fn raw_body(&self) -> Option<String> {
        self.response().map(DataResponse::text)
    }

    /// Returns the transport failure, if this is a transport error.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            ServiceError::Transport { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Decodes the API error envelope into a caller-defined type.
    ///
    /// Returns `None` for other variants or when the envelope does not match `E`.
    pub fn api_error_as<E: DeserializeOwned>(&self) -> Option<E> {
        match self {
            ServiceError::Api { body, .. } => serde_json::from_value(body.clone()).ok(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for pipeline requests.
pub type Result<T> = std::result::Result<T, ServiceError>;
