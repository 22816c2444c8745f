//! Response types produced by the pipeline.
//!
//! [`DataResponse`] is the untyped transport-level result of one attempt;
//! [`ParsedResponse`] wraps the decoded payload together with the response it
//! came from, the total latency and the number of attempts made.

use crate::request::TransportRequest;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// Raw bytes, status and headers of a response plus the request that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DataResponse {
    /// The raw response body. Empty when the transport delivered none.
    pub body: Bytes,

    /// The request that was sent, after plugin mutation.
    pub request: TransportRequest,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,
}

impl DataResponse {
    /// Creates a new `DataResponse`.
    pub fn new(body: Bytes, request: TransportRequest, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            body,
            request,
            status,
            headers,
        }
    }

    /// Returns the body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns a reference to a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A decoded payload together with the response it was decoded from.
///
/// # Type Parameters
///
/// * `T` - The type of the decoded response data
///
/// # Examples
///
/// ```no_run
/// use requester::{Api, Endpoint, Requester};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// struct GetUser(u64);
///
/// impl Api for GetUser {
///     fn endpoint(&self) -> Endpoint {
///         Endpoint::path(format!("/users/{}", self.0))
///     }
/// }
///
/// # async fn example() -> Result<(), requester::ServiceError> {
/// let requester = Requester::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = requester.send::<_, User>(GetUser(123)).await?;
///
/// println!("User: {}", response.data.name);
/// println!("Request took {:?}", response.latency);
/// println!("Status: {}", response.response.status);
/// println!("Attempts: {}", response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ParsedResponse<T> {
    /// The decoded response data.
    pub data: T,

    /// The response the data was decoded from.
    pub response: DataResponse,

    /// The total latency of the request, including all retry attempts.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    ///
    /// `1` for requests that completed on the first try.
    pub attempts: usize,
}

impl<T> ParsedResponse<T> {
    /// Creates a new `ParsedResponse`.
    pub fn new(data: T, response: DataResponse, latency: Duration, attempts: usize) -> Self {
        Self {
            data,
            response,
            latency,
            attempts,
        }
    }

    /// Maps the response data to a different type, keeping the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use requester::{DataResponse, ParsedResponse, TransportRequest};
    /// # use http::{HeaderMap, Method, StatusCode};
    /// # use std::time::Duration;
    /// # let request = TransportRequest::new(Method::GET, "https://a.example/".parse().unwrap());
    /// # let raw = DataResponse::new("42".into(), request, StatusCode::OK, HeaderMap::new());
    /// let response = ParsedResponse::new(42, raw, Duration::from_millis(100), 1);
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> ParsedResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        ParsedResponse {
            data: f(self.data),
            response: self.response,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a reference to a response header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.header(name)
    }
}

impl<T> AsRef<T> for ParsedResponse<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for ParsedResponse<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
