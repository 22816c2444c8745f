//! Rate limit hints carried by responses.
//!
//! When a [`RetryPolicy`](crate::completion::RetryPolicy) decides to retry, an
//! active rate limit on the failed attempt's response may dictate how long to
//! wait instead of the policy's own schedule.

use crate::classify::DataResult;
use crate::response::DataResponse;
use http::HeaderMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Reset timestamp headers, most common first.
const RESET_HEADERS: [&str; 2] = ["x-ratelimit-reset", "ratelimit-reset"];

/// Rate limit state reported by a response.
///
/// Read from `Retry-After` (delay-seconds or HTTP date), `X-RateLimit-Reset`
/// or `RateLimit-Reset` (Unix timestamps) and `X-RateLimit-Remaining`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// When the current window resets.
    pub reset_at: Option<SystemTime>,

    /// How long the server asked clients to wait.
    pub retry_after: Option<Duration>,

    /// Requests left in the current window.
    pub remaining: Option<u64>,
}

impl RateLimitInfo {
    /// Reads the rate limit headers of `response`.
    ///
    /// # Examples
    ///
    /// ```
    /// use requester::rate_limit::RateLimitInfo;
    /// use requester::{DataResponse, TransportRequest};
    /// use http::{HeaderMap, Method, StatusCode};
    /// use std::time::Duration;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    /// let request = TransportRequest::new(Method::GET, "https://a.example/".parse().unwrap());
    /// let response = DataResponse::new(
    ///     Default::default(),
    ///     request,
    ///     StatusCode::TOO_MANY_REQUESTS,
    ///     headers,
    /// );
    ///
    /// let info = RateLimitInfo::from_response(&response);
    /// assert_eq!(info.retry_after, Some(Duration::from_secs(60)));
    /// assert!(info.is_rate_limited());
    /// ```
    pub fn from_response(response: &DataResponse) -> Self {
        let headers = &response.headers;
        Self {
            reset_at: RESET_HEADERS
                .iter()
                .find_map(|name| header_u64(headers, name))
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
            retry_after: header_str(headers, "retry-after").and_then(parse_retry_after),
            remaining: header_u64(headers, "x-ratelimit-remaining"),
        }
    }

    /// Reads the rate limit headers of whatever response `result` carries.
    ///
    /// `None` for failures without a response.
    pub fn from_result(result: &DataResult) -> Option<Self> {
        let response = match result {
            Ok(response) => response,
            Err(e) => e.response()?,
        };
        Some(Self::from_response(response))
    }

    /// Returns `true` if the server asked for a pause or the window is spent.
    pub fn is_rate_limited(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }

    /// Time to wait as of `now`: `retry_after` if present, otherwise until `reset_at`.
    ///
    /// `None` when neither is known or the reset has already passed.
    pub fn wait(&self, now: SystemTime) -> Option<Duration> {
        self.retry_after
            .or_else(|| self.reset_at?.duration_since(now).ok())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name)?.trim().parse().ok()
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}

/// How a [`RetryPolicy`](crate::completion::RetryPolicy) honors rate limits.
///
/// # Examples
///
/// ```
/// use requester::rate_limit::RateLimitConfig;
/// use requester::{RetryPolicy, RetryStrategy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(RetryStrategy::linear(Duration::from_secs(1), 3))
///     .with_rate_limit(RateLimitConfig::default().with_max_wait(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Whether an active rate limit replaces the scheduled delay.
    pub enabled: bool,

    /// Upper bound on a rate limit wait. Defaults to 5 minutes.
    pub max_wait: Duration,

    /// Whether `Retry-After` is honored. Defaults to `true`.
    pub respect_retry_after: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait: Duration::from_secs(300),
            respect_retry_after: true,
        }
    }
}

impl RateLimitConfig {
    /// A configuration that always falls back to the retry schedule.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Caps every rate limit wait at `max_wait`.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Ignores `Retry-After`, leaving only the remaining/reset headers.
    pub fn ignore_retry_after(mut self) -> Self {
        self.respect_retry_after = false;
        self
    }

    /// Returns the wait an active rate limit on `result` asks for, capped by `max_wait`.
    ///
    /// `None` when disabled, when there is no response, or when the response
    /// reports no active limit (a reset timestamp alone is not a limit).
    pub fn delay_for(&self, result: &DataResult) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        let mut info = RateLimitInfo::from_result(result)?;
        if !self.respect_retry_after {
            info.retry_after = None;
        }
        if !info.is_rate_limited() {
            return None;
        }
        info.wait(SystemTime::now())
            .map(|wait| wait.min(self.max_wait))
    }
}
