//! Proceed-or-retry decisions after each attempt.
//!
//! The pipeline hands every plugin-processed result to the requester's
//! [`CompletionStrategy`] together with the 1-indexed attempt number. The
//! strategy owns the retry budget; the pipeline simply re-executes the same
//! request when told to.

use crate::api::Api;
use crate::classify::DataResult;
use crate::rate_limit::RateLimitConfig;
use crate::retry::{RetryOnRetryable, RetryPredicate, RetryStrategy};
use async_trait::async_trait;
use std::time::Duration;

/// What the pipeline does with an attempt's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand the result to decoding (or to the caller, if it is a failure).
    Proceed,
    /// Execute the same request again immediately.
    Retry,
    /// Execute the same request again after the delay.
    RetryAfter(Duration),
}

/// Decides whether an attempt's result is final.
///
/// # Examples
///
/// ```
/// use requester::{Api, CompletionStrategy, DataResult, Decision};
///
/// /// Retries a single 503.
/// struct RetryOnce503;
///
/// #[async_trait::async_trait]
/// impl CompletionStrategy for RetryOnce503 {
///     async fn decide(&self, result: &DataResult, _api: &dyn Api, attempt: usize) -> Decision {
///         match result {
///             Ok(response) if response.status.as_u16() == 503 && attempt == 1 => Decision::Retry,
///             _ => Decision::Proceed,
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait CompletionStrategy: Send + Sync + 'static {
    /// Decides what to do with the result of attempt number `attempt`.
    async fn decide(&self, result: &DataResult, api: &dyn Api, attempt: usize) -> Decision;
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysProceed;

#[async_trait]
impl CompletionStrategy for AlwaysProceed {
    async fn decide(&self, _result: &DataResult, _api: &dyn Api, _attempt: usize) -> Decision {
        Decision::Proceed
    }
}

/// Retries results matching a [`RetryPredicate`] on a [`RetryStrategy`] schedule.
///
/// An active rate limit on the retried response overrides the scheduled
/// delay when the [`RateLimitConfig`] is enabled, but never extends the retry
/// budget.
///
/// # Examples
///
/// ```
/// use requester::{RetryPolicy, RetryStrategy};
/// use requester::retry::RetryOnStatus;
/// use http::StatusCode;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(RetryStrategy::Linear {
///     delay: Duration::from_millis(200),
///     max_retries: 2,
/// })
/// .with_predicate(RetryOnStatus::new([StatusCode::SERVICE_UNAVAILABLE]));
/// ```
pub struct RetryPolicy {
    strategy: RetryStrategy,
    predicate: Box<dyn RetryPredicate>,
    rate_limit: RateLimitConfig,
}

impl RetryPolicy {
    /// Creates a policy that retries retryable results on `strategy`.
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            predicate: Box::new(RetryOnRetryable),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Replaces the retry predicate.
    pub fn with_predicate(mut self, predicate: impl RetryPredicate + 'static) -> Self {
        self.predicate = Box::new(predicate);
        self
    }

    /// Replaces the rate limit configuration.
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }
}

#[async_trait]
impl CompletionStrategy for RetryPolicy {
    async fn decide(&self, result: &DataResult, api: &dyn Api, attempt: usize) -> Decision {
        if !self.predicate.should_retry(result, attempt) {
            return Decision::Proceed;
        }

        let Some(scheduled) = self.strategy.delay_after(attempt) else {
            tracing::warn!(
                api = %api.name(),
                attempts = attempt,
                "Retries exhausted"
            );
            return Decision::Proceed;
        };

        let delay = match self.rate_limit.delay_for(result) {
            Some(delay) => {
                tracing::info!(
                    rate_limit_delay_ms = delay.as_millis(),
                    attempt = attempt,
                    max_wait_secs = self.rate_limit.max_wait.as_secs(),
                    "Rate limited - waiting before retry"
                );
                delay
            }
            None => {
                tracing::info!(
                    delay_ms = scheduled.as_millis(),
                    attempt = attempt,
                    "Retrying request after delay"
                );
                scheduled
            }
        };

        if delay.is_zero() {
            Decision::Retry
        } else {
            Decision::RetryAfter(delay)
        }
    }
}
