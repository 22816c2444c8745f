//! Retry schedules and predicates used by [`RetryPolicy`](crate::completion::RetryPolicy).
//!
//! A [`RetryStrategy`] decides how long to wait before each retry and when to
//! give up; a [`RetryPredicate`] decides whether an attempt's result warrants a
//! retry at all.

use crate::classify::DataResult;
use crate::executor::TransportError;
use crate::ServiceError;
use http::StatusCode;
use rand::Rng;
use std::time::Duration;

/// The delay schedule and retry budget of a [`RetryPolicy`](crate::RetryPolicy).
///
/// # Examples
///
/// ```
/// use requester::RetryStrategy;
/// use std::time::Duration;
///
/// // 100ms, 200ms, 400ms, each scaled by a random 50-100% factor
/// let backoff = RetryStrategy::exponential(Duration::from_millis(100), Duration::from_secs(5), 3);
///
/// let schedule: Vec<_> = (1..).map_while(|attempt| backoff.delay_after(attempt)).collect();
/// assert_eq!(schedule.len(), 3);
/// assert!(schedule[2] <= Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, Default)]
pub enum RetryStrategy {
    /// Never retry.
    #[default]
    None,

    /// Double the delay after every failed attempt, up to `max_delay`.
    ExponentialBackoff {
        /// Delay after the first failed attempt.
        initial_delay: Duration,
        /// Ceiling for any single delay.
        max_delay: Duration,
        /// Retry budget.
        max_retries: usize,
        /// Scale each delay by a random factor in `[0.5, 1.0]`.
        jitter: bool,
    },

    /// Wait the same delay after every failed attempt.
    Linear {
        /// Delay between attempts.
        delay: Duration,
        /// Retry budget.
        max_retries: usize,
    },

    /// Delegate to a function of the failed attempt number.
    ///
    /// The function returns `None` to stop; it owns its own budget.
    Custom {
        /// Maps a 1-indexed failed attempt to the delay before the next one.
        delay_fn: fn(attempt: usize) -> Option<Duration>,
    },
}

impl RetryStrategy {
    /// Jittered exponential backoff.
    pub fn exponential(initial_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        RetryStrategy::ExponentialBackoff {
            initial_delay,
            max_delay,
            max_retries,
            jitter: true,
        }
    }

    /// Fixed delay between attempts.
    pub fn linear(delay: Duration, max_retries: usize) -> Self {
        RetryStrategy::Linear { delay, max_retries }
    }

    /// Returns the wait after failed attempt number `attempt` (1-indexed), or
    /// `None` once the retry budget is spent.
    pub fn delay_after(&self, attempt: usize) -> Option<Duration> {
        if self.max_retries().is_some_and(|budget| attempt > budget) {
            return None;
        }

        match self {
            RetryStrategy::None => None,
            RetryStrategy::ExponentialBackoff {
                initial_delay,
                max_delay,
                jitter,
                ..
            } => {
                let doublings = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                let factor = 2u32.checked_pow(doublings).unwrap_or(u32::MAX);
                let delay = initial_delay.saturating_mul(factor).min(*max_delay);
                Some(if *jitter { jittered(delay) } else { delay })
            }
            RetryStrategy::Linear { delay, .. } => Some(*delay),
            RetryStrategy::Custom { delay_fn } => delay_fn(attempt),
        }
    }

    /// The retry budget, or `None` when a custom function decides.
    pub fn max_retries(&self) -> Option<usize> {
        match self {
            RetryStrategy::None => Some(0),
            RetryStrategy::ExponentialBackoff { max_retries, .. }
            | RetryStrategy::Linear { max_retries, .. } => Some(*max_retries),
            RetryStrategy::Custom { .. } => None,
        }
    }
}

fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
}

/// Decides whether the result of an attempt should be retried.
///
/// Predicates see every classified result, including successful transports
/// with error statuses.
///
/// # Examples
///
/// ```
/// use requester::{DataResult, RetryPredicate};
///
/// struct RetryOnRateLimit;
///
/// impl RetryPredicate for RetryOnRateLimit {
///     fn should_retry(&self, result: &DataResult, _attempt: usize) -> bool {
///         matches!(result, Ok(response) if response.status.as_u16() == 429)
///     }
/// }
/// ```
pub trait RetryPredicate: Send + Sync {
    /// Returns `true` if the attempt with this result should be retried.
    ///
    /// `attempt` is 1-indexed.
    fn should_retry(&self, result: &DataResult, attempt: usize) -> bool;
}

/// Retries transport failures and 5xx/429 statuses.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, result: &DataResult, _attempt: usize) -> bool {
        match result {
            Ok(response) => {
                response.status.is_server_error()
                    || response.status == StatusCode::TOO_MANY_REQUESTS
            }
            Err(e) => e.is_retryable(),
        }
    }
}

/// Retries responses with any of the given statuses.
#[derive(Debug, Clone)]
pub struct RetryOnStatus {
    statuses: Vec<StatusCode>,
}

impl RetryOnStatus {
    /// Creates a predicate matching `statuses`.
    pub fn new(statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }
}

impl RetryPredicate for RetryOnStatus {
    fn should_retry(&self, result: &DataResult, _attempt: usize) -> bool {
        let status = match result {
            Ok(response) => Some(response.status),
            Err(e) => e.status(),
        };
        status.is_some_and(|status| self.statuses.contains(&status))
    }
}

/// Retries only 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, result: &DataResult, _attempt: usize) -> bool {
        matches!(result, Ok(response) if response.status.is_server_error())
    }
}

/// Retries only timeouts.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, result: &DataResult, _attempt: usize) -> bool {
        matches!(
            result,
            Err(ServiceError::Transport {
                error: TransportError::Timeout,
                ..
            })
        )
    }
}

/// Retries any transport failure except cancellation.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTransportError;

impl RetryPredicate for RetryOnTransportError {
    fn should_retry(&self, result: &DataResult, _attempt: usize) -> bool {
        matches!(
            result,
            Err(ServiceError::Transport { error, .. }) if *error != TransportError::Cancelled
        )
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// Retries if ANY of the predicates return `true`.
///
/// # Examples
///
/// ```
/// use requester::retry::{RetryOn5xx, RetryOnTimeout, OrPredicate};
///
/// // Retry on 5xx errors OR timeouts
/// let predicate = OrPredicate::new(vec![
///     Box::new(RetryOn5xx),
///     Box::new(RetryOnTimeout),
/// ]);
/// ```
pub struct OrPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for OrPredicate {
    fn should_retry(&self, result: &DataResult, attempt: usize) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(result, attempt))
    }
}

/// Combine multiple retry predicates with AND logic.
///
/// Retries only if ALL of the predicates return `true`.
///
/// # Examples
///
/// ```
/// use requester::retry::{RetryOn5xx, AndPredicate};
/// use requester::{DataResult, RetryPredicate};
///
/// struct FirstAttemptOnly;
///
/// impl RetryPredicate for FirstAttemptOnly {
///     fn should_retry(&self, _result: &DataResult, attempt: usize) -> bool {
///         attempt == 1
///     }
/// }
///
/// let predicate = AndPredicate::new(vec![
///     Box::new(RetryOn5xx),
///     Box::new(FirstAttemptOnly),
/// ]);
/// ```
pub struct AndPredicate {
    predicates: Vec<Box<dyn RetryPredicate>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate>>) -> Self {
        Self { predicates }
    }
}

impl RetryPredicate for AndPredicate {
    fn should_retry(&self, result: &DataResult, attempt: usize) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(result, attempt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(strategy: &RetryStrategy) -> Vec<Duration> {
        (1..).map_while(|attempt| strategy.delay_after(attempt)).collect()
    }

    #[test]
    fn test_exponential_schedule_doubles_up_to_ceiling() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            max_retries: 5,
            jitter: false,
        };

        assert_eq!(
            schedule(&strategy),
            [100, 200, 400, 500, 500].map(Duration::from_millis)
        );
    }

    #[test]
    fn test_exponential_saturates_on_large_attempts() {
        let strategy = RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: usize::MAX,
            jitter: false,
        };
        assert_eq!(strategy.delay_after(200), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_jittered_delays_stay_in_band() {
        let strategy = RetryStrategy::exponential(Duration::from_millis(100), Duration::from_secs(10), 3);
        for (delay, base) in schedule(&strategy).into_iter().zip([100u64, 200, 400]) {
            assert!(delay >= Duration::from_millis(base / 2) && delay <= Duration::from_millis(base));
        }
    }

    #[test]
    fn test_linear_and_none_budgets() {
        let linear = RetryStrategy::linear(Duration::from_secs(1), 2);
        assert_eq!(schedule(&linear), vec![Duration::from_secs(1); 2]);
        assert_eq!(linear.max_retries(), Some(2));

        assert!(schedule(&RetryStrategy::None).is_empty());
    }

    #[test]
    fn test_custom_owns_its_budget() {
        let strategy = RetryStrategy::Custom {
            delay_fn: |attempt| (attempt < 3).then(|| Duration::from_millis(attempt as u64 * 10)),
        };
        assert_eq!(strategy.max_retries(), None);
        assert_eq!(schedule(&strategy), [10, 20].map(Duration::from_millis));
    }

    fn ok(status: u16) -> DataResult {
        let request = crate::TransportRequest::new(
            http::Method::GET,
            "https://api.example.com/".parse().unwrap(),
        );
        Ok(crate::DataResponse::new(
            bytes::Bytes::new(),
            request,
            StatusCode::from_u16(status).unwrap(),
            http::HeaderMap::new(),
        ))
    }

    fn failed(error: TransportError) -> DataResult {
        Err(ServiceError::transport(error))
    }

    #[test]
    fn test_status_predicates() {
        let on_503 = RetryOnStatus::new([StatusCode::SERVICE_UNAVAILABLE]);
        assert!(on_503.should_retry(&ok(503), 1));
        assert!(!on_503.should_retry(&ok(500), 1));
        assert!(RetryOn5xx.should_retry(&ok(500), 1));
        assert!(!RetryOn5xx.should_retry(&ok(404), 1));
        assert!(RetryOnRetryable.should_retry(&ok(429), 1));
        assert!(!RetryOnRetryable.should_retry(&ok(200), 1));
    }

    #[test]
    fn test_transport_predicates() {
        assert!(RetryOnTimeout.should_retry(&failed(TransportError::Timeout), 1));
        assert!(!RetryOnTimeout.should_retry(&failed(TransportError::Unknown), 1));
        assert!(RetryOnTransportError.should_retry(&failed(TransportError::Unknown), 1));
        assert!(!RetryOnTransportError.should_retry(&failed(TransportError::Cancelled), 1));
        assert!(RetryOnRetryable.should_retry(&failed(TransportError::Timeout), 1));
    }

    #[test]
    fn test_combinators() {
        let either = OrPredicate::new(vec![Box::new(RetryOn5xx), Box::new(RetryOnTimeout)]);
        assert!(either.should_retry(&ok(502), 1));
        assert!(either.should_retry(&failed(TransportError::Timeout), 1));
        assert!(!either.should_retry(&ok(200), 1));

        let both = AndPredicate::new(vec![
            Box::new(RetryOn5xx),
            Box::new(RetryOnStatus::new([StatusCode::BAD_GATEWAY])),
        ]);
        assert!(both.should_retry(&ok(502), 1));
        assert!(!both.should_retry(&ok(500), 1));
    }
}
