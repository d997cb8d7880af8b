//! Retry and backoff engine
//!
//! Wraps any async operation with bounded retries. The delay after failed attempt `n`
//! (zero-based) is computed by [`RetryPolicy::backoff_delay`], capped at `max_delay`, and
//! optionally perturbed by ±25% jitter. Which failures are retried is decided by a predicate;
//! the default one is [`Retryable::is_retryable`]. When attempts run out the last error is
//! returned as-is.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

/// Shape of the delay curve between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of invocations, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffStrategy,
    pub jitter: bool,
    /// Abort a single attempt after this long
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::upload()
    }
}

impl RetryPolicy {
    /// Flaky connections: 5 attempts, exponential from 1 s, capped at 30 s
    pub fn network() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff: BackoffStrategy::Exponential,
            jitter: true,
            attempt_timeout: None,
        }
    }

    /// Part and file uploads: 3 attempts, exponential from 1 s, capped at 30 s
    pub fn upload() -> Self {
        Self {
            max_attempts: 3,
            ..Self::network()
        }
    }

    /// Cheap calls: 3 attempts, linear from 500 ms, capped at 2 s
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(2000),
            backoff: BackoffStrategy::Linear,
            jitter: true,
            attempt_timeout: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Pre-jitter delay after failed attempt `attempt` (zero-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let millis = match self.backoff {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64 + 1),
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt.min(63)))
            }
        };
        Duration::from_millis(millis).min(self.max_delay)
    }

    /// Delay actually slept after failed attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        if self.jitter {
            apply_jitter(delay)
        } else {
            delay
        }
    }
}

/// Scale `delay` by a random factor in [0.75, 1.25].
pub fn apply_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::rng().random_range(0.75..=1.25);
    delay.mul_f64(factor)
}

/// Failure classification used by retry predicates
pub trait Retryable {
    /// HTTP status carried by the failure, if there was a response
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// Failure happened below HTTP: connect, reset, timeout
    fn is_network_error(&self) -> bool {
        false
    }

    fn is_retryable(&self) -> bool {
        default_retry_predicate(self)
    }
}

/// Network failures, 5xx, 408 and 429 are retried; every other 4xx is not.
pub fn default_retry_predicate<E: Retryable + ?Sized>(err: &E) -> bool {
    if err.is_network_error() {
        return true;
    }
    matches!(err.status_code(), Some(s) if s >= 500 || s == 408 || s == 429)
}

pub fn network_errors<E: Retryable>(err: &E) -> bool {
    err.is_network_error()
}

pub fn server_errors<E: Retryable>(err: &E) -> bool {
    matches!(err.status_code(), Some(s) if s >= 500)
}

/// Timeouts, throttling and gateway failures
pub fn temporary_errors<E: Retryable>(err: &E) -> bool {
    matches!(err.status_code(), Some(408 | 429 | 502 | 503 | 504))
}

/// Retry when any of `predicates` says so
pub fn any_of<E>(predicates: Vec<fn(&E) -> bool>) -> impl Fn(&E) -> bool {
    move |err| predicates.iter().any(|p| p(err))
}

/// Returned for an attempt that exceeded `RetryPolicy::attempt_timeout`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("attempt timed out after {0:?}")]
pub struct AttemptTimeout(pub Duration);

/// Retry `operation` using the error's own classification.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    E: Retryable + From<AttemptTimeout> + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with(policy, operation, |e: &E| e.is_retryable(), |_, _| {}).await
}

/// Retry `operation` with an explicit predicate and an observer.
///
/// `operation` receives the zero-based attempt index. `on_retry` is called with the
/// one-based number of the attempt that just failed, before sleeping.
pub async fn retry_with<T, E, F, Fut, P, O>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: P,
    mut on_retry: O,
) -> Result<T, E>
where
    E: From<AttemptTimeout> + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    O: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let result = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(E::from(AttemptTimeout(limit))),
            },
            None => operation(attempt).await,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let is_last = attempt + 1 >= max_attempts;
        if is_last || !should_retry(&err) {
            return Err(err);
        }

        let delay = policy.delay_for(attempt);
        tracing::debug!(
            attempt = attempt + 1,
            max_attempts = max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed, retrying"
        );
        on_retry(attempt + 1, &err);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Stops calling a failing dependency for `open_for` after `threshold` consecutive
/// failures. After that window one trial call is let through (half-open); success closes
/// the circuit, failure re-opens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    open_for: Duration,
    state: Mutex<BreakerState>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

impl<E: Retryable> Retryable for CircuitError<E> {
    fn status_code(&self) -> Option<u16> {
        match self {
            CircuitError::Open => None,
            CircuitError::Inner(e) => e.status_code(),
        }
    }

    fn is_network_error(&self) -> bool {
        match self {
            CircuitError::Open => false,
            CircuitError::Inner(e) => e.is_network_error(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CircuitError::Open => false,
            CircuitError::Inner(e) => e.is_retryable(),
        }
    }
}

impl<E: From<AttemptTimeout>> From<AttemptTimeout> for CircuitError<E> {
    fn from(timeout: AttemptTimeout) -> Self {
        CircuitError::Inner(E::from(timeout))
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, open_for: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            open_for,
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.opened_at {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() >= self.open_for => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    pub fn record_success(&self) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.consecutive_failures = 0;
        guard.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.consecutive_failures += 1;
        let half_open = matches!(guard.opened_at, Some(at) if at.elapsed() >= self.open_for);
        if half_open || guard.consecutive_failures >= self.threshold {
            if guard.opened_at.is_none() || half_open {
                tracing::warn!(
                    failures = guard.consecutive_failures,
                    open_for_secs = self.open_for.as_secs(),
                    "Circuit breaker opened"
                );
            }
            guard.opened_at = Some(Instant::now());
        }
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.state() == CircuitState::Open {
            return Err(CircuitError::Open);
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitError::Inner(err))
            }
        }
    }
}
