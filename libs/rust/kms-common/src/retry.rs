//! Retry policy with exponential backoff.
//!
//! Retries are bounded twice: by the configured attempt budget and by the
//! caller's deadline. A retry whose backoff would end past the deadline is
//! never started; the last error is returned instead.
//!
//! A server `Retry-After` hint is a floor for the wait, never shortened. A
//! hint longer than `max_delay` ends the retry loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Classification an error type must provide to be retried.
pub trait Retryable {
    /// Whether the failure is transient and the operation may succeed later.
    fn is_retryable(&self) -> bool;

    /// Server-provided hint for how long to wait before retrying.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for computed backoff and for an accepted server hint
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add up to 25% jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Executes async operations with bounded retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from a configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// A policy that performs exactly one attempt.
    #[must_use]
    pub fn none() -> Self {
        Self::new(RetryConfig::default().with_max_retries(0))
    }

    /// Backoff delay before retry number `attempt` (zero based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_ms = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(exponent);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let final_ms = if self.config.jitter {
            capped_ms * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms as u64)
    }

    /// Whether `error` should be retried after `attempt` retries have run.
    #[must_use]
    pub fn should_retry<E: Retryable>(&self, error: &E, attempt: u32) -> bool {
        attempt < self.config.max_retries && error.is_retryable()
    }

    /// Run `operation` until it succeeds, fails permanently, exhausts the
    /// retry budget, or the next backoff would cross `deadline`.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn execute<F, Fut, T, E>(
        &self,
        deadline: Option<Instant>,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.should_retry(&error, attempt) {
                return Err(error);
            }

            let backoff = self.delay_for_attempt(attempt);
            let delay = match error.retry_after() {
                Some(hint) if hint > self.config.max_delay => {
                    debug!(
                        attempt,
                        retry_after_ms = hint.as_millis() as u64,
                        "retry skipped: server hint exceeds max delay"
                    );
                    return Err(error);
                }
                Some(hint) => hint.max(backoff),
                None => backoff,
            };

            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                debug!(attempt, "retry skipped: backoff would exceed deadline");
                return Err(error);
            }

            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying operation");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
