//! Bounded exponential backoff for rate-limited platform calls.
//!
//! Platforms signal rate limiting with a distinct status; those calls are
//! worth retrying with increasing delays, while every other failure should
//! surface immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors that can be classified as rate limiting.
pub trait Retryable {
    /// Whether this failure was caused by upstream rate limiting.
    fn is_rate_limited(&self) -> bool;
}

/// Retry configuration for rate-limited operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5 * 60),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (0-indexed), capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay.mul_f64(self.backoff_factor.powi(exponent));
        delay.min(self.max_delay)
    }

    /// Execute `operation` up to `max_retries + 1` times.
    ///
    /// Only rate-limit failures are retried; any other error is returned
    /// immediately. If every attempt is rate limited, the last such error
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the operation's error when it fails with a non-retryable
    /// error or when retries are exhausted.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_rate_limited() => return Err(e),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        "Rate limited, backing off: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
