//! Retry logic for transient remote failures
//!
//! The policy itself is [`RetryConfig`]: a bounded number of attempts, an initial delay,
//! a multiplier (1.0 gives the fixed delay the publishing service recommends), a cap and
//! optional jitter. [`with_retry`] applies it to any async operation whose error
//! implements [`IsRetryable`]; the upload path in [`crate::transfer`] drives the same
//! policy by hand because it has to resynchronise between attempts.
//!
//! # Example
//!
//! ```no_run
//! use tube_relay::config::RetryConfig;
//! use tube_relay::retry::{IsRetryable, with_retry};
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// `errors[].reason` values Google uses for throttling behind a 403
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (rate limiting, server overload, temporary unavailability,
/// connection trouble) should return `true`. Permanent failures (bad request,
/// permission denied, missing object, local disk errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Api { status, reason, .. } => match status {
                429 | 500 | 502 | 503 | 504 => true,
                403 => reason
                    .as_deref()
                    .is_some_and(|r| RATE_LIMIT_REASONS.contains(&r)),
                _ => false,
            },
            // Only failures to reach the service; a body decode error is not transient
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // Local I/O never gets better by waiting
            Error::Io(_) => false,
            Error::Config { .. }
            | Error::AuthUnavailable(_)
            | Error::Protocol(_)
            | Error::RetriesExhausted { .. }
            | Error::EmptyUpload(_)
            | Error::Cancelled
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

impl RetryConfig {
    /// Delay to wait before retry number `attempt` (1-based)
    ///
    /// `initial_delay * backoff_multiplier^(attempt - 1)`, capped at `max_delay`, with
    /// jitter applied after the cap when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let base = if secs.is_finite() {
            Duration::from_secs_f64(secs).min(self.max_delay.max(self.initial_delay))
        } else {
            self.max_delay
        };
        if self.jitter { add_jitter(base) } else { base }
    }
}

/// Execute an async operation, retrying transient failures according to `config`
///
/// # Arguments
///
/// * `config` - Retry policy (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns `Result<T, E>` where `E` implements
///   [`IsRetryable`]
///
/// # Returns
///
/// The successful result, or the last error once a non-retryable error occurs or all
/// retry attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(error = %e, "operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the actual
/// delay lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
