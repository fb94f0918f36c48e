//! Bounded retry with backoff for remote operations
//!
//! [`RetryExecutor`] wraps any async operation whose error type implements
//! [`IsRetryable`]. Transient failures are retried after a delay computed by the
//! configured [`Backoff`]; permanent failures are returned immediately without
//! consuming the retry budget.
//!
//! # Example
//!
//! ```no_run
//! use sftp_ingest::retry::{IsRetryable, RetryExecutor};
//! use sftp_ingest::config::RetryConfig;
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
//! let executor = RetryExecutor::new(RetryConfig::default());
//! executor.execute(|| async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Backoff, RetryConfig};
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection reset, remote hiccups) return `true`.
/// Permanent failures (missing path, access denied, bad configuration) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
                    | std::io::ErrorKind::Unsupported
            ),
            // Unclassified errors get the benefit of the doubt
            Error::Other(_) => true,
            Error::NotFound(_) => false,
            Error::PermissionDenied(_) => false,
            // Connect/auth failures are fatal for the run, never retried per call
            Error::Connection(_) => false,
            Error::Config { .. } => false,
            Error::Storage(_) | Error::Sqlx(_) => false,
            Error::Serialization(_) => false,
            Error::Notification(_) => false,
            Error::Cancelled => false,
        }
    }
}

/// Reusable retry policy
#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create an executor with the given policy
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Executor with the given attempt count and base delay, linear backoff
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self::new(RetryConfig {
            max_attempts,
            base_delay,
            ..RetryConfig::default()
        })
    }

    /// The policy in use
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of attempts
    ///
    /// Returns the successful result or the last error encountered.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + std::fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(attempts = attempt, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);

                    tracing::warn!(
                        error = %e,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis(),
                        "Operation failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            error = %e,
                            attempts = attempt,
                            "Operation failed after all retry attempts exhausted"
                        );
                    } else {
                        tracing::debug!(error = %e, "Operation failed with non-retryable error");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay;
        let raw = match self.config.backoff {
            Backoff::Linear => base.saturating_mul(attempt),
            Backoff::Exponential { multiplier } => {
                let factor = multiplier.powi(attempt.saturating_sub(1).min(64) as i32);
                let nanos = base.as_nanos() as f64 * factor;
                if nanos.is_finite() && nanos < u64::MAX as f64 {
                    Duration::from_nanos(nanos as u64)
                } else {
                    self.config.max_delay
                }
            }
        };
        let capped = raw.min(self.config.max_delay);

        if self.config.jitter {
            add_jitter(capped)
        } else {
            capped
        }
    }
}

/// Add random jitter to a delay to avoid synchronized retries
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
