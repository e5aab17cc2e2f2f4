//! Retry logic with exponential backoff for blob uploads

use crate::config::UploadConfig;
use crate::error::CrosbyError;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Growth factor of the delay
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

impl From<&UploadConfig> for RetryPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(self.multiplier)
            .with_max_elapsed_time(None) // bounded by max_attempts
            .build()
    }
}

/// The operation kept failing
#[derive(Debug)]
pub struct RetryExhausted {
    /// Attempts made before giving up
    pub attempts: u32,
    /// Error of the last attempt
    pub last: CrosbyError,
}

/// Run `operation` until it succeeds, a non-retryable error occurs or
/// `max_attempts` is reached.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CrosbyError>>,
{
    let mut backoff = policy.backoff();
    let mut attempts = 0;

    loop {
        attempts += 1;

        let err = match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!(operation = what, attempts, "Succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if attempts >= policy.max_attempts || !err.is_retryable() {
            return Err(RetryExhausted {
                attempts,
                last: err,
            });
        }

        let Some(delay) = backoff.next_backoff() else {
            return Err(RetryExhausted {
                attempts,
                last: err,
            });
        };
        warn!(
            operation = what,
            attempts,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "Failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
