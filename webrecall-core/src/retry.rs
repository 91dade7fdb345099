//! Bounded retry with exponential backoff for recoverable failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::constants::{WRITE_RETRY_ATTEMPTS, WRITE_RETRY_BASE_MS, WRITE_RETRY_MAX_MS};
use crate::error::{Error, Result};

/// Retry policy: attempt count plus backoff window.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: WRITE_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(WRITE_RETRY_BASE_MS),
            max_delay: Duration::from_millis(WRITE_RETRY_MAX_MS),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        self.base_delay.saturating_mul(factor as u32).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, it fails unrecoverably, or attempts
/// run out. Only errors whose `is_recoverable()` is true are retried.
pub async fn with_backoff<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_recoverable() && attempt + 1 < config.max_attempts => {
                let delay = config.delay_for(attempt);
                warn!(
                    operation = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying recoverable failure"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
