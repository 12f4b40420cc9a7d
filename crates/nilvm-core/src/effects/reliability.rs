//! Reliability Effects
//!
//! Retry patterns for node calls. Every unit of work owns its own attempt
//! counter, so concurrent legs of one operation never share retry state.

use crate::NilError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Default delay between two attempts of the same unit of work
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default number of attempts, including the first one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry policy configuration
///
/// `max_attempts` counts every call made, the first one included. A policy
/// with `max_attempts == 1` never retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (first call included)
    pub max_attempts: u32,
    /// Delay between two consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a retry policy with a fixed delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay,
        }
    }

    /// A policy that performs exactly one attempt
    pub fn no_retry() -> Self {
        Self::fixed(Duration::ZERO).with_max_attempts(1)
    }

    /// Set maximum attempts (clamped to at least one)
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Run `operation` until it succeeds, fails with a non-recoverable error,
    /// or runs out of attempts.
    ///
    /// Fatal errors return immediately without sleeping. On exhaustion the
    /// error from the last attempt is returned unchanged.
    pub async fn retry_if_recoverable<F, Fut, T>(
        &self,
        label: &str,
        mut operation: F,
    ) -> Result<T, NilError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, NilError>>,
    {
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(%label, attempt, "Succeeded after retrying");
                    }
                    return Ok(result);
                }
                Err(err) if !err.is_recoverable() => {
                    tracing::error!(%label, attempt, error = %err, "Non-recoverable failure");
                    return Err(err);
                }
                Err(err) if attempt >= self.max_attempts => {
                    tracing::error!(
                        %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Retry attempts exhausted"
                    );
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        %label,
                        attempt,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "Recoverable failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY)
    }
}
