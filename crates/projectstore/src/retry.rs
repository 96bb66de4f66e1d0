//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use projectstore_core::storage::{RepositoryError, Result};

/// Retry and timeout settings applied to every store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (default: 3)
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on each subsequent one (default: 50ms)
    pub base_delay: Duration,
    /// Upper bound of a single backoff delay (default: 2s)
    pub max_delay: Duration,
    /// Deadline of a single attempt (default: 5s)
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// The same timeout, without retries. Used for non-idempotent writes.
    pub fn single_attempt(&self) -> Self {
        Self {
            max_attempts: 1,
            ..self.clone()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// Exponential in `attempt`, capped at `max_delay`, with random jitter
    /// over the upper half of the interval.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let millis = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Duration::ZERO;
        }
        let half = millis / 2;
        let jitter = rand::rng().random_range(0..=half);
        Duration::from_millis(millis - half + jitter)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Each attempt is bounded by `request_timeout`; an attempt that times
    /// out counts as a transient failure.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.request_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(RepositoryError::Transient(format!(
                    "{} timed out after {}ms",
                    operation,
                    self.request_timeout.as_millis()
                ))),
            };

            match result {
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying transient store error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
