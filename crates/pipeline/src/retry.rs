use crate::config::{BackoffStrategy, RetryConfig};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_backoff: Duration,
    max_backoff: Duration,
    strategy: BackoffStrategy,
}

impl RetryPolicy {
    /// A budget of 0 still makes one attempt.
    pub fn new(
        max_attempts: usize,
        base_backoff_ms: u64,
        max_backoff_ms: u64,
        strategy: BackoffStrategy,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff: Duration::from_millis(base_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            strategy,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.backoff_ms,
            config.max_backoff_ms,
            config.strategy,
        )
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1) as u32;
        let delay = match self.strategy {
            BackoffStrategy::Linear => self.base_backoff.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_backoff.saturating_mul(factor)
            }
        };
        std::cmp::min(delay, self.max_backoff)
    }

    /// Runs `f` until it succeeds or the attempt budget is spent, sleeping
    /// between attempts. Only the calling task waits. `f` receives the 1-based
    /// attempt number.
    pub async fn retry<F, Fut, T, E>(&self, operation_name: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempts = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    let backoff = self.backoff_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                }
            }
        }
    }
}
