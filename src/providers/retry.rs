//! Bounded retry policy for provider calls and downloads
//!
//! Attempts and delay are fixed up front, and the sleep is injected so the
//! policy can be unit-tested without real time passing.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

/// Suspends the task between attempts. Production uses tokio's timer; tests
/// inject a recorder.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Tokio-backed sleeper used outside of tests
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fixed-delay retry policy: `max_attempts` total tries with `delay` between
/// them, surfacing the last error once exhausted.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds or attempts are exhausted
    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.run_with(&TokioSleeper, label, op).await
    }

    /// Same as [`run`](Self::run) with an explicit sleeper
    pub async fn run_with<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        mut op: F,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        sleeper.sleep(self.delay).await;
                    }
                }
            }
        }

        Err(last_error.expect("at least one attempt runs"))
    }
}
