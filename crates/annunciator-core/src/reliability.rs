//! Retry combinators.
//!
//! Two shapes are needed: bounded retries (sign command delivery) and
//! retry-until-success loops that only stop at shutdown (alarm-off reversion,
//! power-cycle recovery).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::shutdown::ShutdownSignal;

/// Retry policy configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt; `None` retries forever
    pub max_retries: Option<u32>,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Fixed delay, bounded retries.
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            delay,
        }
    }

    /// Fixed delay, no retry limit. Only shutdown ends the loop.
    pub fn persistent(delay: Duration) -> Self {
        Self {
            max_retries: None,
            delay,
        }
    }

    fn exhausted(&self, retries: u32) -> bool {
        self.max_retries.is_some_and(|max| retries >= max)
    }

    /// Run `operation` until it succeeds or the retry budget is spent.
    /// The operation receives the zero-based attempt number.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if self.exhausted(attempt) {
                        return Err(err);
                    }
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run `operation` until it succeeds, the retry budget is spent, or
    /// shutdown is signalled. Returns `None` when shutdown ended the loop,
    /// `Some(Err)` when the budget ran out.
    pub async fn execute_until_shutdown<F, Fut, T, E>(
        &self,
        shutdown: &ShutdownSignal,
        what: &str,
        mut operation: F,
    ) -> Option<Result<T, E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            if shutdown.is_shutdown() {
                debug!(what, attempt, "retry loop stopped by shutdown");
                return None;
            }
            match operation(attempt).await {
                Ok(value) => return Some(Ok(value)),
                Err(err) => {
                    if self.exhausted(attempt) {
                        return Some(Err(err));
                    }
                    warn!(what, attempt, error = %err, "attempt failed, retrying");
                    if !shutdown.sleep(self.delay).await {
                        return None;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
