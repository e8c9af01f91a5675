// ABOUTME: Bounded exponential backoff shared by connection dialing and reconnects.
// ABOUTME: Attempt k >= 2 waits min(initial * 2^(k-1), max); attempt 1 never waits.

use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts, including the first one. Never less than one.
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

/// Outcome of [`Backoff::retry`] when no attempt succeeded.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed in a way retrying cannot fix.
    Permanent(E),
    /// Every attempt failed; carries the last error.
    Exhausted { attempts: u32, last: E },
}

impl Backoff {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait before the 1-based `attempt`.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut operation: F,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            let delay = self.delay_before_attempt(attempt);
            if !delay.is_zero() {
                tracing::debug!(attempt, ?delay, "waiting before retry");
                tokio::time::sleep(delay).await;
            }

            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "attempt failed"
                    );
                    attempt += 1;
                }
            }
        }
    }
}
