//! Bounded retry with linearly growing backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// How often, and how patiently, a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub attempts: u32,
    /// Base delay; attempt `n` waits `delay * n` before running.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Delay to wait before the given (zero-based) attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Why [`retry`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error; `last` is the final one.
    Exhausted { attempts: u32, last: E },
    /// A non-transient error, returned as soon as it was seen.
    Fatal(E),
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempt budget is spent.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) => {
                attempt += 1;
                if attempt >= policy.attempts {
                    return Err(RetryError::Exhausted { attempts: attempt, last: e });
                }
                tracing::warn!(what = label, attempt, error = %e, "transient failure, retrying");
            }
            Err(e) => return Err(RetryError::Fatal(e)),
        }
    }
}
