//! Bounded exponential backoff shared by every client.
//!
//! A [`RetryPolicy`] describes how many attempts an operation gets and how long
//! to wait between them. [`retry_with_policy`] runs an operation under a policy,
//! retrying only errors that report themselves as [`Transient`], and stops as
//! soon as the supplied cancellation token fires (including mid-sleep).

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;

/// Errors that know whether another attempt could succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// One try plus a single retry after a fixed short delay.
    pub fn single_retry(delay: Duration) -> Self {
        Self {
            max_attempts: 2,
            base_delay: delay,
            factor: 1,
            max_delay: delay,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based), capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let multiplier = self.factor.max(1).saturating_pow(exponent);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last: E },
    /// A non-transient error ended the loop immediately.
    Permanent { attempt: u32, error: E },
    /// The cancellation token fired before the next attempt.
    Cancelled { attempts: u32, last: Option<E> },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Permanent { attempt, .. } => *attempt,
            RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, exhausts the policy or
/// `cancel` fires. The closure receives the 1-based attempt number.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let max_attempts = policy.attempts();
    let mut last: Option<E> = None;
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(
                operation = operation_name,
                attempts = attempt,
                "Retry loop cancelled"
            );
            return Err(RetryError::Cancelled {
                attempts: attempt,
                last,
            });
        }

        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt = attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if !e.is_transient() => {
                return Err(RetryError::Permanent { attempt, error: e });
            }
            Err(e) if attempt >= max_attempts => {
                tracing::warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "Retries exhausted"
                );
                return Err(RetryError::Exhausted { attempts: attempt, last: e });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                last = Some(e);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(RetryError::Cancelled { attempts: attempt, last });
                    }
                    _ = sleep(delay) => {}
                }
            }
        }
    }
}
