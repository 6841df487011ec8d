//! Bounded retry with exponential backoff
//!
//! Wraps a single backend call. The operation is invoked up to
//! `max_attempts` times; between attempts the executor sleeps for the current
//! delay and then doubles it. There is no jitter and no cap: with the default
//! three attempts the schedule is `500ms`, `1000ms`.
//!
//! # Formula
//! `delay before attempt k (k >= 2) = initial_delay * 2^(k - 2)`

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, RetryError};

/// Retry policy applied to every backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts per backend, including the first.
    ///
    /// Default: 3 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds); doubled for each later one.
    ///
    /// Default: 500 milliseconds
    #[serde(default = "defaults::initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            initial_delay_ms: defaults::initial_delay_ms(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay slept before the given 1-based attempt.
    ///
    /// Returns `Duration::ZERO` for the first attempt.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        delay_before(attempt, self.initial_delay())
    }

    /// Run `operation` under this policy.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError`] once `max_attempts` attempts have failed.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<Retried<T>, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        execute_with_backoff(operation, self.max_attempts, self.initial_delay()).await
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn initial_delay_ms() -> u64 {
        500
    }
}

/// A successful value together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

fn delay_before(attempt: u32, initial_delay: Duration) -> Duration {
    match attempt {
        0 | 1 => Duration::ZERO,
        k => {
            let exponent = k - 2;
            if exponent >= 32 {
                Duration::MAX
            } else {
                initial_delay.saturating_mul(1 << exponent)
            }
        }
    }
}

/// Invoke `operation` until it succeeds or `max_attempts` attempts have failed.
///
/// The operation receives the 1-based attempt number. Intermediate failures
/// are logged and otherwise swallowed; only the last one is returned. With
/// `max_attempts == 0` the operation is never invoked.
///
/// # Errors
///
/// Returns [`RetryError`] carrying the attempt count and the final cause.
pub async fn execute_with_backoff<T, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    initial_delay: Duration,
) -> Result<Retried<T>, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    if max_attempts == 0 {
        return Err(RetryError {
            attempts: 0,
            last_error: None,
        });
    }

    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) if attempt >= max_attempts => {
                return Err(RetryError {
                    attempts: attempt,
                    last_error: Some(error),
                });
            }
            Err(error) => {
                attempt += 1;
                let delay = delay_before(attempt, initial_delay);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Attempt failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    fn failure() -> BackendError {
        BackendError::Unavailable {
            backend: Arc::from("ProviderA"),
            reason: "down".to_string(),
        }
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(500));
        assert_eq!(policy.delay_before(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(4), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(200), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);

        let result = execute_with_backoff(
            |_| {
                *counter.lock().unwrap() += 1;
                async { Ok::<_, BackendError>("sent") }
            },
            3,
            Duration::from_millis(500),
        )
        .await
        .unwrap();

        assert_eq!(result, Retried { value: "sent", attempts: 1 });
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_invokes_max_attempts() {
        let started = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        let error = execute_with_backoff(
            |attempt| {
                log.lock().unwrap().push((attempt, started.elapsed()));
                async { Err::<(), _>(failure()) }
            },
            3,
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();

        assert_eq!(error.attempts, 3);
        assert_eq!(error.last_error, Some(failure()));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (1, Duration::ZERO),
                (2, Duration::from_millis(500)),
                (3, Duration::from_millis(1500)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_later_attempt() {
        let result = execute_with_backoff(
            |attempt| async move {
                if attempt < 2 {
                    Err(failure())
                } else {
                    Ok(attempt)
                }
            },
            3,
            Duration::from_millis(10),
        )
        .await
        .unwrap();

        assert_eq!(result.attempts, 2);
        assert_eq!(result.value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_fails_immediately() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);

        let error = execute_with_backoff(
            |_| {
                *counter.lock().unwrap() += 1;
                async { Ok::<_, BackendError>(()) }
            },
            0,
            Duration::from_millis(500),
        )
        .await
        .unwrap_err();

        assert_eq!(error.attempts, 0);
        assert_eq!(error.last_error, None);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_execute_uses_configured_attempts() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 1,
        };

        let error = policy
            .execute(|_| async { Err::<(), _>(failure()) })
            .await
            .unwrap_err();
        assert_eq!(error.attempts, 5);
    }
}
