//! Bounded fixed-delay retry
//!
//! One [`RetryPolicy`] is shared by embedding batches and insert batches.
//! Errors are classified with [`AppError::is_retryable`]; permanent errors
//! stop immediately, transient ones are retried until the attempt budget is
//! spent.

use crate::errors::{AppError, Result};
use crate::metrics;
use backoff::backoff::Backoff;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Maximum attempts and the fixed pause between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(10),
        }
    }
}

/// Fixed delay, capped at `max_attempts - 1` retries
struct FixedBackoff {
    delay: Duration,
    retries_left: u32,
    max_retries: u32,
}

impl Backoff for FixedBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;
        Some(self.delay)
    }

    fn reset(&mut self) {
        self.retries_left = self.max_retries;
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn backoff(&self) -> FixedBackoff {
        let max_retries = self.max_attempts.saturating_sub(1);
        FixedBackoff {
            delay: self.delay,
            retries_left: max_retries,
            max_retries,
        }
    }

    /// Run `op`, retrying transient failures.
    ///
    /// `operation` names the work in logs and metrics. The last error is
    /// returned once the attempt budget is exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts;

        backoff::future::retry_notify(
            self.backoff(),
            || {
                let fut = op();
                async move {
                    fut.await.map_err(|e| {
                        if e.is_retryable() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |err: AppError, wait: Duration| {
                metrics::record_retry(operation);
                warn!(
                    operation = operation,
                    max_attempts = max_attempts,
                    wait_secs = wait.as_secs_f64(),
                    error = %err,
                    "Attempt failed, retrying"
                );
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let result = fast(2)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AppError::Embedding {
                        message: "timeout".to_string(),
                    })
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(assert_ok!(result), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_exactly_once() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(2)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::index("data", "unavailable"))
            })
            .await;

        assert!(matches!(assert_err!(result), AppError::Index { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast(3)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Consistency {
                    expected: 3,
                    actual: 2,
                })
            })
            .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_is_single_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::none()
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Embedding {
                    message: "down".to_string(),
                })
            })
            .await;

        assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
