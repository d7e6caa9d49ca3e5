use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::error::{JudgeError, JudgeResult};

/// Bounds for retrying a transiently failing call
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// No new attempt is started once this much time has passed
    pub max_elapsed: Duration,
    /// Limit for a single attempt
    pub attempt_timeout: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_elapsed: Duration::from_secs(120),
            attempt_timeout: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempt` (1-based) failed with `error`
    fn backoff(&self, failed_attempt: u32, error: &JudgeError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after.min(self.max_delay);
        }

        let exponent = failed_attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter {
            with_jitter(delay)
        } else {
            delay
        }
    }
}

/// Keep half of the delay and randomize the other half
fn with_jitter(delay: Duration) -> Duration {
    let half_ms = (delay.as_millis() / 2) as u64;
    let spread = rand::thread_rng().gen_range(0..=half_ms);
    Duration::from_millis(half_ms + spread)
}

/// Runs fallible calls under a [`RetryPolicy`], retrying only transient failures
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `operation` until it succeeds, fails fatally, or the policy is spent.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> JudgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = JudgeResult<T>>,
    {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match tokio::time::timeout(self.policy.attempt_timeout, operation()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => JudgeError::Timeout {
                    after: self.policy.attempt_timeout,
                },
            };

            if !error.is_retryable() {
                return Err(error);
            }

            let delay = self.policy.backoff(attempt, &error);
            let out_of_time = started.elapsed() + delay >= self.policy.max_elapsed;

            if attempt >= max_attempts || out_of_time {
                tracing::warn!(
                    attempts = attempt,
                    error = %error,
                    "giving up on judge call"
                );
                return Err(JudgeError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            tracing::warn!(
                attempt,
                max_attempts,
                backoff_ms = delay.as_millis() as u64,
                error = %error,
                "retrying judge call"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Score;
    use std::cell::Cell;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_elapsed: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(5),
            jitter: false,
        }
    }

    fn transient() -> JudgeError {
        JudgeError::Transport("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let executor = RetryExecutor::new(fast_policy(5));
        let calls = Cell::new(0);

        let result = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                async { Score::new(4, "fine") }
            })
            .await
            .unwrap();

        assert_eq!(result.value(), 4);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let executor = RetryExecutor::new(fast_policy(5));
        let calls = Cell::new(0);

        let result = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                let call = calls.get();
                async move {
                    if call < 4 {
                        Err(transient())
                    } else {
                        Score::new(5, "eventually")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value(), 5);
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_stops_after_budget() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = Cell::new(0);

        let err = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                async { Err::<Score, _>(transient()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 3);
        match err {
            JudgeError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, JudgeError::Transport(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_parse_errors_are_not_retried() {
        let executor = RetryExecutor::new(fast_policy(5));
        let calls = Cell::new(0);

        let err = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                async { Err::<Score, _>(JudgeError::Parse("not json".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, JudgeError::Parse(_)));
    }

    #[tokio::test]
    async fn test_configuration_errors_are_not_retried() {
        let executor = RetryExecutor::new(fast_policy(5));
        let calls = Cell::new(0);

        let err = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                async { Err::<Score, _>(JudgeError::Configuration("no key".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, JudgeError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out_and_is_retried() {
        let mut policy = fast_policy(2);
        policy.attempt_timeout = Duration::from_millis(20);
        let executor = RetryExecutor::new(policy);
        let calls = Cell::new(0);

        let err = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                async {
                    sleep(Duration::from_secs(5)).await;
                    Score::new(3, "too late")
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 2);
        match err {
            JudgeError::RetriesExhausted { last, .. } => {
                assert!(matches!(*last, JudgeError::Timeout { .. }))
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_elapsed_budget_stops_retries() {
        let mut policy = fast_policy(10);
        policy.base_delay = Duration::from_millis(50);
        policy.max_delay = Duration::from_millis(50);
        policy.max_elapsed = Duration::from_millis(10);
        let executor = RetryExecutor::new(policy);
        let calls = Cell::new(0);

        let err = executor
            .execute(|| {
                calls.set(calls.get() + 1);
                async { Err::<Score, _>(transient()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, JudgeError::RetriesExhausted { attempts: 1, .. }));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter: false,
            ..RetryPolicy::default()
        };
        let err = transient();

        assert_eq!(policy.backoff(1, &err), Duration::from_millis(100));
        assert_eq!(policy.backoff(2, &err), Duration::from_millis(200));
        assert_eq!(policy.backoff(3, &err), Duration::from_millis(350));
        assert_eq!(policy.backoff(40, &err), Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            jitter: true,
            ..RetryPolicy::default()
        };
        let err = transient();

        for _ in 0..100 {
            let delay = policy.backoff(2, &err);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_backoff_honours_retry_after() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(3),
            ..RetryPolicy::default()
        };
        let short = JudgeError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
            message: "429".to_string(),
        };
        let long = JudgeError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
            message: "429".to_string(),
        };

        assert_eq!(policy.backoff(1, &short), Duration::from_secs(2));
        assert_eq!(policy.backoff(1, &long), Duration::from_secs(3));
    }
}
