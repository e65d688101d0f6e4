//! Retry schedules and the async retry driver.
//!
//! Two schedules cover the bridge: a short fixed one wrapped around every
//! release-server HTTP call, and a long stepped one that carries a
//! per-project release attempt across outages. The driver consults
//! [`Retryable`] so configuration-shaped errors stop a loop immediately.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Classifies whether an error is worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
enum Backoff {
    /// The same delay between every attempt after the first.
    Fixed(Duration),
    /// One delay per attempt, then `overflow` for anything beyond.
    Stepped {
        delays: Vec<Duration>,
        overflow: Duration,
    },
}

/// An attempt budget plus the delay schedule between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` attempts with a fixed `delay` between them.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    /// One attempt per entry of `delays` (each entry is the pause before
    /// that attempt), with `overflow` covering any attempt past the list.
    pub fn stepped(delays: Vec<Duration>, overflow: Duration) -> Self {
        Self {
            max_attempts: (delays.len() as u32).max(1),
            backoff: Backoff::Stepped { delays, overflow },
        }
    }

    /// Short schedule for release-server API calls: 2 attempts, 3 s apart.
    pub fn api() -> Self {
        Self::fixed(2, Duration::from_secs(3))
    }

    /// Long schedule for a per-project release attempt: 6 attempts with
    /// pauses of 0 s, 1 m, 5 m, 10 m, 15 m, and 30 m.
    pub fn reconcile() -> Self {
        Self::stepped(
            vec![
                Duration::ZERO,
                Duration::from_secs(60),
                Duration::from_secs(300),
                Duration::from_secs(600),
                Duration::from_secs(900),
                Duration::from_secs(1800),
            ],
            Duration::from_secs(3600),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause before the given 1-indexed attempt. The first attempt of
    /// either schedule is immediate.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(delay) => {
                if attempt <= 1 {
                    Duration::ZERO
                } else {
                    *delay
                }
            }
            Backoff::Stepped { delays, overflow } => delays
                .get(attempt.saturating_sub(1) as usize)
                .copied()
                .unwrap_or(*overflow),
        }
    }
}

/// Runs `operation` under `policy`, sleeping the scheduled delay before
/// each attempt. Returns the first success, the first terminal error, or
/// the last error once attempts are exhausted.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt: u32 = 1;
    loop {
        let delay = policy.delay_for_attempt(attempt);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retryable() || attempt >= policy.max_attempts {
                    return Err(error);
                }
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %error,
                    "attempt failed, retrying"
                );
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    #[test]
    fn api_schedule_is_two_attempts_three_seconds() {
        let policy = RetryPolicy::api();
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(3));
    }

    #[test]
    fn reconcile_schedule_steps_then_caps() {
        let policy = RetryPolicy::reconcile();
        assert_eq!(policy.max_attempts(), 6);
        let expected = [0u64, 60, 300, 600, 900, 1800];
        for (i, secs) in expected.iter().enumerate() {
            assert_eq!(
                policy.delay_for_attempt(i as u32 + 1),
                Duration::from_secs(*secs)
            );
        }
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(3600));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let policy = RetryPolicy::fixed(3, Duration::from_millis(5));
        let result: Result<u32, TestError> = retry(&policy, || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(TestError { retryable: true })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_stop_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let policy = RetryPolicy::fixed(5, Duration::from_millis(5));
        let result: Result<(), TestError> = retry(&policy, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retryable: false })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_then_returns_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let policy = RetryPolicy::fixed(3, Duration::from_millis(1));
        let result: Result<(), TestError> = retry(&policy, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError { retryable: true })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_attempt_is_immediate() {
        let policy = RetryPolicy::fixed(1, Duration::from_secs(60));
        let started = std::time::Instant::now();
        let result: Result<(), TestError> = retry(&policy, || async {
            Err(TestError { retryable: true })
        })
        .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
