use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, warn};

/// Bounded retry with a per-attempt timeout.
///
/// `attempts` counts the first try, so `attempts = 2` means "retry once".
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            timeout,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    /// Returns the last error on exhaustion.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut last_err = anyhow!("{label}: no attempt made");

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!(label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    warn!(label, attempt, error = %err, "attempt failed");
                    last_err = err;
                }
                Err(_) => {
                    warn!(label, attempt, timeout_ms = self.timeout.as_millis() as u64, "attempt timed out");
                    last_err = anyhow!("{label}: timed out after {:?}", self.timeout);
                }
            }

            if attempt < attempts && !self.backoff.is_zero() {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_secs(1));

        let counter = calls.clone();
        let result = policy
            .run("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(anyhow!("boom"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(2, Duration::from_secs(1));

        let counter = calls.clone();
        let result: anyhow::Result<()> = policy
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow!("still down"))
                }
            })
            .await;

        assert!(result.unwrap_err().to_string().contains("still down"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_counts_as_failure() {
        let policy = RetryPolicy::new(1, Duration::from_millis(100));

        let result: anyhow::Result<()> = policy
            .run("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_backoff_between_attempts() {
        let policy = RetryPolicy {
            backoff: Duration::from_secs(1),
            ..RetryPolicy::new(3, Duration::from_secs(1))
        };
        let started = tokio::time::Instant::now();

        let result: anyhow::Result<()> = policy.run("flaky", || async { Err(anyhow!("nope")) }).await;

        assert!(result.is_err());
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
