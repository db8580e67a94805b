//! Retry policy for election failures.
//!
//! When the metadata group owning a container has no leader, every request
//! touching that container fails until an election completes. The caller
//! waits a fixed delay, at least as long as the backend's own election
//! timeout, and tries again. There is no cap on attempts and no growth of
//! the delay.

use std::future::Future;
use std::time::Duration;

use crate::backend::{BackendError, BackendResult};
use crate::counters::Counters;

/// Default wait after an election failure, matching the backend's election
/// timeout.
pub const DEFAULT_ELECTION_DELAY: Duration = Duration::from_secs(20);

/// Fixed-delay, unbounded retry on [`BackendError::ElectionFailed`]
#[derive(Debug, Clone)]
pub struct ElectionRetry {
    delay: Duration,
    elections: Counters,
}

impl ElectionRetry {
    /// Each retry records `(1, 0)` into `elections`
    pub fn new(delay: Duration, elections: Counters) -> Self {
        Self { delay, elections }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decide what to do with a failed attempt: for an election failure,
    /// count it, sleep and return `Ok(())` so the caller retries; any other
    /// error is handed back.
    pub async fn absorb(&self, error: BackendError, subject: &str) -> BackendResult<()> {
        if !error.is_transient() {
            return Err(error);
        }

        self.elections.add(1, 0);
        tracing::warn!(
            container = %subject,
            error = %error,
            delay_secs = self.delay.as_secs_f64(),
            "Election failed, waiting before retry"
        );
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    /// Run `op` until it succeeds or fails with a non-transient error.
    pub async fn run<T, F, Fut>(&self, subject: &str, mut op: F) -> BackendResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => self.absorb(e, subject).await?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn retry(elections: &Counters) -> ElectionRetry {
        ElectionRetry::new(Duration::from_millis(5), elections.clone())
    }

    #[tokio::test]
    async fn test_success_without_retry() {
        let elections = Counters::new();
        let value = retry(&elections)
            .run("c", || async { Ok::<_, BackendError>(7) })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(elections.total().files, 0);
    }

    #[tokio::test]
    async fn test_retries_exactly_k_times() {
        let elections = Counters::new();
        let attempts = AtomicUsize::new(0);
        let k = 4;

        let started = Instant::now();
        let value = retry(&elections)
            .run("c", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < k {
                        Err(BackendError::ElectionFailed("Election failed".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), k + 1);
        assert_eq!(elections.total().files, k as u64);
        assert_eq!(elections.total().bytes, 0);
        // One fixed delay per failure, no growth
        assert!(started.elapsed() >= Duration::from_millis(5 * k as u64));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let elections = Counters::new();
        let attempts = AtomicUsize::new(0);

        let result: BackendResult<()> = retry(&elections)
            .run("c", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(BackendError::NotFound("c".into())) }
            })
            .await;

        assert_eq!(result, Err(BackendError::NotFound("c".into())));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(elections.total().files, 0);
    }

    #[tokio::test]
    async fn test_absorb() {
        let elections = Counters::new();
        let policy = retry(&elections);

        assert!(
            policy
                .absorb(BackendError::ElectionFailed("x".into()), "c")
                .await
                .is_ok()
        );
        assert!(
            policy
                .absorb(BackendError::Network("x".into()), "c")
                .await
                .is_err()
        );
        assert_eq!(elections.total().files, 1);
    }
}
