/// Capped-retry wrapper for catalog traffic
///
/// Catalog and theme fetches retry up to 3 attempts with exponential
/// backoff (1 s, 2 s). Individual image loads deliberately skip this
/// wrapper; they feed the per-image error-count policy instead.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use log::warn;

use crate::error::EngineError;

const MAX_ATTEMPTS: u32 = 3;

/// Tracks per-URL attempt counters; a counter resets on success
#[derive(Debug, Default)]
pub struct RetryPolicy {
    attempts: HashMap<String, u32>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failed attempts recorded against a URL since its last success
    pub fn attempts_for(&self, url: &str) -> u32 {
        self.attempts.get(url).copied().unwrap_or(0)
    }

    /// Run `op` with up to 3 attempts, sleeping 2^attempt seconds
    /// between failures
    pub async fn run<T, F, Fut>(&mut self, url: &str, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => {
                    self.attempts.remove(url);
                    return Ok(value);
                }
                Err(err) => {
                    attempt += 1;
                    self.attempts.insert(url.to_string(), attempt);
                    if attempt >= MAX_ATTEMPTS {
                        warn!("{url}: giving up after {attempt} attempts: {err}");
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    warn!("{url}: attempt {attempt} failed ({err}), retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_with_backoff_sum() {
        let mut policy = RetryPolicy::new();
        let calls = Cell::new(0u32);
        let started = tokio::time::Instant::now();

        let result = policy
            .run("/themes", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(EngineError::Catalog("unreachable".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
        // Backoff sum: 1 s after the first failure, 2 s after the second
        assert!(started.elapsed() >= Duration::from_secs(3));
        // Counter resets on success
        assert_eq!(policy.attempts_for("/themes"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let mut policy = RetryPolicy::new();
        let calls = Cell::new(0u32);

        let result: Result<(), _> = policy
            .run("/themes/nature", || {
                calls.set(calls.get() + 1);
                async { Err(EngineError::Catalog("down".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
        assert_eq!(policy.attempts_for("/themes/nature"), 3);
    }

    #[tokio::test]
    async fn test_first_try_success_never_sleeps() {
        let mut policy = RetryPolicy::new();
        let result = policy.run("/themes", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(policy.attempts_for("/themes"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counters_are_tracked_per_url() {
        let mut policy = RetryPolicy::new();
        let _ = policy
            .run("/themes/a", || async {
                Err::<(), _>(EngineError::Catalog("down".into()))
            })
            .await;
        assert_eq!(policy.attempts_for("/themes/a"), 3);
        assert_eq!(policy.attempts_for("/themes/b"), 0);
    }
}
