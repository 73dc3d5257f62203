//! Bounded retry with exponential backoff and jitter, plus the empty-result
//! fallback wrapped around every search-provider call.

use std::future::Future;
use std::time::Duration;

use grantscout_shared::{GrantScoutError, Result, RetryPolicy};
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::SearchProvider;

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// Each attempt is bounded by `policy.attempt_timeout` when set. Between
/// attempts the task sleeps `policy.backoff(n)` plus up to `base_delay` of
/// random jitter. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        if attempt > 0 {
            let delay = policy.backoff(attempt - 1) + jitter(policy.base_delay);
            debug!(label, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retrying");
            tokio::time::sleep(delay).await;
        }

        let outcome = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, op()).await {
                Ok(result) => result,
                Err(_) => Err(GrantScoutError::Timeout {
                    operation: label.to_string(),
                    secs: limit.as_secs(),
                }),
            },
            None => op().await,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(label, attempt = attempt + 1, of = attempts, error = %e, "attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GrantScoutError::validation(format!("{label}: no attempts made"))))
}

/// Search with retries; an exhausted provider contributes an empty result list.
pub async fn search_with_fallback(
    provider: &dyn SearchProvider,
    query: &str,
    max_results: u32,
    policy: &RetryPolicy,
) -> Value {
    let label = provider.kind().as_str();
    match retry_with_backoff(label, policy, || provider.search(query, max_results)).await {
        Ok(results) => results,
        Err(e) => {
            warn!(provider = label, %query, error = %e, "search provider exhausted, using empty results");
            Value::Array(Vec::new())
        }
    }
}

fn jitter(base: Duration) -> Duration {
    let max_ms = base.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Some(Duration::from_secs(2)),
        }
    }

    /// Fails the first `failures` calls, then returns one hit.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        hang: bool,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                hang: false,
            }
        }
    }

    #[async_trait]
    impl SearchProvider for Flaky {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Tavily
        }

        async fn search(&self, _query: &str, _max_results: u32) -> Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if n < self.failures {
                Err(GrantScoutError::search("tavily", "boom"))
            } else {
                Ok(serde_json::json!([{"title": "ok", "url": "https://ok.org"}]))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let provider = Flaky::new(2);
        let start = tokio::time::Instant::now();

        let results = search_with_fallback(&provider, "q", 3, &policy(3)).await;

        assert_eq!(results.as_array().map(Vec::len), Some(1));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms of backoff before jitter
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_provider_falls_back_to_empty() {
        let provider = Flaky::new(u32::MAX);

        let results = search_with_fallback(&provider, "q", 3, &policy(3)).await;

        assert_eq!(results, Value::Array(vec![]));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempts_time_out() {
        let provider = Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
            hang: true,
        };

        let err = retry_with_backoff("tavily", &policy(2), || provider.search("q", 3))
            .await
            .unwrap_err();

        assert!(matches!(err, GrantScoutError::Timeout { secs: 2, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let provider = Flaky::new(0);
        let results = search_with_fallback(&provider, "q", 3, &policy(0)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(results.is_array());
    }

    #[test]
    fn jitter_is_bounded_by_base() {
        for _ in 0..50 {
            assert!(jitter(Duration::from_millis(10)) <= Duration::from_millis(10));
        }
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
    }
}
