//! Page sources and exponential-backoff retry.
//!
//! - [`PageSource`]: anything that can return the body of one category page
//! - [`RetryFetch`]: decorator that retries transient failures of any source
//!
//! # Backoff Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=250ms)
//! ```
//!
//! Only errors for which [`FetchError::is_retryable`] holds are retried;
//! a 404 or an unknown category fails on the first attempt.

use super::FetchError;
use crate::config::Category;
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Source of raw page bodies for a category.
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (0-based) of `category`.
    fn fetch_page(
        &self,
        category: &Category,
        page: u32,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Wrapper that adds exponential backoff retry logic to any [`PageSource`].
pub struct RetryFetch<T> {
    /// The underlying source to wrap.
    inner: T,
    /// Retries after the first attempt; `0` disables retrying.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    /// Upper bound for the exponential part of the delay.
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: PageSource,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> PageSource for RetryFetch<T>
where
    T: PageSource,
{
    #[instrument(level = "debug", skip_all, fields(category = %category.id, page = page))]
    async fn fetch_page(&self, category: &Category, page: u32) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch_page(category, page).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if !e.is_retryable() || attempt > self.max_retries {
                        if attempt > 1 {
                            error!(
                                attempt,
                                max = self.max_retries,
                                elapsed_ms_total = total_dt.as_millis(),
                                error = %e,
                                "fetch_page() exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let mut delay = self
                        .base_delay
                        .saturating_mul(1u32 << (attempt - 1).min(16));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "fetch_page() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Fails with `status` for the first `failures` calls, then succeeds.
    struct Flaky {
        failures: usize,
        status: StatusCode,
        calls: AtomicUsize,
    }

    impl PageSource for Flaky {
        async fn fetch_page(&self, category: &Category, page: u32) -> Result<String, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FetchError::Status {
                    category: category.id.clone(),
                    page,
                    status: self.status,
                })
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn category() -> Category {
        Category {
            id: "tech".to_string(),
            url: Url::parse("https://example.test/c/tech").unwrap(),
            pages: 1,
        }
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let flaky = Flaky {
            failures: 2,
            status: StatusCode::BAD_GATEWAY,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(flaky, 3, StdDuration::from_millis(1));
        let body = retry.fetch_page(&category(), 0).await.unwrap();
        assert_eq!(body, "ok");
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let flaky = Flaky {
            failures: 10,
            status: StatusCode::SERVICE_UNAVAILABLE,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(flaky, 1, StdDuration::from_millis(1));
        assert!(retry.fetch_page(&category(), 0).await.is_err());
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let flaky = Flaky {
            failures: 10,
            status: StatusCode::NOT_FOUND,
            calls: AtomicUsize::new(0),
        };
        let retry = RetryFetch::new(flaky, 5, StdDuration::from_millis(1));
        assert!(retry.fetch_page(&category(), 0).await.is_err());
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 1);
    }
}
