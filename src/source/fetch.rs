use std::num::NonZeroUsize;

use async_trait::async_trait;

use crate::error::Result;
use crate::item::{Cursor, Page};
use crate::pipeline::retry::RetryPolicy;

/// A cursor-paginated data source, presented as an already-connected handle.
///
/// Fetching the same cursor twice must return the same page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Query: Send + Sync;
    type Row: Send + 'static;

    async fn fetch_page(
        &self,
        query: &Self::Query,
        cursor: Option<&Cursor>,
        page_size: NonZeroUsize,
    ) -> Result<Page<Self::Row>>;
}

/// Fetches one page, re-asking for the same cursor on failure.
pub struct RetryingPageFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: PageFetcher> RetryingPageFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Fetch the page at `cursor`, spending one of `retries_remaining` on
    /// each transient failure. Once the budget is gone, or the error is not
    /// transient or the policy refuses it, the last error is returned as-is.
    pub async fn fetch(
        &self,
        query: &F::Query,
        cursor: Option<&Cursor>,
        page_size: NonZeroUsize,
        mut retries_remaining: u32,
    ) -> Result<Page<F::Row>> {
        let mut attempt = 1u32;

        loop {
            let error = match self.inner.fetch_page(query, cursor, page_size).await {
                Ok(page) => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::TRACE,
                        event = "migrapipe.page.fetched",
                        rows = page.len(),
                        last = page.is_last(),
                        attempt = attempt,
                        "migrapipe.page.fetched"
                    );
                    return Ok(page);
                }
                Err(error) => error,
            };

            let retryable = error.is_transient() && self.policy.is_retryable(&error);
            if retries_remaining == 0 || !retryable {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::ERROR,
                    event = "migrapipe.page.exhausted",
                    attempts = attempt,
                    error = %error,
                    "migrapipe.page.exhausted"
                );
                return Err(error);
            }
            retries_remaining -= 1;

            let delay = self.policy.backoff_delay(attempt);

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::WARN,
                event = "migrapipe.page.retry",
                attempt = attempt,
                retries_remaining = retries_remaining,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "migrapipe.page.retry"
            );

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }
}
