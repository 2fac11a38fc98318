use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;

type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Retry budget plus backoff schedule.
///
/// `retries` counts *extra* attempts: `RetryPolicy::new(10)` allows up to
/// eleven calls. The predicate decides which errors may spend the budget;
/// by default every error may.
pub struct RetryPolicy<E = Error> {
    retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Option<Duration>,
    retry_if: RetryPredicate<E>,
}

impl<E> RetryPolicy<E> {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            jitter: None,
            retry_if: Arc::new(|_| true),
        }
    }

    /// Same budget, no delay between attempts.
    pub fn immediate(retries: u32) -> Self {
        Self::new(retries).base_delay(Duration::ZERO)
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::immediate(0)
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.jitter = Some(max_jitter);
        self
    }

    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn is_retryable(&self, error: &E) -> bool {
        (self.retry_if)(error)
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let exp = attempt.saturating_sub(1);
        let mut delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay = delay.min(self.max_delay);

        if let Some(max_jitter) = self.jitter {
            let jitter = deterministic_jitter(max_jitter, attempt);
            delay = delay.saturating_add(jitter).min(self.max_delay);
        }

        delay
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            retries: self.retries,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter: self.jitter,
            retry_if: self.retry_if.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("jitter", &self.jitter)
            .finish_non_exhaustive()
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self::new(10)
    }
}

fn deterministic_jitter(max_jitter: Duration, attempt: u32) -> Duration {
    let nanos = max_jitter.as_nanos().min(u128::from(u64::MAX)) as u64;
    if nanos == 0 {
        return Duration::ZERO;
    }

    let seed = (attempt as u64)
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    Duration::from_nanos(seed % nanos.saturating_add(1))
}
