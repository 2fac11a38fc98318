use async_trait::async_trait;

use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::stage::{Stage, StageResult};
use crate::report::classify::ItemError;

/// Statuses worth a second attempt against the same target.
pub fn not_found_or_busy(error: &ItemError) -> bool {
    matches!(error.status(), Some(404 | 503 | 504))
}

async fn run_with_retry<I, S>(
    stage: &S,
    input: I,
    policy: &RetryPolicy<ItemError>,
) -> StageResult<S::Output>
where
    I: Clone + Send + 'static,
    S: Stage<I>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1u32;

    loop {
        let error = match stage.run(input.clone()).await {
            Ok(step) => return Ok(step),
            Err(error) => error,
        };

        let retryable = policy.is_retryable(&error);
        if !retryable || attempt >= max_attempts {
            return Err(error);
        }

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "migrapipe.stage.retry",
            stage = stage.stage_name(),
            attempt = attempt,
            max_attempts = max_attempts,
            error = %error,
            "migrapipe.stage.retry"
        );

        let delay = policy.backoff_delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}

/// Retries the wrapped stage on the same input while the policy allows.
/// The last error is returned unchanged.
pub struct Retry<S> {
    inner: S,
    policy: RetryPolicy<ItemError>,
}

impl<S> Retry<S> {
    pub fn new(inner: S, policy: RetryPolicy<ItemError>) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<I, S> Stage<I> for Retry<S>
where
    I: Clone + Send + 'static,
    S: Stage<I>,
{
    type Output = S::Output;

    fn stage_name(&self) -> &'static str {
        self.inner.stage_name()
    }

    async fn run(&self, input: I) -> StageResult<S::Output> {
        run_with_retry(&self.inner, input, &self.policy).await
    }
}

/// Primary target with a secondary to fall back on.
///
/// Each target gets the retry policy (by default: one more try on
/// 404/503/504). When both fail, the primary's error is reported under this
/// stage's label. When only the secondary succeeds, the item succeeds,
/// unless [`Fallback::record_rescue`] names a stage to report the primary's
/// error under instead.
pub struct Fallback<P, S> {
    stage: &'static str,
    primary: P,
    secondary: S,
    policy: RetryPolicy<ItemError>,
    rescued_stage: Option<&'static str>,
}

impl<P, S> Fallback<P, S> {
    pub fn new(stage: &'static str, primary: P, secondary: S) -> Self {
        Self {
            stage,
            primary,
            secondary,
            policy: RetryPolicy::immediate(1).retry_if(not_found_or_busy),
            rescued_stage: None,
        }
    }

    pub fn retry(mut self, policy: RetryPolicy<ItemError>) -> Self {
        self.policy = policy;
        self
    }

    /// Report secondary-only successes as failures of `stage`.
    pub fn record_rescue(mut self, stage: &'static str) -> Self {
        self.rescued_stage = Some(stage);
        self
    }
}

#[async_trait]
impl<I, P, S> Stage<I> for Fallback<P, S>
where
    I: Clone + Send + 'static,
    P: Stage<I>,
    S: Stage<I, Output = P::Output>,
{
    type Output = P::Output;

    fn stage_name(&self) -> &'static str {
        self.stage
    }

    async fn run(&self, input: I) -> StageResult<P::Output> {
        let primary_error = match run_with_retry(&self.primary, input.clone(), &self.policy).await {
            Ok(step) => return Ok(step),
            Err(error) => error,
        };

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "migrapipe.stage.fallback",
            stage = self.stage,
            error = %primary_error,
            "migrapipe.stage.fallback"
        );

        match run_with_retry(&self.secondary, input, &self.policy).await {
            Ok(step) => match self.rescued_stage {
                Some(rescued) => Err(primary_error.at_stage(rescued)),
                None => Ok(step),
            },
            Err(secondary_error) => Err(primary_error
                .at_stage(self.stage)
                .with_field("fallback_error", secondary_error.detail())),
        }
    }
}
