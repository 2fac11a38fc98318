use async_trait::async_trait;

use crate::pipeline::adapters::{Limit, Map};
use crate::pipeline::fallback::{Fallback, Retry};
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::stage::{Stage, StageResult, Step};
use crate::report::classify::ItemError;

/// Runs `b` on the output of `a`, only when `a` proceeds.
pub struct AndThen<A, B> {
    a: A,
    b: B,
}

impl<A, B> AndThen<A, B> {
    pub fn new(a: A, b: B) -> Self {
        Self { a, b }
    }
}

#[async_trait]
impl<I, A, B> Stage<I> for AndThen<A, B>
where
    I: Send + 'static,
    A: Stage<I>,
    B: Stage<A::Output>,
{
    type Output = B::Output;

    fn stage_name(&self) -> &'static str {
        self.a.stage_name()
    }

    async fn run(&self, input: I) -> StageResult<B::Output> {
        match self.a.run(input).await? {
            Step::Proceed(mid) => self.b.run(mid).await,
            Step::Halt => Ok(Step::Halt),
        }
    }
}

pub trait StageExt<I>: Stage<I> + Sized
where
    I: Send + 'static,
{
    /// Sequential dependent stage: `next` runs only if `self` proceeds.
    fn and_then<B>(self, next: B) -> AndThen<Self, B>
    where
        B: Stage<Self::Output>,
    {
        AndThen::new(self, next)
    }

    fn map<N, F>(self, f: F) -> Map<Self, F>
    where
        N: Send + 'static,
        F: Fn(Self::Output) -> N + Send + Sync,
    {
        Map::new(self, f)
    }

    /// Re-run the stage against the same target while `policy` allows.
    fn with_retry(self, policy: RetryPolicy<ItemError>) -> Retry<Self>
    where
        I: Clone,
    {
        Retry::new(self, policy)
    }

    /// Fall back to `secondary` when this stage fails.
    fn or_fallback<S>(self, stage: &'static str, secondary: S) -> Fallback<Self, S>
    where
        I: Clone,
        S: Stage<I, Output = Self::Output>,
    {
        Fallback::new(stage, self, secondary)
    }

    fn limit(self, max_in_flight: usize) -> Limit<Self> {
        Limit::new(self, max_in_flight)
    }
}

impl<I, S> StageExt<I> for S
where
    I: Send + 'static,
    S: Stage<I>,
{
}
