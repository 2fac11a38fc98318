use std::future::Future;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::pipeline::stage::{Stage, StageResult};
use crate::report::classify::ItemError;

/// A stage built from an async closure.
pub struct FnStage<F> {
    name: &'static str,
    f: F,
}

impl<F> FnStage<F> {
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

/// Shorthand for [`FnStage::new`].
pub fn stage<F>(name: &'static str, f: F) -> FnStage<F> {
    FnStage::new(name, f)
}

#[async_trait]
impl<I, O, F, Fut> Stage<I> for FnStage<F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = StageResult<O>> + Send + 'static,
{
    type Output = O;

    fn stage_name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, input: I) -> StageResult<O> {
        (self.f)(input).await
    }
}

/// map: S::Output -> N
pub struct Map<S, F> {
    inner: S,
    f: F,
}

impl<S, F> Map<S, F> {
    pub fn new(inner: S, f: F) -> Self {
        Self { inner, f }
    }
}

#[async_trait]
impl<I, N, S, F> Stage<I> for Map<S, F>
where
    I: Send + 'static,
    N: Send + 'static,
    S: Stage<I>,
    F: Fn(S::Output) -> N + Send + Sync,
{
    type Output = N;

    fn stage_name(&self) -> &'static str {
        self.inner.stage_name()
    }

    async fn run(&self, input: I) -> StageResult<N> {
        Ok(self.inner.run(input).await?.map(&self.f))
    }
}

/// Caps how many invocations of the wrapped stage run at once, independent
/// of the pipeline-wide limit.
pub struct Limit<S> {
    inner: S,
    permits: Semaphore,
}

impl<S> Limit<S> {
    pub fn new(inner: S, max_in_flight: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_in_flight.max(1)),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl<I, S> Stage<I> for Limit<S>
where
    I: Send + 'static,
    S: Stage<I>,
{
    type Output = S::Output;

    fn stage_name(&self) -> &'static str {
        self.inner.stage_name()
    }

    async fn run(&self, input: I) -> StageResult<S::Output> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ItemError::new(self.inner.stage_name(), "stage limiter closed"))?;
        self.inner.run(input).await
    }
}
