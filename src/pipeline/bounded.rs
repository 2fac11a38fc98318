use std::pin::pin;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::{Error, Result};
use crate::item::Item;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::stage::{Stage, StageResult, Step};
use crate::report::classify::ItemError;

const DEFAULT_CONCURRENCY: usize = 32;

/// Terminal result for one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<O> {
    Success(O),
    /// A stage halted the item without failing.
    Skipped,
    Failed(ItemError),
}

impl<O> From<StageResult<O>> for Outcome<O> {
    fn from(result: StageResult<O>) -> Self {
        match result {
            Ok(Step::Proceed(value)) => Outcome::Success(value),
            Ok(Step::Halt) => Outcome::Skipped,
            Err(error) => Outcome::Failed(error),
        }
    }
}

/// Receives each item's outcome as it completes.
///
/// An `Err` here is an infrastructure failure (e.g. the output file cannot
/// be written) and aborts the pipeline.
#[async_trait]
pub trait OutcomeSink<O: Send + 'static>: Send {
    async fn accept(&mut self, key: String, outcome: Outcome<O>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl PipelineStats {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.skipped + self.failed
    }

    fn observe<O>(&mut self, outcome: &Outcome<O>) {
        match outcome {
            Outcome::Success(_) => self.succeeded += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Runs a stage over a sequence of items with at most `concurrency`
/// invocations outstanding.
///
/// Everything is driven from the calling task: stage futures interleave at
/// their await points and outcomes reach the sink one at a time, so the
/// sink needs no locking. Completion order is not input order.
#[derive(Debug, Clone)]
pub struct BoundedPipeline {
    concurrency: usize,
    cancel: CancelToken,
}

impl BoundedPipeline {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel: CancelToken::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Submit every item exactly once and wait for all of them.
    ///
    /// Item failures are handed to the sink; only a sink error or
    /// cancellation makes this return `Err`.
    pub async fn process<P, S, K, It>(
        &self,
        items: It,
        stage: &S,
        sink: &mut K,
    ) -> Result<PipelineStats>
    where
        It: IntoIterator<Item = Item<P>>,
        It::IntoIter: Send,
        P: Send + 'static,
        S: Stage<Item<P>>,
        K: OutcomeSink<S::Output>,
    {
        let mut stats = PipelineStats::default();
        let mut in_flight = pin!(stream::iter(items)
            .map(|item| {
                let key = item.key().to_owned();
                async move { (key, stage.run(item).await) }
            })
            .buffer_unordered(self.concurrency));

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::DEBUG,
                        event = "migrapipe.cancelled",
                        stage = stage.stage_name(),
                        completed = stats.completed(),
                        "migrapipe.cancelled"
                    );
                    return Err(Error::Cancelled);
                }
                next = in_flight.next() => next,
            };
            let Some((key, result)) = next else { break };

            let outcome = Outcome::from(result);
            stats.observe(&outcome);
            sink.accept(key, outcome).await?;
        }

        Ok(stats)
    }
}

impl Default for BoundedPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}
