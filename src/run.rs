//! Wires a pipeline to its report.
//!
//! A [`Run`] owns the classifier, the accumulator and the progress
//! throttle, and is handed to [`BoundedPipeline::process`] as the outcome
//! sink. Nothing here is global; a job builds one `Run`, drives it, and
//! calls [`Run::finish`].

use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::item::{Cursor, Item};
use crate::pipeline::bounded::{BoundedPipeline, Outcome, OutcomeSink, PipelineStats};
use crate::pipeline::config::SkipPolicy;
use crate::pipeline::progress::ProgressThrottle;
use crate::pipeline::stage::Stage;
use crate::report::accumulator::ReportAccumulator;
use crate::report::classify::Classifier;
use crate::report::summary::RunSummary;
use crate::source::fetch::PageFetcher;
use crate::source::paged::{PageHandler, PagedSource, SourceStats};

/// What a successful item leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Counted as a success, nothing kept.
    Done,
    /// Written to the streaming output under the item's key.
    Stream(Value),
}

impl From<()> for Delivery {
    fn from(_: ()) -> Self {
        Delivery::Done
    }
}

pub struct Run {
    classifier: Classifier,
    report: ReportAccumulator,
    throttle: ProgressThrottle,
    skip_policy: SkipPolicy,
    processed: u64,
    dropped: u64,
}

impl Run {
    pub fn new(classifier: Classifier, report: ReportAccumulator) -> Result<Self> {
        classifier.validate()?;
        Ok(Self {
            classifier,
            report,
            throttle: ProgressThrottle::default(),
            skip_policy: SkipPolicy::default(),
            processed: 0,
            dropped: 0,
        })
    }

    pub fn throttle(mut self, throttle: ProgressThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn skip_policy(mut self, policy: SkipPolicy) -> Self {
        self.skip_policy = policy;
        self
    }

    pub fn report(&self) -> &ReportAccumulator {
        &self.report
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Items that reached a terminal outcome, dropped skips included.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Final counts. `total` is every item that reached an outcome, minus
    /// skips the policy drops; the buckets hold one entry per key, so a key
    /// repeated in the input shows up as a mismatch.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.processed - self.dropped,
            ..self.report.summary()
        }
    }

    /// Run `stage` over a flat list of items.
    pub async fn process_items<P, S, It>(
        &mut self,
        pipeline: &BoundedPipeline,
        items: It,
        stage: &S,
    ) -> Result<PipelineStats>
    where
        It: IntoIterator<Item = Item<P>>,
        It::IntoIter: Send,
        P: Send + 'static,
        S: Stage<Item<P>>,
        S::Output: Into<Delivery>,
    {
        pipeline.process(items, stage, self).await
    }

    /// Walk every page of `source`, running `stage` over each page's rows
    /// before the next page is fetched.
    pub async fn drain_pages<F, P, S>(
        &mut self,
        source: &PagedSource<F>,
        query: &F::Query,
        start: Option<Cursor>,
        pipeline: &BoundedPipeline,
        stage: &S,
    ) -> Result<SourceStats>
    where
        F: PageFetcher<Row = Item<P>>,
        P: Send + 'static,
        S: Stage<Item<P>>,
        S::Output: Into<Delivery>,
    {
        let mut handler = PipelineHandler::new(pipeline, stage, self);
        source.run(query, start, &mut handler).await
    }

    /// Write the report documents into `dir` and return the final counts.
    pub async fn finish(mut self, dir: impl AsRef<Path>) -> Result<RunSummary> {
        self.report.flush(dir).await?;
        let summary = self.summary();

        #[cfg(feature = "tracing")]
        if !summary.reconciles() {
            tracing::event!(
                tracing::Level::WARN,
                event = "migrapipe.summary.mismatch",
                total = summary.total,
                successes = summary.successes,
                skipped = summary.skipped,
                failures = summary.failures(),
                "migrapipe.summary.mismatch"
            );
        }

        Ok(summary)
    }
}

#[async_trait]
impl<O> OutcomeSink<O> for Run
where
    O: Into<Delivery> + Send + 'static,
{
    async fn accept(&mut self, key: String, outcome: Outcome<O>) -> Result<()> {
        match outcome {
            Outcome::Success(value) => match value.into() {
                Delivery::Done => self.report.success(),
                Delivery::Stream(value) => self.report.stream_accept(&key, &value).await?,
            },
            Outcome::Skipped => {
                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::DEBUG,
                    event = "migrapipe.item.skipped",
                    key = %key,
                    "migrapipe.item.skipped"
                );
                match self.skip_policy {
                    SkipPolicy::Record => self.report.skip(),
                    SkipPolicy::Drop => self.dropped += 1,
                }
            }
            Outcome::Failed(error) => {
                let bucket = self.classifier.classify(&error);

                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::WARN,
                    event = "migrapipe.item.failed",
                    key = %key,
                    stage = error.stage(),
                    status = error.status(),
                    bucket = %bucket,
                    error = error.detail(),
                    "migrapipe.item.failed"
                );

                self.report.record_failure(bucket, key, &error);
            }
        }

        self.processed += 1;
        self.throttle.tick(self.processed).await;
        Ok(())
    }
}

/// Page handler that runs every page through a [`BoundedPipeline`].
pub struct PipelineHandler<'a, S, P> {
    pipeline: &'a BoundedPipeline,
    stage: &'a S,
    run: &'a mut Run,
    _payload: PhantomData<fn() -> P>,
}

impl<'a, S, P> PipelineHandler<'a, S, P> {
    pub fn new(pipeline: &'a BoundedPipeline, stage: &'a S, run: &'a mut Run) -> Self {
        Self {
            pipeline,
            stage,
            run,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<S, P> PageHandler<Item<P>> for PipelineHandler<'_, S, P>
where
    P: Send + 'static,
    S: Stage<Item<P>>,
    S::Output: Into<Delivery>,
{
    async fn handle(&mut self, rows: Vec<Item<P>>) -> Result<()> {
        self.pipeline.process(rows, self.stage, &mut *self.run).await?;
        Ok(())
    }
}
