//! The migration jobs: each wires a source, a stage chain, a classifier
//! and a report layout into a [`Run`].

mod collect;
mod refresh;
mod rerender;
mod verify;

pub use collect::{collect, CollectMode};
pub use refresh::refresh;
pub use rerender::rerender;
pub use verify::{verify, NOT_FOUND, RENDER_BOTH, RENDER_NEW, RETRIEVE_FAIL};

use std::sync::Arc;

use crate::error::Result;
use crate::item::Item;
use crate::pipeline::bounded::BoundedPipeline;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::stage::{StageResult, Step};
use crate::remote::{Payload, RemoteService, CHECK, RETRIEVE};
use crate::report::accumulator::{ReportAccumulator, ReportLayout};
use crate::report::classify::{Classifier, ItemError};
use crate::run::Run;
use crate::source::fetch::PageFetcher;
use crate::source::paged::PagedSource;

/// Settings and stop signal shared by every job.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    pub config: PipelineConfig,
    pub cancel: CancelToken,
}

impl JobContext {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn run(&self, label: &'static str, classifier: Classifier, layout: ReportLayout) -> Result<Run> {
        let report = ReportAccumulator::new(layout.format(self.config.report_format));
        Ok(Run::new(classifier, report)?
            .throttle(self.config.throttle(label))
            .skip_policy(self.config.skip_policy))
    }

    fn pipeline(&self, concurrency: usize) -> BoundedPipeline {
        BoundedPipeline::new(concurrency).with_cancel(self.cancel.clone())
    }

    fn source<F: PageFetcher>(&self, fetcher: F) -> PagedSource<F> {
        PagedSource::new(fetcher)
            .page_size(self.config.page_size)
            .retry(self.config.page_retry_policy())
            .with_cancel(self.cancel.clone())
    }
}

/// Attach the payload's identity to a failure so the report can show it.
fn describe(error: ItemError, payload: &Payload) -> ItemError {
    error
        .with_field("formula", payload.content.as_str())
        .with_field("type", payload.kind.as_str())
}

async fn retrieve_payload<R>(service: Arc<R>, item: Item<()>) -> StageResult<Item<Payload>>
where
    R: RemoteService + ?Sized,
{
    let payload = service
        .retrieve(item.key())
        .await
        .map_err(|error| error.at_stage(RETRIEVE))?;
    Ok(Step::Proceed(item.map(|_| payload)))
}

/// Check the payload and pass the item on unchanged.
async fn check_payload<R>(service: Arc<R>, item: Item<Payload>) -> StageResult<Item<Payload>>
where
    R: RemoteService + ?Sized,
{
    match service.check(item.payload()).await {
        Ok(_) => Ok(Step::Proceed(item)),
        Err(error) => Err(describe(error.at_stage(CHECK), item.payload())),
    }
}

/// Render the item's own key, labelling failures with `stage`.
async fn render_key<R>(
    service: Arc<R>,
    item: Item<Payload>,
    stage: &'static str,
) -> StageResult<()>
where
    R: RemoteService + ?Sized,
{
    match service.render(item.key()).await {
        Ok(_) => Ok(Step::Proceed(())),
        Err(error) => Err(describe(error.at_stage(stage), item.payload())),
    }
}
