use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::item::{Cursor, Item};
use crate::pipeline::adapters::stage;
use crate::pipeline::stage::{StageResult, Step};
use crate::report::accumulator::{ReportAccumulator, ReportLayout};
use crate::report::classify::Classifier;
use crate::report::stream::StreamWriter;
use crate::report::summary::RunSummary;
use crate::run::{Delivery, Run};
use crate::source::fetch::PageFetcher;

use super::JobContext;

/// What `collect` writes for each accepted row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectMode {
    /// `key: <parsed payload>`; rows that do not parse are halted.
    #[default]
    Payload,
    /// `key: 1`, without looking at the payload.
    KeysOnly,
}

/// Dump a paginated table to `output`, one entry per row, as the rows
/// arrive.
pub async fn collect<F>(
    ctx: &JobContext,
    table: F,
    query: &F::Query,
    start: Option<Cursor>,
    output: impl AsRef<Path>,
    mode: CollectMode,
) -> Result<RunSummary>
where
    F: PageFetcher<Row = Item<String>>,
{
    let writer = StreamWriter::create(output, ctx.config.report_format).await?;
    let report = ReportAccumulator::new(ReportLayout::new().format(ctx.config.report_format))
        .with_stream(writer);
    let mut run = Run::new(Classifier::new(), report)?
        .throttle(ctx.config.throttle("collect"))
        .skip_policy(ctx.config.skip_policy);

    let chain = stage("collect", move |item: Item<String>| collect_row(mode, item));

    let source = ctx.source(table);
    let pipeline = ctx.pipeline(ctx.config.concurrency);
    run.drain_pages(&source, query, start, &pipeline, &chain).await?;

    run.finish(&ctx.config.report_dir).await
}

async fn collect_row(mode: CollectMode, item: Item<String>) -> StageResult<Delivery> {
    match mode {
        CollectMode::KeysOnly => Ok(Step::Proceed(Delivery::Stream(Value::from(1)))),
        CollectMode::Payload => match serde_json::from_str::<Value>(item.payload()) {
            Ok(value) => Ok(Step::Proceed(Delivery::Stream(value))),
            Err(_) => Ok(Step::Halt),
        },
    }
}
