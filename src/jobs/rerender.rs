use std::sync::Arc;

use crate::error::Result;
use crate::item::{Cursor, Item};
use crate::pipeline::adapters::stage;
use crate::pipeline::chain::StageExt;
use crate::pipeline::stage::{StageResult, Step};
use crate::remote::{Payload, RemoteService, CHECK, RENDER};
use crate::report::accumulator::{BucketKind, Document, ReportLayout};
use crate::report::classify::{Bucket, Classifier, ItemError};
use crate::report::summary::RunSummary;
use crate::source::fetch::PageFetcher;

use super::{describe, JobContext};

const PARSE: &str = "parse";

/// Re-submit every stored payload of a paginated table, then render the
/// resource the check names.
///
/// Rows whose value is not a payload are halted and never reach the
/// service.
pub async fn rerender<F, R>(
    ctx: &JobContext,
    table: F,
    query: &F::Query,
    start: Option<Cursor>,
    service: Arc<R>,
) -> Result<RunSummary>
where
    F: PageFetcher<Row = Item<String>>,
    R: RemoteService + ?Sized + 'static,
{
    let classifier = Classifier::new();
    let layout = ReportLayout::new().document(
        Document::new("rerender")
            .bucket(Bucket::generic_for(CHECK), BucketKind::Detailed)
            .bucket(Bucket::generic_for(RENDER), BucketKind::Detailed),
    );
    let mut run = ctx.run("rerender", classifier, layout)?;

    let check_service = service.clone();
    let chain = stage(PARSE, parse_row)
        .and_then(stage(CHECK, move |item: Item<Payload>| {
            check_resource(check_service.clone(), item)
        }))
        .and_then(stage(RENDER, move |target: RenderTarget| {
            render_resource(service.clone(), target)
        }));

    let source = ctx.source(table);
    let pipeline = ctx.pipeline(ctx.config.concurrency);
    run.drain_pages(&source, query, start, &pipeline, &chain).await?;

    run.finish(&ctx.config.report_dir).await
}

struct RenderTarget {
    resource: String,
    payload: Payload,
}

async fn parse_row(item: Item<String>) -> StageResult<Item<Payload>> {
    match serde_json::from_str::<Payload>(item.payload()) {
        Ok(payload) => Ok(Step::Proceed(item.map(|_| payload))),
        Err(_err) => {
            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::WARN,
                event = "migrapipe.item.unparseable",
                key = item.key(),
                error = %_err,
                "migrapipe.item.unparseable"
            );
            Ok(Step::Halt)
        }
    }
}

async fn check_resource<R>(service: Arc<R>, item: Item<Payload>) -> StageResult<RenderTarget>
where
    R: RemoteService + ?Sized,
{
    let verdict = match service.check(item.payload()).await {
        Ok(verdict) => verdict,
        Err(error) => return Err(describe(error.at_stage(CHECK), item.payload())),
    };
    let (key, payload) = item.into_parts();
    let Some(resource) = verdict.resource else {
        return Err(describe(
            ItemError::new(CHECK, format!("check for {key} named no resource")),
            &payload,
        ));
    };
    Ok(Step::Proceed(RenderTarget { resource, payload }))
}

async fn render_resource<R>(service: Arc<R>, target: RenderTarget) -> StageResult<()>
where
    R: RemoteService + ?Sized,
{
    match service.render(&target.resource).await {
        Ok(_) => Ok(Step::Proceed(())),
        Err(error) => Err(describe(error.at_stage(RENDER), &target.payload)
            .with_field("resource", target.resource)),
    }
}
