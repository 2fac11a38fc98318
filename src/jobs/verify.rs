use std::sync::Arc;

use crate::error::Result;
use crate::item::Item;
use crate::pipeline::adapters::stage;
use crate::pipeline::chain::StageExt;
use crate::pipeline::retry::RetryPolicy;
use crate::remote::{Payload, RemoteService, CHECK, RETRIEVE};
use crate::report::accumulator::{BucketKind, Document, ReportLayout};
use crate::report::classify::{Classifier, ItemError, Matcher};
use crate::report::summary::RunSummary;
use crate::source::keys::key_items;

use super::{check_payload, render_key, retrieve_payload, JobContext};

pub const NOT_FOUND: &str = "not_found";
pub const RETRIEVE_FAIL: &str = "retrieve_fail";
/// The new service failed to render but the old one could.
pub const RENDER_NEW: &str = "render_new";
/// Neither service could render.
pub const RENDER_BOTH: &str = "render_both";

const RETRIEVE_CONCURRENCY: usize = 64;
const CHECK_CONCURRENCY: usize = 24;

/// Replay every key from the old service onto the new one: retrieve the
/// stored payload from `old`, check it on `new`, then render on `new`,
/// falling back to `old`.
pub async fn verify<O, N>(
    ctx: &JobContext,
    keys: Vec<String>,
    old: Arc<O>,
    new: Arc<N>,
) -> Result<RunSummary>
where
    O: RemoteService + ?Sized + 'static,
    N: RemoteService + ?Sized + 'static,
{
    let classifier = Classifier::new()
        .rule(RETRIEVE, Matcher::Status(404), NOT_FOUND)
        .stage_default(RETRIEVE, RETRIEVE_FAIL)
        .stage_default(CHECK, CHECK)
        .stage_default(RENDER_NEW, RENDER_NEW)
        .stage_default(RENDER_BOTH, RENDER_BOTH);
    let layout = ReportLayout::new()
        .document(
            Document::new("retrieve")
                .bucket(NOT_FOUND, BucketKind::KeysOnly)
                .bucket(RETRIEVE_FAIL, BucketKind::Detailed),
        )
        .document(Document::new("check").bucket(CHECK, BucketKind::Detailed))
        .document(Document::new(RENDER_NEW).bucket(RENDER_NEW, BucketKind::Detailed))
        .document(Document::new(RENDER_BOTH).bucket(RENDER_BOTH, BucketKind::Detailed));
    let mut run = ctx.run("verify", classifier, layout)?;

    let retrieve_from = old.clone();
    let retrieve = stage(RETRIEVE, move |item: Item<()>| {
        retrieve_payload(retrieve_from.clone(), item)
    })
    .with_retry(RetryPolicy::immediate(1).retry_if(|e: &ItemError| e.has_status(504)));

    let check_on = new.clone();
    let check = stage(CHECK, move |item: Item<Payload>| {
        check_payload(check_on.clone(), item)
    });

    let render = stage("render_on_new", move |item: Item<Payload>| {
        render_key(new.clone(), item, RENDER_NEW)
    })
    .or_fallback(
        RENDER_BOTH,
        stage("render_on_old", move |item: Item<Payload>| {
            render_key(old.clone(), item, RENDER_BOTH)
        }),
    )
    .record_rescue(RENDER_NEW);

    let check_cap = ctx.config.concurrency_for(CHECK, CHECK_CONCURRENCY);
    let chain = retrieve.and_then(check.and_then(render).limit(check_cap));

    let pipeline = ctx.pipeline(ctx.config.concurrency_for(RETRIEVE, RETRIEVE_CONCURRENCY));
    run.process_items(&pipeline, key_items(keys), &chain).await?;

    run.finish(&ctx.config.report_dir).await
}
