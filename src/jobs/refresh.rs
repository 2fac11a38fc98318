use std::sync::Arc;

use crate::error::Result;
use crate::item::Item;
use crate::pipeline::adapters::stage;
use crate::pipeline::chain::StageExt;
use crate::remote::{Payload, RemoteService, CHECK, RENDER, RETRIEVE};
use crate::report::accumulator::{BucketKind, Document, ReportLayout};
use crate::report::classify::{Bucket, Classifier};
use crate::report::summary::RunSummary;
use crate::source::keys::key_items;

use super::{check_payload, render_key, retrieve_payload, JobContext};

/// Push every key through retrieve, check and render on one service so
/// that its stored renderings are regenerated.
///
/// `keys` are processed in the order given; use
/// [`parse_yaml_keys`](crate::source::keys::parse_yaml_keys) to start from
/// a given key.
pub async fn refresh<R>(ctx: &JobContext, keys: Vec<String>, service: Arc<R>) -> Result<RunSummary>
where
    R: RemoteService + ?Sized + 'static,
{
    let layout = ReportLayout::new().document(
        Document::new("refresh")
            .bucket(Bucket::generic_for(RETRIEVE), BucketKind::Detailed)
            .bucket(Bucket::generic_for(CHECK), BucketKind::Detailed)
            .bucket(Bucket::generic_for(RENDER), BucketKind::Detailed),
    );
    let mut run = ctx.run("refresh", Classifier::new(), layout)?;

    let retrieve_from = service.clone();
    let check_on = service.clone();
    let chain = stage(RETRIEVE, move |item: Item<()>| {
        retrieve_payload(retrieve_from.clone(), item)
    })
    .and_then(stage(CHECK, move |item: Item<Payload>| {
        check_payload(check_on.clone(), item)
    }))
    .and_then(stage(RENDER, move |item: Item<Payload>| {
        render_key(service.clone(), item, RENDER)
    }));

    let pipeline = ctx.pipeline(ctx.config.concurrency);
    run.process_items(&pipeline, key_items(keys), &chain).await?;

    run.finish(&ctx.config.report_dir).await
}
