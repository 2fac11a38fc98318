//! # migrapipe
//!
//! **Resilient, paginated migration pipelines in Rust.**
//!
//! `migrapipe` walks a large keyed dataset page by page, pushes every item
//! through a chain of remote calls with bounded concurrency, and ends with a
//! classified failure report whose counts reconcile with the input.
//!
//! It is designed for long batch runs against flaky services:
//!
//! - page fetches retried per page, with backoff
//! - one page in memory at a time
//! - a hard cap on outstanding remote calls
//! - every item failure classified, none fatal
//!
//! ---
//!
//! ## Core Model
//!
//! ```text
//! PagedSource → BoundedPipeline(Stage chain) → Run(Classifier + ReportAccumulator)
//! ```
//!
//! A [`Stage`] turns one input into the next stage's input, or halts, or
//! fails with an [`ItemError`]. Stages compose with [`StageExt`]:
//!
//! ```no_run
//! use migrapipe::prelude::*;
//!
//! # async fn demo() -> migrapipe::error::Result<()> {
//! let lookup = stage("lookup", |item: Item<()>| async move {
//!     if item.key().is_empty() {
//!         return Err(ItemError::new("lookup", "empty key").with_status(404));
//!     }
//!     Ok(Step::Proceed(item.key().len()))
//! })
//! .with_retry(RetryPolicy::immediate(1).retry_if(|e: &ItemError| e.has_status(504)));
//!
//! let classifier = Classifier::new()
//!     .rule("lookup", Matcher::Status(404), "not_found")
//!     .stage_default("lookup", "lookup_fail");
//! let report = ReportAccumulator::new(ReportLayout::new());
//! let mut run = Run::new(classifier, report)?;
//!
//! let items = vec![Item::new("a", ()), Item::new("", ())];
//! let pipeline = BoundedPipeline::new(8);
//! run.process_items(&pipeline, items, &lookup.map(|_| ())).await?;
//!
//! let summary = run.finish("reports").await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! ## Pagination
//!
//! [`PagedSource`] hands one page at a time to a [`PageHandler`] and only
//! fetches the next page once the handler returns. Each page gets a fresh
//! retry budget; exhausting it ends the run with the last fetch error.
//!
//! ```no_run
//! use migrapipe::prelude::*;
//! use migrapipe::source::ndjson::NdjsonTable;
//!
//! # async fn demo() -> migrapipe::error::Result<()> {
//! let source = PagedSource::new(NdjsonTable::open("table.ndjson"))
//!     .page_size(512)
//!     .retry(RetryPolicy::new(10));
//!
//! let mut rows = 0usize;
//! let mut pages = source.pages(&(), None);
//! while let Some(page) = pages.next_page().await? {
//!     rows += page.len();
//! }
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! ## Failure Contract
//!
//! - Only fatal conditions surface as [`error::Error`]: exhausted page
//!   retries, report I/O, invalid configuration, cancellation.
//! - Item failures never abort a run. Each lands in exactly one bucket;
//!   unmatched failures go to the stage's default bucket.
//! - `total = successes + skipped + Σ buckets` holds at the end of every run.
//! - Report documents list keys in sorted order, so identical runs produce
//!   identical files.
//!
//! ---
//!
//! ## Observability
//!
//! With the default `tracing` feature the crate emits structured events
//! such as `migrapipe.page.retry`, `migrapipe.page.exhausted`,
//! `migrapipe.item.failed`, `migrapipe.progress`,
//! `migrapipe.stage.fallback` and `migrapipe.report.written`.
//!
//! ---
//!
//! ## Feature Flags
//!
//! - `tracing` *(default)*: structured events.
//! - `ndjson` *(default)*: file-backed paginated table
//!   [`source::ndjson::NdjsonTable`].
//! - `http`: reqwest-backed [`remote::RemoteService`].
//! - `cli`: the `migrapipe` binary.
//!
//! [`Stage`]: pipeline::stage::Stage
//! [`StageExt`]: pipeline::chain::StageExt
//! [`ItemError`]: report::classify::ItemError
//! [`PagedSource`]: source::paged::PagedSource
//! [`PageHandler`]: source::paged::PageHandler

pub mod error;
pub mod item;
pub mod jobs;
pub mod pipeline;
pub mod remote;
pub mod report;
pub mod run;
pub mod source;

pub mod prelude {
    //! Convenient imports for most `migrapipe` users.

    pub use crate::item::{Cursor, Item, Page};
    pub use crate::pipeline::adapters::stage;
    pub use crate::pipeline::bounded::{BoundedPipeline, Outcome, OutcomeSink};
    pub use crate::pipeline::cancel::CancelToken;
    pub use crate::pipeline::chain::StageExt;
    pub use crate::pipeline::config::{PipelineConfig, SkipPolicy};
    pub use crate::pipeline::progress::ProgressThrottle;
    pub use crate::pipeline::retry::RetryPolicy;
    pub use crate::pipeline::stage::{Stage, StageResult, Step};
    pub use crate::report::accumulator::{BucketKind, Document, ReportAccumulator, ReportLayout};
    pub use crate::report::classify::{Bucket, Classifier, ItemError, Matcher};
    pub use crate::report::summary::RunSummary;
    pub use crate::run::{Delivery, Run};
    pub use crate::source::fetch::{PageFetcher, RetryingPageFetcher};
    pub use crate::source::paged::{PageHandler, PagedSource};
}
