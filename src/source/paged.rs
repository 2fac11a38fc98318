use std::future::Future;
use std::num::NonZeroUsize;

use async_trait::async_trait;

use crate::error::Result;
use crate::item::{Cursor, Page};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::retry::RetryPolicy;
use crate::source::fetch::{PageFetcher, RetryingPageFetcher};

const DEFAULT_PAGE_SIZE: usize = 512;

/// Consumes one page of rows at a time.
///
/// The next page is not fetched until `handle` returns; an `Err` stops the
/// walk without fetching anything further.
#[async_trait]
pub trait PageHandler<R: Send + 'static>: Send {
    async fn handle(&mut self, rows: Vec<R>) -> Result<()>;
}

/// A [`PageHandler`] from an async closure.
pub struct HandlerFn<F>(F);

pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn(f)
}

#[async_trait]
impl<R, F, Fut> PageHandler<R> for HandlerFn<F>
where
    R: Send + 'static,
    F: FnMut(Vec<R>) -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&mut self, rows: Vec<R>) -> Result<()> {
        (self.0)(rows).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub pages: u64,
    pub rows: u64,
    /// Cursor following the last handled page; `None` once the source is
    /// exhausted. Pass it back as the start cursor to resume.
    pub resume_from: Option<Cursor>,
}

/// Walks a cursor chain one page at a time.
pub struct PagedSource<F> {
    fetcher: RetryingPageFetcher<F>,
    page_size: NonZeroUsize,
    cancel: CancelToken,
}

impl<F: PageFetcher> PagedSource<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: RetryingPageFetcher::new(fetcher, RetryPolicy::default()),
            page_size: NonZeroUsize::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroUsize::MIN),
            cancel: CancelToken::default(),
        }
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = NonZeroUsize::new(page_size).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Per-page retry policy; the budget is restored before every page.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.fetcher = self.fetcher.with_policy(policy);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn fetcher(&self) -> &F {
        self.fetcher.inner()
    }

    /// Lazy, forward-only sequence of pages starting at `start`.
    pub fn pages<'a>(&'a self, query: &'a F::Query, start: Option<Cursor>) -> Pages<'a, F> {
        Pages {
            source: self,
            query,
            state: PagesState::At(start),
        }
    }

    /// Hand every page to `handler`, in order, one at a time.
    pub async fn run<H>(
        &self,
        query: &F::Query,
        start: Option<Cursor>,
        handler: &mut H,
    ) -> Result<SourceStats>
    where
        H: PageHandler<F::Row>,
    {
        let mut pages = self.pages(query, start);
        let mut stats = SourceStats::default();

        while let Some(page) = pages.next_page().await? {
            let (rows, next) = page.into_parts();
            stats.pages += 1;
            stats.rows += rows.len() as u64;

            handler.handle(rows).await?;
            stats.resume_from = next;

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::DEBUG,
                event = "migrapipe.page.handled",
                pages = stats.pages,
                rows = stats.rows,
                "migrapipe.page.handled"
            );
        }

        Ok(stats)
    }
}

enum PagesState {
    At(Option<Cursor>),
    Done,
}

/// See [`PagedSource::pages`]. Not restartable: after the last page or an
/// error, `next_page` returns `Ok(None)`.
pub struct Pages<'a, F: PageFetcher> {
    source: &'a PagedSource<F>,
    query: &'a F::Query,
    state: PagesState,
}

impl<F: PageFetcher> Pages<'_, F> {
    pub async fn next_page(&mut self) -> Result<Option<Page<F::Row>>> {
        let cursor = match std::mem::replace(&mut self.state, PagesState::Done) {
            PagesState::At(cursor) => cursor,
            PagesState::Done => return Ok(None),
        };

        let source = self.source;
        let retries = source.fetcher.policy().retries();
        let page = source
            .cancel
            .guard(
                source
                    .fetcher
                    .fetch(self.query, cursor.as_ref(), source.page_size, retries),
            )
            .await?;

        if let Some(next) = page.next_cursor() {
            self.state = PagesState::At(Some(next.clone()));
        }
        Ok(Some(page))
    }
}
