#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use migrapipe::error::{Error, Result};
use migrapipe::item::{Cursor, Item, Page};
use migrapipe::pipeline::bounded::{Outcome, OutcomeSink};
use migrapipe::remote::{Artifact, Payload, RemoteService, Verdict, CHECK, RENDER, RETRIEVE};
use migrapipe::report::classify::ItemError;
use migrapipe::source::fetch::PageFetcher;
use migrapipe::source::paged::PageHandler;

/// Shared, ordered log of what happened, e.g. `fetch:0`, `handled:0`.
pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(events: &Events) -> Vec<String> {
    events.lock().expect("mutex poisoned").clone()
}

fn page_index(cursor: Option<&Cursor>) -> usize {
    cursor
        .map(|c| u64::from_be_bytes(c.as_bytes().try_into().expect("8-byte cursor")) as usize)
        .unwrap_or(0)
}

/// In-memory paginated table; the cursor is the next page's index.
pub struct VecFetcher<R> {
    pages: Vec<Vec<R>>,
    failures: Mutex<HashMap<usize, u32>>,
    calls: AtomicUsize,
    events: Events,
}

impl<R> VecFetcher<R> {
    pub fn new(pages: Vec<Vec<R>>) -> Self {
        Self {
            pages,
            failures: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            events: events(),
        }
    }

    /// Fail the first `times` fetches of page `page`.
    pub fn fail_page(self, page: usize, times: u32) -> Self {
        self.failures
            .lock()
            .expect("mutex poisoned")
            .insert(page, times);
        self
    }

    pub fn with_events(mut self, events: Events) -> Self {
        self.events = events;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn keyed_pages(pages: &[&[&str]]) -> Vec<Vec<Item<String>>> {
    pages
        .iter()
        .map(|page| {
            page.iter()
                .map(|key| Item::new(*key, format!("payload-{key}")))
                .collect()
        })
        .collect()
}

#[async_trait]
impl<R> PageFetcher for VecFetcher<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Query = ();
    type Row = R;

    async fn fetch_page(
        &self,
        _query: &(),
        cursor: Option<&Cursor>,
        _page_size: NonZeroUsize,
    ) -> Result<Page<R>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = page_index(cursor);
        self.events
            .lock()
            .expect("mutex poisoned")
            .push(format!("fetch:{index}"));

        {
            let mut failures = self.failures.lock().expect("mutex poisoned");
            if let Some(left) = failures.get_mut(&index) {
                if *left > 0 {
                    *left -= 1;
                    return Err(Error::fetch(format!("page {index} unavailable")));
                }
            }
        }

        let rows = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.pages.len()).then(|| Cursor::from((index + 1) as u64));
        Ok(Page::new(rows, next))
    }
}

/// Page handler that logs the keys it receives and yields once per page,
/// so an eager next fetch would show up in the event log.
pub struct RecordingHandler {
    pub keys: Vec<String>,
    pub calls: usize,
    events: Events,
    fail_on_call: Option<usize>,
}

impl RecordingHandler {
    pub fn new(events: Events) -> Self {
        Self {
            keys: Vec::new(),
            calls: 0,
            events,
            fail_on_call: None,
        }
    }

    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }
}

#[async_trait]
impl PageHandler<Item<String>> for RecordingHandler {
    async fn handle(&mut self, rows: Vec<Item<String>>) -> Result<()> {
        let call = self.calls;
        self.calls += 1;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        if self.fail_on_call == Some(call) {
            return Err(Error::pipeline("handler refused page"));
        }
        self.keys.extend(rows.iter().map(|row| row.key().to_owned()));
        self.events
            .lock()
            .expect("mutex poisoned")
            .push(format!("handled:{call}"));
        Ok(())
    }
}

/// Outcome sink keeping everything it is given.
pub struct CollectSink<O> {
    pub outcomes: Vec<(String, Outcome<O>)>,
}

impl<O> CollectSink<O> {
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }

    pub fn keys(&self) -> HashSet<String> {
        self.outcomes.iter().map(|(key, _)| key.clone()).collect()
    }
}

#[async_trait]
impl<O: Send + 'static> OutcomeSink<O> for CollectSink<O> {
    async fn accept(&mut self, key: String, outcome: Outcome<O>) -> Result<()> {
        self.outcomes.push((key, outcome));
        Ok(())
    }
}

/// Current and peak number of concurrent holders.
#[derive(Clone, Default)]
pub struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Gauge {
    pub fn enter(&self) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self.current.clone())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

pub struct GaugeGuard(Arc<AtomicUsize>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted remote service.
///
/// Each operation fails for the configured keys with the configured status,
/// `times` times (`u32::MAX` for always), and succeeds otherwise. Checks are
/// keyed by payload content.
#[derive(Default)]
pub struct FakeService {
    payloads: HashMap<String, Payload>,
    retrieve_fail: Mutex<HashMap<String, (u16, u32)>>,
    check_fail: Mutex<HashMap<String, (u16, u32)>>,
    render_fail: Mutex<HashMap<String, (u16, u32)>>,
    unnamed_checks: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(mut self, key: &str, kind: &str, content: &str) -> Self {
        self.payloads
            .insert(key.to_owned(), Payload::new(kind, content));
        self
    }

    pub fn fail_retrieve(self, key: &str, status: u16, times: u32) -> Self {
        insert(&self.retrieve_fail, key, status, times);
        self
    }

    pub fn fail_check(self, content: &str, status: u16, times: u32) -> Self {
        insert(&self.check_fail, content, status, times);
        self
    }

    pub fn fail_render(self, key: &str, status: u16, times: u32) -> Self {
        insert(&self.render_fail, key, status, times);
        self
    }

    /// Accept checks without naming the stored resource.
    pub fn unnamed_checks(mut self) -> Self {
        self.unnamed_checks = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("mutex poisoned").clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn log(&self, call: String) {
        self.calls.lock().expect("mutex poisoned").push(call);
    }
}

fn insert(map: &Mutex<HashMap<String, (u16, u32)>>, key: &str, status: u16, times: u32) {
    map.lock()
        .expect("mutex poisoned")
        .insert(key.to_owned(), (status, times));
}

fn scripted_failure(
    map: &Mutex<HashMap<String, (u16, u32)>>,
    key: &str,
    stage: &'static str,
) -> std::result::Result<(), ItemError> {
    let mut map = map.lock().expect("mutex poisoned");
    match map.get_mut(key) {
        Some((status, left)) if *left > 0 => {
            if *left != u32::MAX {
                *left -= 1;
            }
            Err(ItemError::new(stage, format!("{stage} failed for {key}")).with_status(*status))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl RemoteService for FakeService {
    async fn check(&self, payload: &Payload) -> std::result::Result<Verdict, ItemError> {
        self.log(format!("check:{}", payload.content));
        tokio::task::yield_now().await;
        scripted_failure(&self.check_fail, &payload.content, CHECK)?;
        let resource = (!self.unnamed_checks).then(|| format!("res-{}", payload.content));
        Ok(Verdict { resource })
    }

    async fn render(&self, resource: &str) -> std::result::Result<Artifact, ItemError> {
        self.log(format!("render:{resource}"));
        tokio::task::yield_now().await;
        scripted_failure(&self.render_fail, resource, RENDER)?;
        Ok(Artifact {
            content_type: Some("image/svg+xml".to_owned()),
            body: Bytes::from_static(b"<svg/>"),
        })
    }

    async fn retrieve(&self, key: &str) -> std::result::Result<Payload, ItemError> {
        self.log(format!("retrieve:{key}"));
        tokio::task::yield_now().await;
        scripted_failure(&self.retrieve_fail, key, RETRIEVE)?;
        self.payloads
            .get(key)
            .cloned()
            .ok_or_else(|| ItemError::new(RETRIEVE, format!("no formula {key}")).with_status(404))
    }
}
