use tokio::time::Instant;

const DEFAULT_REPORT_EVERY: u64 = 10_000;

/// Emits a progress line each time the processed count crosses a multiple
/// of `report_every`, and yields to the scheduler at that point (and, if
/// configured, every `yield_every` items).
#[derive(Debug)]
#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub struct ProgressThrottle {
    label: &'static str,
    report_every: u64,
    yield_every: Option<u64>,
    last_mark: u64,
    last_report: Instant,
    reports: u64,
}

impl ProgressThrottle {
    pub fn new(report_every: u64) -> Self {
        Self {
            label: "items",
            report_every: report_every.max(1),
            yield_every: None,
            last_mark: 0,
            last_report: Instant::now(),
            reports: 0,
        }
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn yield_every(mut self, n: u64) -> Self {
        self.yield_every = (n > 0).then_some(n);
        self
    }

    /// Number of progress lines emitted so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// Returns `true` when a progress line was emitted.
    ///
    /// Counts may jump by more than one (a whole page at a time); one line
    /// is emitted per crossing.
    pub async fn tick(&mut self, count_so_far: u64) -> bool {
        let mark = count_so_far / self.report_every;
        if mark != self.last_mark {
            self.last_mark = mark;
            self.reports += 1;

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::INFO,
                event = "migrapipe.progress",
                label = self.label,
                count = count_so_far,
                elapsed_ms = self.last_report.elapsed().as_millis() as u64,
                "migrapipe.progress"
            );

            self.last_report = Instant::now();
            tokio::task::yield_now().await;
            return true;
        }

        if let Some(n) = self.yield_every {
            if count_so_far % n == 0 {
                tokio::task::yield_now().await;
            }
        }
        false
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_EVERY)
    }
}
