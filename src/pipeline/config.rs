use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pipeline::progress::ProgressThrottle;
use crate::pipeline::retry::RetryPolicy;
use crate::report::ReportFormat;

/// What to do with items a stage halted (unparseable rows, rejected checks).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipPolicy {
    /// Not counted anywhere.
    #[default]
    Drop,
    /// Counted as `skipped` in the run summary.
    Record,
}

/// Tunables shared by every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub page_size: usize,
    pub page_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter_ms: u64,
    pub concurrency: usize,
    pub stage_concurrency: HashMap<String, usize>,
    pub report_every: u64,
    pub yield_every: u64,
    pub skip_policy: SkipPolicy,
    pub report_dir: PathBuf,
    pub report_format: ReportFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: 512,
            page_retries: 10,
            retry_base_delay_ms: 50,
            retry_max_delay_ms: 2_000,
            retry_jitter_ms: 25,
            concurrency: 32,
            stage_concurrency: HashMap::new(),
            report_every: 10_000,
            yield_every: 128,
            skip_policy: SkipPolicy::Drop,
            report_dir: PathBuf::from("."),
            report_format: ReportFormat::Yaml,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::config("page_size must be positive"));
        }
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be positive"));
        }
        if let Some((stage, _)) = self.stage_concurrency.iter().find(|(_, n)| **n == 0) {
            return Err(Error::config(format!(
                "stage_concurrency for `{stage}` must be positive"
            )));
        }
        Ok(())
    }

    /// Per-stage cap, falling back to the pipeline-wide concurrency.
    pub fn concurrency_for(&self, stage: &str, default: usize) -> usize {
        self.stage_concurrency
            .get(stage)
            .copied()
            .unwrap_or(default)
    }

    pub fn page_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.page_retries)
            .base_delay(Duration::from_millis(self.retry_base_delay_ms))
            .max_delay(Duration::from_millis(self.retry_max_delay_ms))
            .with_jitter(Duration::from_millis(self.retry_jitter_ms))
    }

    pub fn throttle(&self, label: &'static str) -> ProgressThrottle {
        ProgressThrottle::new(self.report_every)
            .label(label)
            .yield_every(self.yield_every)
    }
}
