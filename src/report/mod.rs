//! Failure classification, report accumulation and output.

pub mod accumulator;
pub mod classify;
pub mod stream;
pub mod summary;

use serde::{Deserialize, Serialize};

/// Serialization used for report documents and streamed output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Yaml,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Yaml => "yaml",
            ReportFormat::Json => "json",
        }
    }
}
