use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;
use crate::report::ReportFormat;

/// Appends accepted items to a file as they arrive.
///
/// YAML output is a run of `key: value` entries, which concatenate into a
/// single mapping; JSON output is one `{"key": value}` object per line.
#[derive(Debug)]
pub struct StreamWriter {
    path: PathBuf,
    out: BufWriter<File>,
    format: ReportFormat,
    written: u64,
}

impl StreamWriter {
    pub async fn create(path: impl AsRef<Path>, format: ReportFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
            format,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write_entry<V>(&mut self, key: &str, value: &V) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        let entry = BTreeMap::from([(key, value)]);
        let encoded = match self.format {
            ReportFormat::Yaml => serde_yaml::to_string(&entry)?,
            ReportFormat::Json => {
                let mut line = serde_json::to_string(&entry)?;
                line.push('\n');
                line
            }
        };
        self.out.write_all(encoded.as_bytes()).await?;
        self.written += 1;
        Ok(())
    }

    /// Flush buffered entries and close the file.
    pub async fn finish(mut self) -> Result<u64> {
        self.out.flush().await?;
        self.out.get_mut().sync_all().await?;

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "migrapipe.report.written",
            path = %self.path.display(),
            entries = self.written,
            "migrapipe.report.written"
        );

        Ok(self.written)
    }
}
