//! In-memory failure buckets and their flush to report documents.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::report::classify::{Bucket, ItemError};
use crate::report::stream::StreamWriter;
use crate::report::summary::RunSummary;
use crate::report::ReportFormat;

const DEFAULT_DOCUMENT: &str = "failures";

/// Detail kept for one failed item: its identity fields plus the error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error: String,
}

impl FailureRecord {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            fields: BTreeMap::new(),
            status: None,
            error: error.into(),
        }
    }
}

impl From<&ItemError> for FailureRecord {
    fn from(err: &ItemError) -> Self {
        Self {
            fields: err.fields().clone(),
            status: err.status(),
            error: err.detail().to_owned(),
        }
    }
}

/// How a bucket is stored and written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BucketKind {
    /// `key -> FailureRecord` mapping.
    #[default]
    Detailed,
    /// Sorted list of keys.
    KeysOnly,
}

#[derive(Debug, Clone)]
enum BucketData {
    Detailed(BTreeMap<String, FailureRecord>),
    Keys(BTreeSet<String>),
}

impl BucketData {
    fn new(kind: BucketKind) -> Self {
        match kind {
            BucketKind::Detailed => BucketData::Detailed(BTreeMap::new()),
            BucketKind::KeysOnly => BucketData::Keys(BTreeSet::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            BucketData::Detailed(map) => map.len(),
            BucketData::Keys(keys) => keys.len(),
        }
    }

    fn contains(&self, key: &str) -> bool {
        match self {
            BucketData::Detailed(map) => map.contains_key(key),
            BucketData::Keys(keys) => keys.contains(key),
        }
    }
}

impl Serialize for BucketData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            BucketData::Detailed(map) => map.serialize(serializer),
            BucketData::Keys(keys) => keys.serialize(serializer),
        }
    }
}

/// A named output document grouping buckets.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    buckets: Vec<(Bucket, BucketKind)>,
}

impl Document {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buckets: Vec::new(),
        }
    }

    pub fn bucket(mut self, bucket: impl Into<Bucket>, kind: BucketKind) -> Self {
        self.buckets.push((bucket.into(), kind));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Which buckets go to which document, and in what format.
#[derive(Debug, Clone, Default)]
pub struct ReportLayout {
    documents: Vec<Document>,
    format: ReportFormat,
}

impl ReportLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(mut self, document: Document) -> Self {
        self.documents.push(document);
        self
    }

    pub fn format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    fn document_for(&self, bucket: &Bucket) -> Option<&Document> {
        self.documents
            .iter()
            .find(|doc| doc.buckets.iter().any(|(b, _)| b == bucket))
    }
}

/// Collects terminal outcomes for a run.
///
/// Failures are kept per bucket, keyed by item; re-recording a key in the
/// same bucket overwrites it. Successes are only counted, and streamed
/// acceptances go straight to the [`StreamWriter`] without being retained.
#[derive(Debug)]
pub struct ReportAccumulator {
    layout: ReportLayout,
    buckets: BTreeMap<Bucket, BucketData>,
    stream: Option<StreamWriter>,
    considered: u64,
    successes: u64,
    skipped: u64,
}

impl ReportAccumulator {
    pub fn new(layout: ReportLayout) -> Self {
        let buckets = layout
            .documents
            .iter()
            .flat_map(|doc| doc.buckets.iter())
            .map(|(bucket, kind)| (bucket.clone(), BucketData::new(*kind)))
            .collect();
        Self {
            layout,
            buckets,
            stream: None,
            considered: 0,
            successes: 0,
            skipped: 0,
        }
    }

    /// Send accepted items to `writer` as they arrive.
    pub fn with_stream(mut self, writer: StreamWriter) -> Self {
        self.stream = Some(writer);
        self
    }

    pub fn format(&self) -> ReportFormat {
        self.layout.format
    }

    /// Record a failure. A key already present in `bucket` is overwritten,
    /// so the bucket holds one entry per key while `considered` still counts
    /// every recorded outcome.
    pub fn record(&mut self, bucket: Bucket, key: impl Into<String>, record: FailureRecord) {
        let key = key.into();
        match self
            .buckets
            .entry(bucket)
            .or_insert_with(|| BucketData::new(BucketKind::Detailed))
        {
            BucketData::Detailed(map) => {
                map.insert(key, record);
            }
            BucketData::Keys(keys) => {
                keys.insert(key);
            }
        }
        self.considered += 1;
    }

    pub fn record_failure(&mut self, bucket: Bucket, key: impl Into<String>, error: &ItemError) {
        self.record(bucket, key, FailureRecord::from(error));
    }

    pub fn success(&mut self) {
        self.considered += 1;
        self.successes += 1;
    }

    pub fn skip(&mut self) {
        self.considered += 1;
        self.skipped += 1;
    }

    /// Write an accepted item to the streaming output immediately.
    pub async fn stream_accept<V>(&mut self, key: &str, value: &V) -> Result<()>
    where
        V: Serialize + ?Sized,
    {
        let stream = self
            .stream
            .as_mut()
            .ok_or(Error::pipeline("streaming output is not configured"))?;
        stream.write_entry(key, value).await?;
        self.success();
        Ok(())
    }

    pub fn considered(&self) -> u64 {
        self.considered
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn bucket_len(&self, bucket: &str) -> usize {
        self.find(bucket).map(BucketData::len).unwrap_or(0)
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.find(bucket).is_some_and(|data| data.contains(key))
    }

    /// Keys recorded in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<&str> {
        match self.find(bucket) {
            Some(BucketData::Detailed(map)) => map.keys().map(String::as_str).collect(),
            Some(BucketData::Keys(keys)) => keys.iter().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    pub fn failure(&self, bucket: &str, key: &str) -> Option<&FailureRecord> {
        match self.find(bucket) {
            Some(BucketData::Detailed(map)) => map.get(key),
            _ => None,
        }
    }

    fn find(&self, bucket: &str) -> Option<&BucketData> {
        self.buckets
            .iter()
            .find(|(name, _)| name.as_str() == bucket)
            .map(|(_, data)| data)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.considered,
            successes: self.successes,
            skipped: self.skipped,
            buckets: self
                .buckets
                .iter()
                .map(|(bucket, data)| (bucket.clone(), data.len() as u64))
                .collect(),
        }
    }

    /// Serialize every document in memory: `(file name, contents)`.
    pub fn render(&self) -> Result<Vec<(String, String)>> {
        let mut grouped: BTreeMap<&str, Vec<(&Bucket, &BucketData)>> = BTreeMap::new();
        for doc in &self.layout.documents {
            grouped.entry(doc.name()).or_default();
        }
        for (bucket, data) in &self.buckets {
            let name = self
                .layout
                .document_for(bucket)
                .map(Document::name)
                .unwrap_or(DEFAULT_DOCUMENT);
            grouped.entry(name).or_default().push((bucket, data));
        }

        let ext = self.layout.format.extension();
        grouped
            .into_iter()
            .map(|(name, buckets)| -> Result<(String, String)> {
                let body = DocumentBody(buckets);
                let contents = match self.layout.format {
                    ReportFormat::Yaml => serde_yaml::to_string(&body)?,
                    ReportFormat::Json => {
                        let mut text = serde_json::to_string_pretty(&body)?;
                        text.push('\n');
                        text
                    }
                };
                Ok((format!("{name}.{ext}"), contents))
            })
            .collect()
    }

    /// Close the streaming output and write every document into `dir`.
    pub async fn flush(&mut self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        if let Some(stream) = self.stream.take() {
            stream.finish().await?;
        }

        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;

        let mut written = Vec::new();
        for (file_name, contents) in self.render()? {
            let path = dir.join(file_name);
            tokio::fs::write(&path, contents).await?;

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::INFO,
                event = "migrapipe.report.written",
                path = %path.display(),
                "migrapipe.report.written"
            );

            written.push(path);
        }
        Ok(written)
    }
}

struct DocumentBody<'a>(Vec<(&'a Bucket, &'a BucketData)>);

impl Serialize for DocumentBody<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (bucket, data) in &self.0 {
            map.serialize_entry(bucket.as_str(), data)?;
        }
        map.end()
    }
}
