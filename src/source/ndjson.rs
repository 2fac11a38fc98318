//! A paginated table stored as NDJSON, one `{"key": …, "value": …}` row
//! per line. The cursor is the byte offset where the next page starts.

use std::io::SeekFrom;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::error::{Error, Result};
use crate::item::{Cursor, Item, Page};
use crate::source::fetch::PageFetcher;

const DEFAULT_READ_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Deserialize)]
struct TableRow {
    key: String,
    value: Value,
}

/// File-backed [`PageFetcher`] yielding `Item<String>` rows.
///
/// A string `value` is passed through verbatim (it is usually JSON text);
/// any other JSON value is re-encoded. Lines that are not a `{"key", "value"}`
/// row are logged and skipped; they do not count towards the page size.
#[derive(Debug, Clone)]
pub struct NdjsonTable {
    path: PathBuf,
    read_buffer_bytes: usize,
}

impl NdjsonTable {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
        }
    }

    pub fn read_buffer_bytes(mut self, n: usize) -> Self {
        self.read_buffer_bytes = n.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cursor pointing at byte `offset`, e.g. to resume a run.
    pub fn cursor_at(offset: u64) -> Cursor {
        Cursor::from(offset)
    }

    fn decode_cursor(cursor: Option<&Cursor>) -> Result<u64> {
        let Some(cursor) = cursor else {
            return Ok(0);
        };
        let bytes: [u8; 8] = cursor
            .as_bytes()
            .try_into()
            .map_err(|_| Error::decode("malformed ndjson cursor"))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

#[async_trait]
impl PageFetcher for NdjsonTable {
    type Query = ();
    type Row = Item<String>;

    async fn fetch_page(
        &self,
        _query: &(),
        cursor: Option<&Cursor>,
        page_size: NonZeroUsize,
    ) -> Result<Page<Item<String>>> {
        let mut offset = Self::decode_cursor(cursor)?;

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut reader = BufReader::with_capacity(self.read_buffer_bytes, file);

        let mut rows = Vec::with_capacity(page_size.get());
        let mut line = String::new();

        while rows.len() < page_size.get() {
            line.clear();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(Page::last(rows));
            }
            #[cfg(feature = "tracing")]
            let line_start = offset;
            offset += n as u64;

            let text = line.trim_end_matches(['\n', '\r']);
            if text.is_empty() {
                continue;
            }

            let row: TableRow = match serde_json::from_str(text) {
                Ok(row) => row,
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::WARN,
                        event = "migrapipe.item.unparseable",
                        offset = line_start,
                        preview = %preview(text),
                        error = %_err,
                        "migrapipe.item.unparseable"
                    );
                    continue;
                }
            };
            let payload = match row.value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            rows.push(Item::new(row.key, payload));
        }

        let exhausted = reader.fill_buf().await?.is_empty();
        let next = (!exhausted).then(|| Cursor::from(offset));
        Ok(Page::new(rows, next))
    }
}

#[cfg(feature = "tracing")]
fn preview(line: &str) -> String {
    const PREVIEW_LEN: usize = 80;
    let mut short = line.chars().take(PREVIEW_LEN).collect::<String>();
    if line.chars().count() > PREVIEW_LEN {
        short.push_str("...");
    }
    short
}
