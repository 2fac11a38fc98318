//! Flat key lists, for jobs that start from identifiers instead of a table.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::item::Item;

/// One key per line; blank lines are ignored.
pub fn parse_key_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Keys of a YAML mapping, sorted, starting at the first key `>= start`.
///
/// A start key missing from the mapping still skips every key that sorts
/// before it.
pub fn parse_yaml_keys(text: &str, start: Option<&str>) -> Result<Vec<String>> {
    let mapping: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(text)?;
    let Some(start) = start.filter(|s| !s.is_empty()) else {
        return Ok(mapping.into_keys().collect());
    };

    #[cfg(feature = "tracing")]
    if !mapping.contains_key(start) {
        tracing::event!(
            tracing::Level::WARN,
            event = "migrapipe.keys.start_absent",
            start = start,
            skipped = mapping.range::<str, _>((std::ops::Bound::Unbounded, std::ops::Bound::Excluded(start))).count(),
            "migrapipe.keys.start_absent"
        );
    }

    Ok(mapping
        .into_keys()
        .filter(|key| key.as_str() >= start)
        .collect())
}

pub async fn read_key_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    Ok(parse_key_lines(&read(path.as_ref()).await?))
}

pub async fn read_yaml_keys(path: impl AsRef<Path>, start: Option<&str>) -> Result<Vec<String>> {
    parse_yaml_keys(&read(path.as_ref()).await?, start)
}

/// Wrap bare keys as payload-less items.
pub fn key_items(keys: Vec<String>) -> Vec<Item<()>> {
    keys.into_iter().map(|key| Item::new(key, ())).collect()
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Message(format!("cannot read {}: {e}", path.display())))
}
