use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::report::classify::Bucket;

/// Final counts for a run, derived from the accumulator at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: u64,
    pub successes: u64,
    pub skipped: u64,
    pub buckets: BTreeMap<Bucket, u64>,
}

impl RunSummary {
    pub fn failures(&self) -> u64 {
        self.buckets.values().sum()
    }

    pub fn count(&self, bucket: &str) -> u64 {
        self.buckets
            .iter()
            .find(|(name, _)| name.as_str() == bucket)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// `total = successes + skipped + Σ buckets`.
    pub fn reconciles(&self) -> bool {
        self.successes + self.skipped + self.failures() == self.total
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rows: Vec<(&str, u64)> = vec![("Total", self.total), ("Success", self.successes)];
        if self.skipped > 0 {
            rows.push(("Skipped", self.skipped));
        }
        rows.extend(self.buckets.iter().map(|(bucket, n)| (bucket.as_str(), *n)));

        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, count) in rows {
            writeln!(f, "{label:<width$} : {count}")?;
        }
        Ok(())
    }
}
