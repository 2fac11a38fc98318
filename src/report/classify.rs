//! Failure classification.
//!
//! Every item failure carries the label of the stage it happened at. The
//! [`Classifier`] is a caller-supplied table from `(stage, error shape)` to a
//! [`Bucket`]; stages without a matching rule fall back to that stage's
//! generic bucket, so classification is total.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, Result};

/// A failure raised inside a pipeline stage.
///
/// These never abort a run; they are classified and recorded.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage}: {detail}")]
pub struct ItemError {
    stage: &'static str,
    status: Option<u16>,
    detail: String,
    fields: BTreeMap<String, Value>,
}

impl ItemError {
    pub fn new(stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: None,
            detail: detail.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach an identity field kept in the failure record for diagnosis.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Relabel the failure point, keeping status, detail and fields.
    pub fn at_stage(mut self, stage: &'static str) -> Self {
        self.stage = stage;
        self
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn has_status(&self, status: u16) -> bool {
        self.status == Some(status)
    }
}

/// Name of a failure category in the final report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Bucket(Cow<'static, str>);

impl Bucket {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bucket unmatched failures of `stage` end up in.
    pub fn generic_for(stage: &str) -> Self {
        Self::new(format!("{stage}_error"))
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Bucket {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

/// Error shape a rule matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Status(u16),
    StatusRange(RangeInclusive<u16>),
    /// Any error that carries a status code.
    AnyStatus,
    /// Errors without a status: transport failures, timeouts.
    NoStatus,
    DetailContains(String),
}

impl Matcher {
    fn matches(&self, error: &ItemError) -> bool {
        match self {
            Matcher::Status(code) => error.status == Some(*code),
            Matcher::StatusRange(range) => error.status.is_some_and(|s| range.contains(&s)),
            Matcher::AnyStatus => error.status.is_some(),
            Matcher::NoStatus => error.status.is_none(),
            Matcher::DetailContains(needle) => error.detail.contains(needle.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    stage: &'static str,
    matcher: Matcher,
    bucket: Bucket,
}

/// Fixed table mapping failures to buckets. First matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: Vec<Rule>,
    stage_defaults: HashMap<&'static str, Bucket>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, stage: &'static str, matcher: Matcher, bucket: impl Into<Bucket>) -> Self {
        self.rules.push(Rule {
            stage,
            matcher,
            bucket: bucket.into(),
        });
        self
    }

    /// Bucket for failures of `stage` no rule matched.
    pub fn stage_default(mut self, stage: &'static str, bucket: impl Into<Bucket>) -> Self {
        self.stage_defaults.insert(stage, bucket.into());
        self
    }

    pub fn classify(&self, error: &ItemError) -> Bucket {
        self.rules
            .iter()
            .find(|rule| rule.stage == error.stage && rule.matcher.matches(error))
            .map(|rule| rule.bucket.clone())
            .or_else(|| self.stage_defaults.get(error.stage).cloned())
            .unwrap_or_else(|| Bucket::generic_for(error.stage))
    }

    /// Check that no bucket is shared between two stages.
    pub fn validate(&self) -> Result<()> {
        let mut owners: HashMap<&Bucket, &'static str> = HashMap::new();
        let pairs = self
            .rules
            .iter()
            .map(|rule| (rule.stage, &rule.bucket))
            .chain(self.stage_defaults.iter().map(|(stage, bucket)| (*stage, bucket)));

        for (stage, bucket) in pairs {
            match owners.get(bucket) {
                Some(owner) if *owner != stage => {
                    return Err(Error::config(format!(
                        "bucket `{bucket}` is used by stages `{owner}` and `{stage}`"
                    )));
                }
                _ => {
                    owners.insert(bucket, stage);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stage_gets_generic_bucket() {
        let classifier = Classifier::new();
        let err = ItemError::new("render", "boom");
        assert_eq!(classifier.classify(&err).as_str(), "render_error");
    }

    #[test]
    fn rule_order_decides() {
        let classifier = Classifier::new()
            .rule("fetch", Matcher::Status(404), "not_found")
            .rule("fetch", Matcher::AnyStatus, "fetch_fail");
        let err = ItemError::new("fetch", "missing").with_status(404);
        assert_eq!(classifier.classify(&err).as_str(), "not_found");
        let err = ItemError::new("fetch", "busy").with_status(503);
        assert_eq!(classifier.classify(&err).as_str(), "fetch_fail");
    }

    #[test]
    fn shared_bucket_rejected() {
        let classifier = Classifier::new()
            .rule("a", Matcher::AnyStatus, "oops")
            .stage_default("b", "oops");
        assert!(classifier.validate().is_err());
    }
}
