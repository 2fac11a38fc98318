//! The remote service the jobs migrate content through.
//!
//! Every call fails with an [`ItemError`] labelled with the stage the call
//! belongs to, so the jobs can classify it without inspecting transport
//! details.

#[cfg(feature = "http")]
pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::report::classify::ItemError;

pub const RETRIEVE: &str = "retrieve";
pub const CHECK: &str = "check";
pub const RENDER: &str = "render";

/// Source content plus its kind, as stored in the table and as posted to
/// the check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "q")]
    pub content: String,
}

impl Payload {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// A check the service accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Name of the stored resource, when the service reported one.
    pub resource: Option<String>,
}

/// A rendered resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Submit `payload` for validation and storage.
    async fn check(&self, payload: &Payload) -> Result<Verdict, ItemError>;

    /// Fetch the rendering of `resource`, bypassing caches.
    async fn render(&self, resource: &str) -> Result<Artifact, ItemError>;

    /// Fetch the stored source for `key`.
    async fn retrieve(&self, key: &str) -> Result<Payload, ItemError>;
}

#[async_trait]
impl<T: RemoteService + ?Sized> RemoteService for std::sync::Arc<T> {
    async fn check(&self, payload: &Payload) -> Result<Verdict, ItemError> {
        (**self).check(payload).await
    }

    async fn render(&self, resource: &str) -> Result<Artifact, ItemError> {
        (**self).render(resource).await
    }

    async fn retrieve(&self, key: &str) -> Result<Payload, ItemError> {
        (**self).retrieve(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_uses_wire_names() {
        let payload: Payload = serde_json::from_str(r#"{"type":"tex","q":"x^2"}"#).unwrap();
        assert_eq!(payload, Payload::new("tex", "x^2"));
        let back = serde_json::to_value(&payload).unwrap();
        assert_eq!(back["type"], "tex");
        assert_eq!(back["q"], "x^2");
    }
}
