//! [`RemoteService`] over HTTP.
//!
//! Endpoints, relative to the base URL:
//! `POST check/{type}` with `{"q": …}`, `GET render/svg/{resource}` and
//! `GET formula/{key}`. Check and render bypass caches.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::remote::{Artifact, Payload, RemoteService, Verdict, CHECK, RENDER, RETRIEVE};
use crate::report::classify::ItemError;

const RESOURCE_LOCATION: &str = "x-resource-location";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HttpService {
    client: Client,
    base: String,
}

impl HttpService {
    pub fn new(base: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_owned(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }
}

/// Turn a non-success response into an [`ItemError`] carrying its status.
///
/// The detail is the body's `detail`, then its `message`, then the status
/// line.
async fn expect_success(
    stage: &'static str,
    response: Response,
) -> std::result::Result<Response, ItemError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: Option<Value> = response.json().await.ok();
    let detail = body
        .as_ref()
        .and_then(|body| {
            body.get("detail")
                .or_else(|| body.get("message"))
                .and_then(Value::as_str)
        })
        .map(str::to_owned)
        .unwrap_or_else(|| status.to_string());
    Err(ItemError::new(stage, detail).with_status(status.as_u16()))
}

/// Transport failures and timeouts carry no status.
fn transport(stage: &'static str, err: reqwest::Error) -> ItemError {
    ItemError::new(stage, err.to_string())
}

#[async_trait]
impl RemoteService for HttpService {
    async fn check(&self, payload: &Payload) -> std::result::Result<Verdict, ItemError> {
        let response = self
            .client
            .post(self.url(&format!("check/{}", payload.kind)))
            .header(CACHE_CONTROL, "no-cache")
            .json(&json!({ "q": payload.content }))
            .send()
            .await
            .map_err(|e| transport(CHECK, e))?;
        let response = expect_success(CHECK, response).await?;

        let resource = response
            .headers()
            .get(RESOURCE_LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Ok(Verdict { resource })
    }

    async fn render(&self, resource: &str) -> std::result::Result<Artifact, ItemError> {
        let response = self
            .client
            .get(self.url(&format!("render/svg/{resource}")))
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| transport(RENDER, e))?;
        let response = expect_success(RENDER, response).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(|e| transport(RENDER, e))?;
        Ok(Artifact { content_type, body })
    }

    async fn retrieve(&self, key: &str) -> std::result::Result<Payload, ItemError> {
        let response = self
            .client
            .get(self.url(&format!("formula/{key}")))
            .send()
            .await
            .map_err(|e| transport(RETRIEVE, e))?;
        let response = expect_success(RETRIEVE, response).await?;
        response
            .json::<Payload>()
            .await
            .map_err(|e| ItemError::new(RETRIEVE, format!("bad formula body: {e}")))
    }
}
