//! HTTP client for the record store service
//!
//! Speaks the `qms-records` API. Status codes the service uses for
//! definite answers (400, 404, 409) map back onto the matching error
//! variants; anything else, including connection failures, becomes
//! [`Error::Remote`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use super::RecordStore;
use crate::records::{DataBlob, Record};
use crate::{Error, Result};

/// Default per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RemoteStore {
    client: Client,
    base_url: Url,
}

impl RemoteStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Result<Self> {
        let raw = base_url.into();
        let base_url = Url::parse(raw.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid remote store URL '{}': {}", raw, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Invalid remote store URL '{}': not a base URL",
                raw
            )));
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one
    ///
    /// Ids may contain `/`, `?` or `#`; each still lands in one segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Remote(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status));

        Err(match status {
            StatusCode::NOT_FOUND => Error::NotFound(message),
            StatusCode::BAD_REQUEST => Error::InvalidInput(message),
            StatusCode::CONFLICT => Error::Conflict(message),
            _ => Error::Remote(message),
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| Error::Remote(format!("Invalid response body: {}", e)))
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn get_data(&self, module: &str) -> Result<Vec<Record>> {
        let url = self.url(&["api", "data", module]);
        self.json(self.client.get(url)).await
    }

    async fn get_item(&self, module: &str, id: &str) -> Result<Record> {
        let url = self.url(&["api", "records", module, id]);
        self.json(self.client.get(url)).await
    }

    async fn save_data(&self, module: &str, records: Vec<Record>) -> Result<()> {
        let url = self.url(&["api", "data", module]);
        self.send(self.client.put(url).json(&records)).await?;
        Ok(())
    }

    async fn add_item(&self, module: &str, record: Record) -> Result<Record> {
        let url = self.url(&["api", "records", module]);
        self.json(self.client.post(url).json(&record)).await
    }

    async fn update_item(&self, module: &str, id: &str, patch: Record) -> Result<Record> {
        let url = self.url(&["api", "records", module, id]);
        self.json(self.client.put(url).json(&patch)).await
    }

    async fn delete_item(&self, module: &str, id: &str) -> Result<()> {
        let url = self.url(&["api", "records", module, id]);
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<DataBlob> {
        self.json(self.client.get(self.url(&["api", "data"]))).await
    }

    async fn save_all(&self, blob: DataBlob) -> Result<()> {
        self.send(self.client.put(self.url(&["api", "data"])).json(&blob))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = RemoteStore::new("http://127.0.0.1:5731/").unwrap();
        assert_eq!(
            store.url(&["api", "data"]).as_str(),
            "http://127.0.0.1:5731/api/data"
        );

        let prefixed = RemoteStore::new("http://qms.local/store/").unwrap();
        assert_eq!(
            prefixed.url(&["api", "data", "complaints"]).as_str(),
            "http://qms.local/store/api/data/complaints"
        );
    }

    #[test]
    fn test_reserved_characters_stay_in_one_segment() {
        let store = RemoteStore::new("http://127.0.0.1:5731").unwrap();
        assert_eq!(
            store.url(&["api", "records", "complaints", "QA/2024-01"]).as_str(),
            "http://127.0.0.1:5731/api/records/complaints/QA%2F2024-01"
        );
        assert_eq!(
            store.url(&["api", "records", "complaints", "R#7"]).as_str(),
            "http://127.0.0.1:5731/api/records/complaints/R%237"
        );
        assert_eq!(
            store.url(&["api", "records", "complaints", "a?b"]).as_str(),
            "http://127.0.0.1:5731/api/records/complaints/a%3Fb"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(RemoteStore::new("not a url"), Err(Error::Config(_))));
        assert!(matches!(RemoteStore::new("mailto:qa@station"), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_remote_error() {
        // Port 9 (discard) is closed on test machines
        let store = RemoteStore::new("http://127.0.0.1:9").unwrap();
        let res = store.get_data("complaints").await;
        assert!(matches!(res, Err(Error::Remote(_))));
    }
}
