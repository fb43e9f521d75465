//! # REST Remote Store
//!
//! [`RemoteStore`] implementation for a hosted realtime database exposed
//! over REST (`GET`/`PUT`/`PATCH`/`DELETE {base}/{path}.json`).
//!
//! There is no change feed on this transport: `subscribe` reports
//! [`SyncError::SubscribeUnsupported`] and the periodic sync engine carries
//! the full correctness load, which the realtime listener treats as a silent
//! degradation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::remote::{RemoteEvent, RemoteStore};

/// Remote store over the hosted realtime database's REST surface.
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestRemoteStore {
    /// Creates a store for the given base URL (no trailing slash needed).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        RestRemoteStore {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn check_status(response: &reqwest::Response, path: &str) -> SyncResult<()> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::RemoteStatus {
                status: status.as_u16(),
                path: path.to_string(),
            })
        }
    }
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn get(&self, path: &str) -> SyncResult<Option<Value>> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::check_status(&response, path)?;

        // An absent node reads as JSON null
        let value: Value = response.json().await?;
        Ok(match value {
            Value::Null => None,
            other => Some(other),
        })
    }

    async fn put(&self, path: &str, value: Value) -> SyncResult<()> {
        debug!(path = %path, "Remote put");

        let response = self.client.put(self.url(path)).json(&value).send().await?;
        Self::check_status(&response, path)
    }

    async fn merge(&self, path: &str, value: Value) -> SyncResult<()> {
        debug!(path = %path, "Remote merge");

        let response = self
            .client
            .patch(self.url(path))
            .json(&value)
            .send()
            .await?;
        Self::check_status(&response, path)
    }

    async fn remove(&self, path: &str) -> SyncResult<()> {
        debug!(path = %path, "Remote remove");

        let response = self.client.delete(self.url(path)).send().await?;
        Self::check_status(&response, path)
    }

    async fn list(&self, path: &str) -> SyncResult<BTreeMap<String, Value>> {
        let children = match self.get(path).await? {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };

        Ok(children)
    }

    fn subscribe(&self) -> SyncResult<broadcast::Receiver<RemoteEvent>> {
        Err(SyncError::SubscribeUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_shaping() {
        let store = RestRemoteStore::new("https://hkd.example.com/");
        assert_eq!(
            store.url("hkd/o1/info"),
            "https://hkd.example.com/hkd/o1/info.json"
        );
    }

    #[test]
    fn test_subscribe_unsupported() {
        let store = RestRemoteStore::new("https://hkd.example.com");
        assert!(matches!(
            store.subscribe(),
            Err(SyncError::SubscribeUnsupported)
        ));
    }
}
