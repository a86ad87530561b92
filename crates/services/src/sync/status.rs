use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::SyncState;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatusFetchError {
    #[error("Status request failed with HTTP {status}")]
    Backend { status: u16 },
    #[error("Status request failed: network error ({0})")]
    Network(String),
    #[error("Status response was invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub synced_records_count: u64,
    #[serde(default)]
    pub total_records: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteSyncStatus {
    pub status: SyncState,
    #[serde(default)]
    pub summary: SyncSummary,
    #[serde(default)]
    pub message: Option<String>,
}

#[async_trait]
pub trait SyncStatusSource: Send + Sync {
    async fn fetch_status(
        &self,
        sync_id: &str,
        user_token: Option<&str>,
    ) -> Result<RemoteSyncStatus, StatusFetchError>;
}

/// `GET {base}/syncs/{sync_id}` authenticated with the per-sync user token.
pub struct HttpSyncStatusSource {
    client: Client,
    base_url: String,
}

impl HttpSyncStatusSource {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SyncStatusSource for HttpSyncStatusSource {
    async fn fetch_status(
        &self,
        sync_id: &str,
        user_token: Option<&str>,
    ) -> Result<RemoteSyncStatus, StatusFetchError> {
        let mut request = self.client.get(format!(
            "{}/syncs/{}",
            self.base_url,
            urlencoding::encode(sync_id)
        ));
        if let Some(token) = user_token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| StatusFetchError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(StatusFetchError::Backend {
                status: resp.status().as_u16(),
            });
        }
        resp.json()
            .await
            .map_err(|e| StatusFetchError::InvalidResponse(e.to_string()))
    }
}
