use async_trait::async_trait;
use drivelink_config::is_absolute_http_url;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{SyncRequest, SyncState};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncConfigError {
    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),
    #[error("Sync configuration failed (HTTP {status}): {message}")]
    Backend { status: u16, message: String },
    #[error("Sync configuration failed: network error ({0})")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfigResponse {
    pub sync_id: String,
    #[serde(default)]
    pub status: Option<SyncState>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Registers folder syncs with the backend.
#[async_trait]
pub trait SyncConfigurator: Send + Sync {
    async fn configure_sync(&self, request: &SyncRequest)
        -> Result<SyncConfigResponse, SyncConfigError>;
}

impl SyncRequest {
    pub fn validate(&self) -> Result<(), SyncConfigError> {
        if self.folder_id.trim().is_empty() {
            return Err(SyncConfigError::InvalidRequest("folderId is empty".to_string()));
        }
        if !is_absolute_http_url(&self.webhook_url) {
            return Err(SyncConfigError::InvalidRequest(format!(
                "webhookUrl is not an absolute URL: {:?}",
                self.webhook_url
            )));
        }
        Ok(())
    }
}

/// `POST {base}/webhooks/paragon/sync`. Single attempt, no retry.
pub struct SyncConfigClient {
    client: Client,
    base_url: String,
}

impl SyncConfigClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Prefers the backend's `error` or `message` field over the raw body.
fn backend_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message"] {
            if let Some(text) = json[key].as_str().filter(|t| !t.is_empty()) {
                return text.to_string();
            }
        }
    }
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

#[async_trait]
impl SyncConfigurator for SyncConfigClient {
    async fn configure_sync(
        &self,
        request: &SyncRequest,
    ) -> Result<SyncConfigResponse, SyncConfigError> {
        request.validate()?;

        let resp = self
            .client
            .post(format!("{}/webhooks/paragon/sync", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| SyncConfigError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = backend_message(status, &body);
            warn!(folder_id = %request.folder_id, status = status.as_u16(), %message, "Sync configuration rejected");
            return Err(SyncConfigError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let body: SyncConfigResponse = resp
            .json()
            .await
            .map_err(|e| SyncConfigError::Network(format!("invalid response: {}", e)))?;
        info!(sync_id = %body.sync_id, folder_id = %request.folder_id, "Sync configured");
        Ok(body)
    }
}
