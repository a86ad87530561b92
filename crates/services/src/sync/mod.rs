pub mod client;
pub mod poller;
pub mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use client::{SyncConfigClient, SyncConfigError, SyncConfigResponse, SyncConfigurator};
pub use poller::{SyncStatusPoller, SyncStatusUpdate};
pub use status::{HttpSyncStatusSource, RemoteSyncStatus, StatusFetchError, SyncStatusSource};

/// Message recorded on a sync whose status could not be fetched.
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    #[serde(alias = "initializing")]
    Initializing,
    #[serde(alias = "active")]
    Active,
    #[serde(alias = "idle")]
    Idle,
    #[serde(alias = "disabled")]
    Disabled,
    #[serde(alias = "errored")]
    Errored,
}

/// Registration payload for a new sync job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub workspace_id: String,
    pub user_id: String,
    pub integration_id: String,
    pub folder_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
}

/// Locally tracked state of one backend sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub sync_id: String,
    pub status: SyncState,
    pub integration: String,
    pub folder_id: String,
    pub message: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub synced_records_count: u64,
    pub total_records: u64,
}

impl SyncStatus {
    /// Seed entry for a sync the backend just accepted.
    pub fn initializing(
        sync_id: impl Into<String>,
        integration: impl Into<String>,
        folder_id: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            sync_id: sync_id.into(),
            status: SyncState::Initializing,
            integration: integration.into(),
            folder_id: folder_id.into(),
            message,
            last_synced_at: None,
            synced_records_count: 0,
            total_records: 0,
        }
    }
}
