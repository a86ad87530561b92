pub mod capability;
pub mod google;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use capability::{CapabilityLoader, HttpCapability};
pub use google::{
    ConsentPrompt, ConsentResponse, DriveFolderWidget, FolderChooser, FolderEntry, GoogleOAuthFlow,
};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PickerError {
    #[error("Folder picker is not ready")]
    NotReady,
    #[error("Failed to load {name}: {reason}")]
    Capability { name: String, reason: String },
    #[error("Authorization failed: {0}")]
    OAuth(String),
    #[error("Invalid folder selection: missing folder id")]
    InvalidSelection,
    #[error("Folder picker failed: {0}")]
    Widget(String),
}

/// Folder chosen in the picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedFolder {
    pub id: String,
    pub name: String,
    /// Present only for shared drives; absent means the user's own drive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
}

impl SelectedFolder {
    pub fn location_label(&self) -> &'static str {
        match self.drive_id {
            Some(_) => "Shared Drive",
            None => "My Drive",
        }
    }
}

/// Raw document descriptor as returned by the widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedDocument {
    pub id: Option<String>,
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub drive_id: Option<String>,
}

/// Terminal action reported by the widget.
#[derive(Debug, Clone, PartialEq)]
pub enum PickerAction {
    Picked(Vec<PickedDocument>),
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerOutcome {
    Picked(SelectedFolder),
    /// The user dismissed the consent screen or the picker. Not an error.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveScope {
    MyDrive,
    SharedDrives,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerView {
    pub scope: DriveScope,
    pub mime_types: String,
    pub include_folders: bool,
    pub select_folders: bool,
}

impl PickerView {
    fn folders(scope: DriveScope) -> Self {
        Self {
            scope,
            mime_types: FOLDER_MIME_TYPE.to_string(),
            include_folders: true,
            select_folders: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerConfig {
    pub developer_key: String,
    pub app_id: String,
    pub views: Vec<PickerView>,
}

impl PickerConfig {
    /// Folder-only selection over the user's drive and shared drives.
    pub fn folders(developer_key: &str, app_id: &str) -> Self {
        Self {
            developer_key: developer_key.to_string(),
            app_id: app_id.to_string(),
            views: vec![
                PickerView::folders(DriveScope::MyDrive),
                PickerView::folders(DriveScope::SharedDrives),
            ],
        }
    }
}

/// Interactive OAuth consent. `Ok(None)` means the user dismissed it.
#[async_trait]
pub trait OAuthTokenFlow: Send + Sync {
    async fn request_access_token(&self) -> Result<Option<String>, PickerError>;
}

/// Boundary of the third-party folder selection widget.
#[async_trait]
pub trait PickerWidget: Send + Sync {
    /// Whether the host exposes the widget's API surface.
    fn is_available(&self) -> bool;

    /// Loads the rendering API. Called once, lazily, before the first `show`.
    async fn load_renderer(&self) -> Result<(), PickerError>;

    async fn show(&self, config: &PickerConfig, access_token: &str)
        -> Result<PickerAction, PickerError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PickerSnapshot {
    pub api_loaded: bool,
    pub oauth_loaded: bool,
    pub loading: bool,
    pub selected: Option<SelectedFolder>,
    pub error: Option<String>,
    pub has_access_token: bool,
}

#[derive(Default)]
struct PickerState {
    api_loaded: bool,
    oauth_loaded: bool,
    renderer_loaded: bool,
    loading: bool,
    selected: Option<SelectedFolder>,
    error: Option<String>,
    access_token: Option<String>,
}

/// Owns the picker's readiness, cached access token and current selection.
pub struct FolderPickerManager {
    api_loader: Arc<dyn CapabilityLoader>,
    oauth_loader: Arc<dyn CapabilityLoader>,
    widget: Arc<dyn PickerWidget>,
    token_flow: Arc<dyn OAuthTokenFlow>,
    developer_key: String,
    app_id: String,
    state: Mutex<PickerState>,
}

impl FolderPickerManager {
    pub fn new(
        api_loader: Arc<dyn CapabilityLoader>,
        oauth_loader: Arc<dyn CapabilityLoader>,
        widget: Arc<dyn PickerWidget>,
        token_flow: Arc<dyn OAuthTokenFlow>,
        developer_key: String,
        app_id: String,
    ) -> Self {
        Self {
            api_loader,
            oauth_loader,
            widget,
            token_flow,
            developer_key,
            app_id,
            state: Mutex::new(PickerState::default()),
        }
    }

    /// Awaits both external dependencies concurrently. Safe to call again
    /// after a failure; a successful load clears the recorded error.
    pub async fn load(&self) -> Result<(), PickerError> {
        let (api, oauth) = futures::join!(self.api_loader.load(), self.oauth_loader.load());

        let mut state = self.state.lock();
        state.api_loaded = api.is_ok();
        state.oauth_loaded = oauth.is_ok();
        match api.and(oauth) {
            Ok(()) => {
                info!("Folder picker dependencies loaded");
                state.error = None;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Folder picker dependency failed to load");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        let state = self.state.lock();
        state.api_loaded && state.oauth_loaded
    }

    pub fn is_ready(&self) -> bool {
        self.is_loaded() && self.widget.is_available()
    }

    /// Runs consent (if needed) and shows the picker.
    pub async fn open_picker(&self) -> Result<PickerOutcome, PickerError> {
        if !self.is_ready() {
            return Err(PickerError::NotReady);
        }
        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
        }

        let result = self.run_picker().await;

        let mut state = self.state.lock();
        state.loading = false;
        match &result {
            Ok(PickerOutcome::Picked(folder)) => {
                info!(folder_id = %folder.id, location = folder.location_label(), "Folder selected");
                state.selected = Some(folder.clone());
            }
            Ok(PickerOutcome::Cancelled) => debug!("Folder picker cancelled"),
            Err(err) => {
                warn!(error = %err, "Folder picker failed");
                state.error = Some(err.to_string());
            }
        }
        result
    }

    async fn run_picker(&self) -> Result<PickerOutcome, PickerError> {
        let cached = self.state.lock().access_token.clone();
        let access_token = match cached {
            Some(token) => token,
            None => match self.token_flow.request_access_token().await? {
                Some(token) => {
                    self.state.lock().access_token = Some(token.clone());
                    token
                }
                None => return Ok(PickerOutcome::Cancelled),
            },
        };

        if !self.state.lock().renderer_loaded {
            self.widget.load_renderer().await?;
            self.state.lock().renderer_loaded = true;
        }

        let config = PickerConfig::folders(&self.developer_key, &self.app_id);
        match self.widget.show(&config, &access_token).await? {
            PickerAction::Cancel => Ok(PickerOutcome::Cancelled),
            PickerAction::Picked(documents) => {
                selected_folder(documents).map(PickerOutcome::Picked)
            }
        }
    }

    /// Clears selection, error and the cached access token.
    pub fn reset_picker(&self) {
        let mut state = self.state.lock();
        state.selected = None;
        state.error = None;
        state.access_token = None;
    }

    pub fn snapshot(&self) -> PickerSnapshot {
        let state = self.state.lock();
        PickerSnapshot {
            api_loaded: state.api_loaded,
            oauth_loaded: state.oauth_loaded,
            loading: state.loading,
            selected: state.selected.clone(),
            error: state.error.clone(),
            has_access_token: state.access_token.is_some(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }
}

fn selected_folder(documents: Vec<PickedDocument>) -> Result<SelectedFolder, PickerError> {
    let document = documents
        .into_iter()
        .next()
        .ok_or(PickerError::InvalidSelection)?;
    let id = document
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or(PickerError::InvalidSelection)?;
    Ok(SelectedFolder {
        id,
        name: document.name.unwrap_or_default(),
        drive_id: document.drive_id.filter(|d| !d.is_empty()),
    })
}
