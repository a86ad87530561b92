pub mod paragon;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::token::TokenSource;

pub use paragon::ParagonConnector;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConnectorError {
    #[error("Connector configuration failed: {0}")]
    Configuration(String),
    #[error("Connector SDK is not ready")]
    SdkNotReady,
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Connector session is not authenticated")]
    NotAuthenticated,
    #[error("Connector request failed: {0}")]
    Request(String),
}

/// Typed notifications emitted by the connector SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorEvent {
    Installed { integration: String },
    Uninstalled { integration: String },
}

/// Passthrough call to the connected provider's native API.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ProxyRequest {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            headers: Vec::new(),
            body: Some(body),
        }
    }
}

/// Boundary of the embedded connector SDK. Errors are the SDK's own
/// messages; the auth manager maps them onto `ConnectorError`.
#[async_trait]
pub trait ConnectorSdk: Send + Sync {
    async fn configure(&self, host: &str, project_id: &str) -> Result<(), String>;
    async fn authenticate(&self, project_id: &str, credential: &str) -> Result<(), String>;
    async fn request(
        &self,
        integration: &str,
        path: &str,
        request: ProxyRequest,
    ) -> Result<serde_json::Value, String>;
    fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConfigState {
    Unconfigured,
    Configuring,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthStatus {
    Idle,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSnapshot {
    pub config: ConfigState,
    pub status: AuthStatus,
    pub user: Option<AuthenticatedUser>,
    pub error: Option<String>,
}

/// Drives SDK configuration and the per-user authentication lifecycle.
pub struct ConnectorAuthManager {
    sdk: Arc<dyn ConnectorSdk>,
    tokens: Arc<dyn TokenSource>,
    host: String,
    project_id: String,
    state: Mutex<AuthSnapshot>,
}

impl ConnectorAuthManager {
    pub fn new(
        sdk: Arc<dyn ConnectorSdk>,
        tokens: Arc<dyn TokenSource>,
        host: String,
        project_id: String,
    ) -> Self {
        Self {
            sdk,
            tokens,
            host,
            project_id,
            state: Mutex::new(AuthSnapshot {
                config: ConfigState::Unconfigured,
                status: AuthStatus::Idle,
                user: None,
                error: None,
            }),
        }
    }

    /// Configures the SDK on first call only. A failure is permanent for
    /// the lifetime of this manager.
    pub async fn initialize(&self) -> ConfigState {
        {
            let mut state = self.state.lock();
            if state.config != ConfigState::Unconfigured {
                return state.config.clone();
            }
            state.config = ConfigState::Configuring;
        }

        let result = self.sdk.configure(&self.host, &self.project_id).await;

        let mut state = self.state.lock();
        state.config = match result {
            Ok(()) => {
                info!(host = %self.host, project_id = %self.project_id, "Connector SDK configured");
                ConfigState::Ready
            }
            Err(reason) => {
                error!(host = %self.host, %reason, "Connector SDK configuration failed");
                state.error = Some(ConnectorError::Configuration(reason.clone()).to_string());
                ConfigState::Failed(reason)
            }
        };
        state.config.clone()
    }

    /// Fetches a fresh credential and authenticates the SDK session with it.
    ///
    /// On failure the manager is left unauthenticated with the error recorded.
    pub async fn authenticate(&self, user_id: &str) -> Result<AuthenticatedUser, ConnectorError> {
        {
            let mut state = self.state.lock();
            if state.config != ConfigState::Ready {
                return Err(ConnectorError::SdkNotReady);
            }
            state.status = AuthStatus::Authenticating;
            state.user = None;
            state.error = None;
        }

        let result = async {
            let credential = self
                .tokens
                .generate_token(user_id)
                .await
                .map_err(|e| e.to_string())?;
            self.sdk.authenticate(&self.project_id, &credential).await
        }
        .await;

        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                let user = AuthenticatedUser {
                    user_id: user_id.to_string(),
                    project_id: self.project_id.clone(),
                };
                state.status = AuthStatus::Authenticated;
                state.user = Some(user.clone());
                info!(%user_id, "Connector session authenticated");
                Ok(user)
            }
            Err(reason) => {
                let err = ConnectorError::Authentication(reason);
                state.status = AuthStatus::Idle;
                state.user = None;
                state.error = Some(err.to_string());
                warn!(%user_id, error = %err, "Connector authentication failed");
                Err(err)
            }
        }
    }

    /// Returns to `Idle`, dropping any user and error. Configuration is kept.
    pub fn reset_auth(&self) {
        let mut state = self.state.lock();
        state.status = AuthStatus::Idle;
        state.user = None;
        state.error = None;
    }

    /// Authenticated passthrough to the provider's native API.
    pub async fn proxy_request(
        &self,
        integration: &str,
        path: &str,
        request: ProxyRequest,
    ) -> Result<serde_json::Value, ConnectorError> {
        if self.state.lock().status != AuthStatus::Authenticated {
            return Err(ConnectorError::NotAuthenticated);
        }
        self.sdk
            .request(integration, path, request)
            .await
            .map_err(ConnectorError::Request)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.sdk.subscribe()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().config == ConfigState::Ready
    }

    pub fn is_loading(&self) -> bool {
        let state = self.state.lock();
        state.config == ConfigState::Configuring || state.status == AuthStatus::Authenticating
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }
}
