use serde::{Deserialize, Serialize};

/// Identity context for one orchestration, created once when the flow
/// starts and threaded through every call that needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub workspace_id: String,
    pub user_id: String,
    pub integration_id: String,
    pub webhook_url: String,
    /// Per-user token the backend uses to query sync status.
    pub user_token: Option<String>,
}

impl SessionContext {
    /// Builds a session; a missing workspace id gets a fresh UUID.
    pub fn new(
        user_id: impl Into<String>,
        workspace_id: Option<String>,
        integration_id: impl Into<String>,
        webhook_url: impl Into<String>,
    ) -> Self {
        let workspace_id = workspace_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            workspace_id,
            user_id: user_id.into(),
            integration_id: integration_id.into(),
            webhook_url: webhook_url.into(),
            user_token: None,
        }
    }

    pub fn with_user_token(mut self, token: impl Into<String>) -> Self {
        self.user_token = Some(token.into());
        self
    }
}
