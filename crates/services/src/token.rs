use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TokenError {
    #[error("Token request failed with HTTP {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("Token request failed: network error ({0})")]
    Network(String),
    #[error("Token response was invalid: {0}")]
    InvalidResponse(String),
}

/// Source of short-lived credentials for the connector SDK.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Issues a fresh credential for `user_id`. Never cached.
    async fn generate_token(&self, user_id: &str) -> Result<String, TokenError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Requests SDK credentials from `POST {base}/paragon/token`.
pub struct TokenProvider {
    client: Client,
    base_url: String,
}

impl TokenProvider {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn generate_token(&self, user_id: &str) -> Result<String, TokenError> {
        let url = format!("{}/paragon/token", self.base_url);
        debug!(%user_id, %url, "Requesting connector token");

        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "userId": user_id }))
            .send()
            .await
            .map_err(|e| TokenError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(%user_id, status = status.as_u16(), "Token request rejected");
            return Err(TokenError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| TokenError::InvalidResponse(e.to_string()))?;
        if body.token.is_empty() {
            return Err(TokenError::InvalidResponse("empty token".to_string()));
        }
        Ok(body.token)
    }
}
