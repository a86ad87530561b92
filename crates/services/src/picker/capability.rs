use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::PickerError;

/// An external dependency the picker needs before it can open.
#[async_trait]
pub trait CapabilityLoader: Send + Sync {
    fn name(&self) -> &str;

    /// Resolves once the capability is usable.
    async fn load(&self) -> Result<(), PickerError>;
}

/// Capability considered loaded when its discovery URL answers with success.
pub struct HttpCapability {
    client: Client,
    name: String,
    url: String,
}

impl HttpCapability {
    pub fn new(client: Client, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl CapabilityLoader for HttpCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<(), PickerError> {
        debug!(capability = %self.name, url = %self.url, "Probing capability");
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PickerError::Capability {
                name: self.name.clone(),
                reason: e.to_string(),
            })?;
        if !resp.status().is_success() {
            return Err(PickerError::Capability {
                name: self.name.clone(),
                reason: format!("HTTP {}", resp.status().as_u16()),
            });
        }
        Ok(())
    }
}
