use std::collections::HashMap;

use async_trait::async_trait;
use drivelink_config::is_absolute_http_url;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::debug;

use super::{ConnectorEvent, ConnectorSdk, ProxyRequest};

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    integrations: HashMap<String, IntegrationInfo>,
}

#[derive(Debug, Deserialize)]
struct IntegrationInfo {
    #[serde(default)]
    enabled: bool,
}

#[derive(Default)]
struct Session {
    host: Option<String>,
    project_id: Option<String>,
    credential: Option<String>,
    integrations: HashMap<String, bool>,
}

/// Connector SDK spoken over the Paragon HTTP surface.
pub struct ParagonConnector {
    client: Client,
    proxy_host: String,
    session: Mutex<Session>,
    events: broadcast::Sender<ConnectorEvent>,
}

impl ParagonConnector {
    pub fn new(client: Client, proxy_host: &str) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            client,
            proxy_host: proxy_host.trim_end_matches('/').to_string(),
            session: Mutex::new(Session::default()),
            events,
        }
    }

    fn publish_changes(&self, latest: HashMap<String, bool>) {
        let previous = {
            let mut session = self.session.lock();
            std::mem::replace(&mut session.integrations, latest.clone())
        };

        for (integration, enabled) in &latest {
            let was_enabled = previous.get(integration).copied().unwrap_or(false);
            let event = match (was_enabled, *enabled) {
                (false, true) => ConnectorEvent::Installed {
                    integration: integration.clone(),
                },
                (true, false) => ConnectorEvent::Uninstalled {
                    integration: integration.clone(),
                },
                _ => continue,
            };
            debug!(?event, "Connector integration changed");
            let _ = self.events.send(event);
        }
        for (integration, was_enabled) in previous {
            if was_enabled && !latest.contains_key(&integration) {
                let _ = self.events.send(ConnectorEvent::Uninstalled { integration });
            }
        }
    }
}

fn rejection(status: reqwest::StatusCode, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Request rejected");
    if body.trim().is_empty() {
        reason.to_string()
    } else {
        format!("{}: {}", reason, body.trim())
    }
}

#[async_trait]
impl ConnectorSdk for ParagonConnector {
    async fn configure(&self, host: &str, project_id: &str) -> Result<(), String> {
        if !is_absolute_http_url(host) {
            return Err(format!("Invalid deployment host: {:?}", host));
        }
        if project_id.trim().is_empty() {
            return Err("Missing project id".to_string());
        }
        let mut session = self.session.lock();
        session.host = Some(host.trim_end_matches('/').to_string());
        session.project_id = Some(project_id.to_string());
        Ok(())
    }

    async fn authenticate(&self, project_id: &str, credential: &str) -> Result<(), String> {
        let host = self
            .session
            .lock()
            .host
            .clone()
            .ok_or_else(|| "SDK is not configured".to_string())?;

        let resp = self
            .client
            .get(format!("{}/projects/{}/sdk/me", host, project_id))
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(rejection(status, &body));
        }

        let me: MeResponse = resp
            .json()
            .await
            .map_err(|e| format!("Failed to parse user: {}", e))?;
        if !me.authenticated {
            return Err("Unauthorized".to_string());
        }

        {
            let mut session = self.session.lock();
            session.project_id = Some(project_id.to_string());
            session.credential = Some(credential.to_string());
        }
        self.publish_changes(
            me.integrations
                .into_iter()
                .map(|(name, info)| (name, info.enabled))
                .collect(),
        );
        Ok(())
    }

    async fn request(
        &self,
        integration: &str,
        path: &str,
        request: ProxyRequest,
    ) -> Result<serde_json::Value, String> {
        let (project_id, credential) = {
            let session = self.session.lock();
            match (&session.project_id, &session.credential) {
                (Some(project), Some(credential)) => (project.clone(), credential.clone()),
                _ => return Err("SDK session is not authenticated".to_string()),
            }
        };

        let url = format!(
            "{}/projects/{}/sdk/proxy/{}/{}",
            self.proxy_host,
            project_id,
            integration,
            path.trim_start_matches('/')
        );
        debug!(%integration, method = %request.method, %url, "Proxy request");

        let mut builder = self
            .client
            .request(request.method, &url)
            .bearer_auth(&credential);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {}", e))?;
        if !status.is_success() {
            return Err(rejection(status, &text));
        }
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| format!("Failed to parse response: {}", e))
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }
}
