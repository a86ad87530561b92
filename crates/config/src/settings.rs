use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub paragon: ParagonSettings,
    pub google: GoogleSettings,
    pub sync: SyncSettings,
}

/// Backend that issues SDK credentials and registers syncs.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParagonSettings {
    /// Tenant the connector SDK authenticates against.
    pub project_id: String,
    /// Deployment host the SDK is configured with.
    pub host: String,
    pub proxy_host: String,
    /// Integration key of the connected provider.
    pub integration: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleSettings {
    /// Developer key handed to the folder picker.
    pub api_key: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub app_id: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub scope: String,
    pub drive_api_url: String,
    pub api_discovery_url: String,
    pub oauth_discovery_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    /// Endpoint the backend notifies when synced content changes.
    pub webhook_url: String,
    pub status_base_url: String,
    pub poll_interval_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("DRIVELINK"),
            )
            .set_default("api.base_url", "")?
            .set_default("api.timeout_secs", 30)?
            .set_default("paragon.project_id", "")?
            .set_default("paragon.host", "https://zeus.useparagon.com")?
            .set_default("paragon.proxy_host", "https://proxy.useparagon.com")?
            .set_default("paragon.integration", "googledrive")?
            .set_default("google.api_key", "")?
            .set_default("google.client_id", "")?
            .set_default("google.client_secret", None::<String>)?
            .set_default("google.app_id", "")?
            .set_default("google.redirect_uri", "http://localhost")?
            .set_default("google.auth_url", "https://accounts.google.com/o/oauth2/v2/auth")?
            .set_default("google.token_url", "https://oauth2.googleapis.com/token")?
            .set_default("google.scope", "https://www.googleapis.com/auth/drive.readonly")?
            .set_default("google.drive_api_url", "https://www.googleapis.com/drive/v3")?
            .set_default(
                "google.api_discovery_url",
                "https://www.googleapis.com/discovery/v1/apis/drive/v3/rest",
            )?
            .set_default(
                "google.oauth_discovery_url",
                "https://accounts.google.com/.well-known/openid-configuration",
            )?
            .set_default("sync.webhook_url", "")?
            .set_default("sync.status_base_url", "https://sync.useparagon.com/api")?
            .set_default("sync.poll_interval_secs", 30)?
            .build()?;

        config.try_deserialize()
    }

    /// Dotted names of required values that are empty or malformed.
    ///
    /// A non-empty result must block every flow until the process is
    /// restarted with corrected values.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !is_absolute_http_url(&self.api.base_url) {
            missing.push("api.base_url");
        }
        if self.api.timeout_secs == 0 {
            missing.push("api.timeout_secs");
        }
        if self.paragon.project_id.trim().is_empty() {
            missing.push("paragon.project_id");
        }
        if !is_absolute_http_url(&self.paragon.host) {
            missing.push("paragon.host");
        }
        if self.google.api_key.trim().is_empty() {
            missing.push("google.api_key");
        }
        if self.google.client_id.trim().is_empty() {
            missing.push("google.client_id");
        }
        if self.google.app_id.trim().is_empty() {
            missing.push("google.app_id");
        }
        if !is_absolute_http_url(&self.sync.webhook_url) {
            missing.push("sync.webhook_url");
        }
        if self.sync.poll_interval_secs == 0 {
            missing.push("sync.poll_interval_secs");
        }
        missing
    }
}

/// `http://` or `https://` followed by a non-empty host.
pub fn is_absolute_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty() && !host.starts_with(':')
        }
        None => false,
    }
}
