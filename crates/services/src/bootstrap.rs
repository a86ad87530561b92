use std::sync::Arc;
use std::time::Duration;

use drivelink_config::Settings;
use reqwest::Client;

use crate::connector::{ConnectorAuthManager, ParagonConnector};
use crate::orchestrator::IntegrationOrchestrator;
use crate::picker::{
    ConsentPrompt, DriveFolderWidget, FolderChooser, FolderPickerManager, GoogleOAuthFlow,
    HttpCapability,
};
use crate::session::SessionContext;
use crate::sync::{HttpSyncStatusSource, SyncConfigClient, SyncStatusPoller};
use crate::token::TokenProvider;

pub fn http_client(settings: &Settings) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(settings.api.timeout_secs))
        .build()
}

/// Wires the HTTP-backed components from settings.
///
/// Missing required settings do not fail construction: the orchestrator is
/// returned in its blocking `Misconfigured` phase instead.
pub fn build_orchestrator(
    settings: &Settings,
    session: SessionContext,
    prompt: Arc<dyn ConsentPrompt>,
    chooser: Arc<dyn FolderChooser>,
) -> reqwest::Result<Arc<IntegrationOrchestrator>> {
    let client = http_client(settings)?;

    let auth = Arc::new(ConnectorAuthManager::new(
        Arc::new(ParagonConnector::new(client.clone(), &settings.paragon.proxy_host)),
        Arc::new(TokenProvider::new(client.clone(), &settings.api.base_url)),
        settings.paragon.host.clone(),
        settings.paragon.project_id.clone(),
    ));

    let google = &settings.google;
    let token_flow = Arc::new(GoogleOAuthFlow::new(
        client.clone(),
        google.client_id.clone(),
        google.client_secret.clone(),
        google.redirect_uri.clone(),
        google.auth_url.clone(),
        google.token_url.clone(),
        google.scope.clone(),
        prompt,
    ));
    let widget = Arc::new(DriveFolderWidget::new(
        client.clone(),
        &google.drive_api_url,
        google.api_key.clone(),
        chooser,
    ));
    let picker = Arc::new(FolderPickerManager::new(
        Arc::new(HttpCapability::new(
            client.clone(),
            "Google API loader",
            google.api_discovery_url.clone(),
        )),
        Arc::new(HttpCapability::new(
            client.clone(),
            "Google OAuth client",
            google.oauth_discovery_url.clone(),
        )),
        widget,
        token_flow,
        google.api_key.clone(),
        google.app_id.clone(),
    ));

    let sync = Arc::new(SyncConfigClient::new(client.clone(), &settings.api.base_url));
    let poller = SyncStatusPoller::new(
        Arc::new(HttpSyncStatusSource::new(client, &settings.sync.status_base_url)),
        Duration::from_secs(settings.sync.poll_interval_secs),
    );

    let orchestrator = IntegrationOrchestrator::new(session, auth, picker, sync, poller);
    let missing = settings.missing_required();
    if !missing.is_empty() {
        orchestrator.block_on_configuration(&missing);
    }
    Ok(orchestrator)
}
