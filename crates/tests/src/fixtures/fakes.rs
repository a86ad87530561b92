use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use drivelink_services::connector::{
    ConnectorAuthManager, ConnectorEvent, ConnectorSdk, ProxyRequest,
};
use drivelink_services::picker::{
    CapabilityLoader, ConsentPrompt, ConsentResponse, FolderChooser, FolderEntry,
    FolderPickerManager, OAuthTokenFlow, PickedDocument, PickerAction, PickerConfig, PickerError,
    PickerWidget,
};
use drivelink_services::sync::{
    RemoteSyncStatus, StatusFetchError, SyncConfigError, SyncConfigResponse, SyncConfigurator,
    SyncRequest, SyncStatusPoller, SyncStatusSource,
};
use drivelink_services::token::{TokenError, TokenSource};
use drivelink_services::{IntegrationOrchestrator, SessionContext};
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};

pub const PROJECT_ID: &str = "project-1";
pub const SDK_HOST: &str = "https://zeus.example.com";

/// Hands out scripted tokens in order; the default is always "abc".
#[derive(Default)]
pub struct ScriptedTokens {
    pub responses: Mutex<VecDeque<Result<String, TokenError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedTokens {
    pub fn push(&self, response: Result<String, TokenError>) {
        self.responses.lock().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for ScriptedTokens {
    async fn generate_token(&self, _user_id: &str) -> Result<String, TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("abc".to_string()))
    }
}

/// Connector SDK double that records every call.
pub struct ScriptedSdk {
    pub configure_result: Mutex<Result<(), String>>,
    pub configure_calls: AtomicUsize,
    pub auth_results: Mutex<VecDeque<Result<(), String>>>,
    /// (project_id, credential) per authenticate call.
    pub auth_calls: Mutex<Vec<(String, String)>>,
    pub requests: Mutex<Vec<(String, String)>>,
    pub events: broadcast::Sender<ConnectorEvent>,
}

impl Default for ScriptedSdk {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            configure_result: Mutex::new(Ok(())),
            configure_calls: AtomicUsize::new(0),
            auth_results: Mutex::new(VecDeque::new()),
            auth_calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            events,
        }
    }
}

impl ScriptedSdk {
    pub fn fail_next_auth(&self, reason: &str) {
        self.auth_results.lock().push_back(Err(reason.to_string()));
    }

    pub fn emit(&self, event: ConnectorEvent) {
        let _ = self.events.send(event);
    }

    pub fn auth_calls(&self) -> Vec<(String, String)> {
        self.auth_calls.lock().clone()
    }
}

#[async_trait]
impl ConnectorSdk for ScriptedSdk {
    async fn configure(&self, _host: &str, _project_id: &str) -> Result<(), String> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        self.configure_result.lock().clone()
    }

    async fn authenticate(&self, project_id: &str, credential: &str) -> Result<(), String> {
        self.auth_calls
            .lock()
            .push((project_id.to_string(), credential.to_string()));
        self.auth_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn request(
        &self,
        integration: &str,
        path: &str,
        _request: ProxyRequest,
    ) -> Result<serde_json::Value, String> {
        self.requests
            .lock()
            .push((integration.to_string(), path.to_string()));
        Ok(serde_json::json!({ "ok": true }))
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }
}

/// Capability double; fails `failures` times with the given reason, then loads.
pub struct StubCapability {
    pub failure: Option<PickerError>,
    pub failures: AtomicUsize,
    pub loads: AtomicUsize,
}

impl StubCapability {
    pub fn ready() -> Self {
        Self {
            failure: None,
            failures: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self::failing_times(reason, usize::MAX)
    }

    pub fn failing_times(reason: &str, times: usize) -> Self {
        Self {
            failure: Some(PickerError::Capability {
                name: "stub".to_string(),
                reason: reason.to_string(),
            }),
            failures: AtomicUsize::new(times),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityLoader for StubCapability {
    fn name(&self) -> &str {
        "stub"
    }

    async fn load(&self) -> Result<(), PickerError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(err)
                if self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok() =>
            {
                Err(err.clone())
            }
            _ => Ok(()),
        }
    }
}

/// Consent double; defaults to granting "google-token".
#[derive(Default)]
pub struct ScriptedTokenFlow {
    pub responses: Mutex<VecDeque<Result<Option<String>, PickerError>>>,
    pub requests: AtomicUsize,
}

impl ScriptedTokenFlow {
    pub fn push(&self, response: Result<Option<String>, PickerError>) {
        self.responses.lock().push_back(response);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthTokenFlow for ScriptedTokenFlow {
    async fn request_access_token(&self) -> Result<Option<String>, PickerError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Some("google-token".to_string())))
    }
}

/// Widget double; each `show` pops the next scripted action (default: cancel).
pub struct ScriptedWidget {
    pub available: Mutex<bool>,
    pub actions: Mutex<VecDeque<Result<PickerAction, PickerError>>>,
    pub shows: AtomicUsize,
    pub renderer_loads: AtomicUsize,
    pub tokens_seen: Mutex<Vec<String>>,
    pub last_config: Mutex<Option<PickerConfig>>,
}

impl Default for ScriptedWidget {
    fn default() -> Self {
        Self {
            available: Mutex::new(true),
            actions: Mutex::new(VecDeque::new()),
            shows: AtomicUsize::new(0),
            renderer_loads: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
            last_config: Mutex::new(None),
        }
    }
}

impl ScriptedWidget {
    pub fn pick(&self, id: Option<&str>, name: &str, drive_id: Option<&str>) {
        self.actions
            .lock()
            .push_back(Ok(PickerAction::Picked(vec![PickedDocument {
                id: id.map(str::to_string),
                name: Some(name.to_string()),
                mime_type: Some("application/vnd.google-apps.folder".to_string()),
                drive_id: drive_id.map(str::to_string),
            }])));
    }

    pub fn cancel(&self) {
        self.actions.lock().push_back(Ok(PickerAction::Cancel));
    }

    pub fn shows(&self) -> usize {
        self.shows.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PickerWidget for ScriptedWidget {
    fn is_available(&self) -> bool {
        *self.available.lock()
    }

    async fn load_renderer(&self) -> Result<(), PickerError> {
        self.renderer_loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn show(
        &self,
        config: &PickerConfig,
        access_token: &str,
    ) -> Result<PickerAction, PickerError> {
        self.shows.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().push(access_token.to_string());
        *self.last_config.lock() = Some(config.clone());
        self.actions
            .lock()
            .pop_front()
            .unwrap_or(Ok(PickerAction::Cancel))
    }
}

/// Records sync registrations; optionally waits on a gate before replying.
#[derive(Default)]
pub struct RecordingSyncConfigurator {
    pub results: Mutex<VecDeque<Result<SyncConfigResponse, SyncConfigError>>>,
    pub calls: Mutex<Vec<SyncRequest>>,
    pub gate: Mutex<Option<Arc<Notify>>>,
}

impl RecordingSyncConfigurator {
    pub fn push(&self, result: Result<SyncConfigResponse, SyncConfigError>) {
        self.results.lock().push_back(result);
    }

    pub fn calls(&self) -> Vec<SyncRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SyncConfigurator for RecordingSyncConfigurator {
    async fn configure_sync(
        &self,
        request: &SyncRequest,
    ) -> Result<SyncConfigResponse, SyncConfigError> {
        self.calls.lock().push(request.clone());
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.results.lock().pop_front().unwrap_or_else(|| {
            Ok(SyncConfigResponse {
                sync_id: "sync-1".to_string(),
                status: None,
                message: None,
            })
        })
    }
}

/// Status source answering from a per-sync table; unknown ids fail.
#[derive(Default)]
pub struct ScriptedStatusSource {
    pub results: Mutex<HashMap<String, Result<RemoteSyncStatus, StatusFetchError>>>,
    pub calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedStatusSource {
    pub fn set(&self, sync_id: &str, result: Result<RemoteSyncStatus, StatusFetchError>) {
        self.results.lock().insert(sync_id.to_string(), result);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl SyncStatusSource for ScriptedStatusSource {
    async fn fetch_status(
        &self,
        sync_id: &str,
        user_token: Option<&str>,
    ) -> Result<RemoteSyncStatus, StatusFetchError> {
        self.calls
            .lock()
            .push((sync_id.to_string(), user_token.map(str::to_string)));
        self.results
            .lock()
            .get(sync_id)
            .cloned()
            .unwrap_or_else(|| Err(StatusFetchError::Backend { status: 404 }))
    }
}

/// Consent prompt answering with a fixed code.
pub struct FixedPrompt {
    pub code: Option<String>,
    /// Overrides the state echoed back; by default the request's own.
    pub state: Option<String>,
    pub urls: Mutex<Vec<String>>,
}

impl FixedPrompt {
    pub fn new(code: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            code: code.map(str::to_string),
            state: None,
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_state(code: &str, state: &str) -> Arc<Self> {
        Arc::new(Self {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            urls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ConsentPrompt for FixedPrompt {
    async fn authorize(&self, authorize_url: &str) -> Option<ConsentResponse> {
        self.urls.lock().push(authorize_url.to_string());
        let code = self.code.clone()?;
        let state = self.state.clone().or_else(|| {
            reqwest::Url::parse(authorize_url)
                .ok()?
                .query_pairs()
                .find(|(key, _)| key == "state")
                .map(|(_, value)| value.into_owned())
        })?;
        Some(ConsentResponse { code, state })
    }
}

/// Chooses by folder id; records what was offered.
pub struct PickById {
    pub id: Option<String>,
    pub offered: Mutex<Vec<FolderEntry>>,
}

impl PickById {
    pub fn new(id: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            id: id.map(str::to_string),
            offered: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FolderChooser for PickById {
    async fn choose(&self, folders: &[FolderEntry]) -> Option<usize> {
        *self.offered.lock() = folders.to_vec();
        let id = self.id.as_ref()?;
        folders.iter().position(|f| &f.id == id)
    }
}

pub fn session() -> SessionContext {
    SessionContext::new(
        "user-1",
        Some("workspace-1".to_string()),
        "googledrive",
        "https://hooks.example.com/drive",
    )
    .with_user_token("user-token-1")
}

pub fn auth_manager(sdk: Arc<ScriptedSdk>, tokens: Arc<ScriptedTokens>) -> ConnectorAuthManager {
    ConnectorAuthManager::new(sdk, tokens, SDK_HOST.to_string(), PROJECT_ID.to_string())
}

pub fn picker_manager(
    api: Arc<StubCapability>,
    oauth: Arc<StubCapability>,
    widget: Arc<ScriptedWidget>,
    flow: Arc<ScriptedTokenFlow>,
) -> FolderPickerManager {
    FolderPickerManager::new(
        api,
        oauth,
        widget,
        flow,
        "developer-key".to_string(),
        "app-1".to_string(),
    )
}

/// Orchestrator wired entirely to doubles.
pub struct Harness {
    pub sdk: Arc<ScriptedSdk>,
    pub tokens: Arc<ScriptedTokens>,
    pub widget: Arc<ScriptedWidget>,
    pub token_flow: Arc<ScriptedTokenFlow>,
    pub sync: Arc<RecordingSyncConfigurator>,
    pub status: Arc<ScriptedStatusSource>,
    pub orchestrator: Arc<IntegrationOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_capabilities(StubCapability::ready(), StubCapability::ready())
    }

    pub fn with_capabilities(api: StubCapability, oauth: StubCapability) -> Self {
        let sdk = Arc::new(ScriptedSdk::default());
        let tokens = Arc::new(ScriptedTokens::default());
        let widget = Arc::new(ScriptedWidget::default());
        let token_flow = Arc::new(ScriptedTokenFlow::default());
        let sync = Arc::new(RecordingSyncConfigurator::default());
        let status = Arc::new(ScriptedStatusSource::default());

        let auth = Arc::new(auth_manager(Arc::clone(&sdk), Arc::clone(&tokens)));
        let picker = Arc::new(picker_manager(
            Arc::new(api),
            Arc::new(oauth),
            Arc::clone(&widget),
            Arc::clone(&token_flow),
        ));
        let poller = SyncStatusPoller::new(status.clone(), Duration::from_secs(30));
        let orchestrator =
            IntegrationOrchestrator::new(session(), auth, picker, sync.clone(), poller);

        Self {
            sdk,
            tokens,
            widget,
            token_flow,
            sync,
            status,
            orchestrator,
        }
    }

    /// Builds the harness and runs `start()`.
    pub async fn started() -> Self {
        let harness = Self::new();
        harness.orchestrator.start().await;
        harness
    }
}
