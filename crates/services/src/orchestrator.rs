use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use crate::connector::{ConnectorAuthManager, ConnectorEvent};
use crate::picker::{FolderPickerManager, PickerOutcome, SelectedFolder};
use crate::session::SessionContext;
use crate::sync::{SyncConfigurator, SyncRequest, SyncStatus, SyncStatusPoller};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Disconnected,
    Authenticating,
    Picking,
    Configuring,
    Connected,
    Errored,
    /// Required configuration is missing; no flow may start.
    Misconfigured,
}

/// Aggregate view for presentation layers. Derived on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationState {
    pub phase: Phase,
    pub is_connected: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    pub synced_folder: Option<SelectedFolder>,
    pub sync_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    Connected { folder: SelectedFolder, sync_id: String },
    Cancelled,
    Failed(String),
    /// Another flow is already in flight.
    Busy,
    /// Configuration is incomplete.
    Blocked(String),
    /// A folder is already synced; `change_folder` first.
    AlreadyConnected,
}

struct Inner {
    phase: Phase,
    error: Option<String>,
    blocked: Option<String>,
    synced_folder: Option<SelectedFolder>,
    sync_id: Option<String>,
}

/// Composes authentication, folder picking and sync registration into the
/// connect flow and owns the resulting `IntegrationState`.
pub struct IntegrationOrchestrator {
    session: SessionContext,
    auth: Arc<ConnectorAuthManager>,
    picker: Arc<FolderPickerManager>,
    sync: Arc<dyn SyncConfigurator>,
    poller: Arc<SyncStatusPoller>,
    inner: Mutex<Inner>,
    in_flight: AtomicBool,
    state_tx: watch::Sender<IntegrationState>,
    events: Mutex<Option<tokio::task::AbortHandle>>,
}

impl IntegrationOrchestrator {
    pub fn new(
        session: SessionContext,
        auth: Arc<ConnectorAuthManager>,
        picker: Arc<FolderPickerManager>,
        sync: Arc<dyn SyncConfigurator>,
        poller: Arc<SyncStatusPoller>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(IntegrationState {
            phase: Phase::Disconnected,
            is_connected: false,
            is_loading: false,
            error: None,
            synced_folder: None,
            sync_id: None,
        });
        Arc::new(Self {
            session,
            auth,
            picker,
            sync,
            poller,
            inner: Mutex::new(Inner {
                phase: Phase::Disconnected,
                error: None,
                blocked: None,
                synced_folder: None,
                sync_id: None,
            }),
            in_flight: AtomicBool::new(false),
            state_tx,
            events: Mutex::new(None),
        })
    }

    /// Puts the orchestrator in the blocking `Misconfigured` phase.
    pub fn block_on_configuration(&self, missing: &[&str]) {
        let reason = format!("Configuration error: missing or invalid {}", missing.join(", "));
        error!(%reason, "Integration flows blocked");
        {
            let mut inner = self.inner.lock();
            inner.phase = Phase::Misconfigured;
            inner.blocked = Some(reason);
        }
        self.publish();
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn poller(&self) -> &Arc<SyncStatusPoller> {
        &self.poller
    }

    /// Configures the SDK, loads picker dependencies, subscribes to
    /// connector events and starts status polling.
    pub async fn start(self: &Arc<Self>) {
        if self.inner.lock().blocked.is_some() {
            return;
        }

        self.auth.initialize().await;
        if let Err(err) = self.picker.load().await {
            warn!(error = %err, "Folder picker unavailable at startup");
        }
        self.subscribe_events();
        self.poller.start();
        self.publish();
    }

    fn subscribe_events(self: &Arc<Self>) {
        let mut events = self.events.lock();
        if events.is_some() {
            return;
        }

        let mut rx = self.auth.subscribe();
        let orchestrator = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(orchestrator) = orchestrator.upgrade() else {
                            break;
                        };
                        orchestrator.handle_event(event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Connector event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *events = Some(handle.abort_handle());
    }

    fn handle_event(&self, event: ConnectorEvent) {
        match event {
            ConnectorEvent::Installed { integration } => {
                info!(%integration, "Integration installed");
            }
            ConnectorEvent::Uninstalled { integration } => {
                info!(%integration, "Integration uninstalled");
                if integration != self.session.integration_id
                    || self.in_flight.load(Ordering::Acquire)
                {
                    return;
                }
                let connected = self.inner.lock().phase == Phase::Connected;
                if connected {
                    self.reset_to_disconnected();
                }
            }
        }
    }

    /// Runs authenticate, pick and configure in order. Never returns an
    /// error: failures land in the state's error field. Refused while a
    /// folder is already connected.
    pub async fn connect(&self) -> FlowOutcome {
        if let Some(reason) = self.inner.lock().blocked.clone() {
            return FlowOutcome::Blocked(reason);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return FlowOutcome::Busy;
        }
        if self.inner.lock().phase == Phase::Connected {
            self.in_flight.store(false, Ordering::Release);
            return FlowOutcome::AlreadyConnected;
        }

        let outcome = self.run_flow().await;

        self.in_flight.store(false, Ordering::Release);
        self.publish();
        outcome
    }

    async fn run_flow(&self) -> FlowOutcome {
        {
            let mut inner = self.inner.lock();
            inner.phase = Phase::Authenticating;
            inner.error = None;
            inner.synced_folder = None;
            inner.sync_id = None;
        }
        self.publish();

        if let Err(err) = self.auth.authenticate(&self.session.user_id).await {
            return self.fail(err.to_string());
        }

        self.set_phase(Phase::Picking);
        if !self.picker.is_loaded() {
            if let Err(err) = self.picker.load().await {
                warn!(error = %err, "Folder picker dependencies still unavailable");
            }
        }
        let folder = match self.picker.open_picker().await {
            Ok(PickerOutcome::Picked(folder)) => folder,
            Ok(PickerOutcome::Cancelled) => {
                info!(user_id = %self.session.user_id, "Folder selection cancelled");
                self.set_phase(Phase::Disconnected);
                return FlowOutcome::Cancelled;
            }
            Err(err) => return self.fail(err.to_string()),
        };

        self.set_phase(Phase::Configuring);
        let request = SyncRequest {
            workspace_id: self.session.workspace_id.clone(),
            user_id: self.session.user_id.clone(),
            integration_id: self.session.integration_id.clone(),
            folder_id: folder.id.clone(),
            drive_id: folder.drive_id.clone(),
            webhook_url: self.session.webhook_url.clone(),
            user_token: self.session.user_token.clone(),
        };

        match self.sync.configure_sync(&request).await {
            Ok(response) => {
                self.poller.track(
                    SyncStatus::initializing(
                        response.sync_id.clone(),
                        self.session.integration_id.clone(),
                        folder.id.clone(),
                        response.message,
                    ),
                    self.session.user_token.clone(),
                );
                {
                    let mut inner = self.inner.lock();
                    inner.phase = Phase::Connected;
                    inner.synced_folder = Some(folder.clone());
                    inner.sync_id = Some(response.sync_id.clone());
                }
                info!(
                    sync_id = %response.sync_id,
                    folder_id = %folder.id,
                    location = folder.location_label(),
                    "Integration connected"
                );
                FlowOutcome::Connected {
                    folder,
                    sync_id: response.sync_id,
                }
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    fn fail(&self, message: String) -> FlowOutcome {
        error!(user_id = %self.session.user_id, %message, "Integration flow failed");
        {
            let mut inner = self.inner.lock();
            inner.phase = Phase::Errored;
            inner.error = Some(message.clone());
        }
        FlowOutcome::Failed(message)
    }

    fn set_phase(&self, phase: Phase) {
        self.inner.lock().phase = phase;
        self.publish();
    }

    /// Drops the current connection so the user can pick another folder.
    /// Ignored while a flow is in flight.
    pub fn change_folder(&self) -> bool {
        if self.in_flight.load(Ordering::Acquire) {
            return false;
        }
        self.reset_to_disconnected();
        true
    }

    fn reset_to_disconnected(&self) {
        self.auth.reset_auth();
        self.picker.reset_picker();
        {
            let mut inner = self.inner.lock();
            if inner.blocked.is_none() {
                inner.phase = Phase::Disconnected;
            }
            inner.error = None;
            inner.synced_folder = None;
            inner.sync_id = None;
        }
        info!(user_id = %self.session.user_id, "Integration reset");
        self.publish();
    }

    /// Clears the orchestrator's own error. Component errors persist until
    /// their operation is retried.
    pub fn dismiss_error(&self) {
        {
            let mut inner = self.inner.lock();
            inner.error = None;
            if inner.phase == Phase::Errored {
                inner.phase = Phase::Disconnected;
            }
        }
        self.publish();
    }

    pub fn state(&self) -> IntegrationState {
        let (phase, local_error, synced_folder, sync_id) = {
            let inner = self.inner.lock();
            (
                inner.phase,
                inner.blocked.clone().or_else(|| inner.error.clone()),
                inner.synced_folder.clone(),
                inner.sync_id.clone(),
            )
        };
        let is_loading = self.in_flight.load(Ordering::Acquire)
            || self.auth.is_loading()
            || self.picker.is_loading();
        let error = local_error
            .or_else(|| self.auth.error())
            .or_else(|| self.picker.error());

        IntegrationState {
            phase,
            is_connected: phase == Phase::Connected,
            is_loading,
            error,
            synced_folder,
            sync_id,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<IntegrationState> {
        self.state_tx.subscribe()
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state());
    }

    /// Unsubscribes from connector events and stops status polling.
    pub fn shutdown(&self) {
        if let Some(handle) = self.events.lock().take() {
            handle.abort();
        }
        self.poller.shutdown();
        info!("Integration orchestrator shut down");
    }
}

impl Drop for IntegrationOrchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.events.get_mut().take() {
            handle.abort();
        }
        self.poller.stop();
    }
}
