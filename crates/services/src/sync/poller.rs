use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::status::{RemoteSyncStatus, StatusFetchError, SyncStatusSource};
use super::{SyncState, SyncStatus, FETCH_FAILED_MESSAGE};

/// Published whenever a tracked sync is added or its status is refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatusUpdate {
    pub previous: Option<SyncState>,
    pub current: SyncStatus,
}

struct TrackedSync {
    status: SyncStatus,
    user_token: Option<String>,
}

/// Owns the tracked syncs and refreshes them on a fixed interval.
///
/// Consumers read snapshots or subscribe to updates; nothing outside the
/// poller mutates the collection except `track`.
pub struct SyncStatusPoller {
    source: Arc<dyn SyncStatusSource>,
    interval: Duration,
    tracked: DashMap<String, TrackedSync>,
    updates: broadcast::Sender<SyncStatusUpdate>,
    task: Mutex<Option<tokio::task::AbortHandle>>,
}

impl SyncStatusPoller {
    pub fn new(source: Arc<dyn SyncStatusSource>, interval: Duration) -> Arc<Self> {
        let (updates, _) = broadcast::channel(64);
        Arc::new(Self {
            source,
            interval,
            tracked: DashMap::new(),
            updates,
            task: Mutex::new(None),
        })
    }

    /// Starts tracking a sync, replacing any entry with the same id.
    pub fn track(&self, status: SyncStatus, user_token: Option<String>) {
        let previous = self
            .tracked
            .insert(
                status.sync_id.clone(),
                TrackedSync {
                    status: status.clone(),
                    user_token,
                },
            )
            .map(|old| old.status.status);
        info!(sync_id = %status.sync_id, status = ?status.status, "Tracking sync");
        let _ = self.updates.send(SyncStatusUpdate {
            previous,
            current: status,
        });
    }

    pub fn get(&self, sync_id: &str) -> Option<SyncStatus> {
        self.tracked.get(sync_id).map(|entry| entry.status.clone())
    }

    /// All tracked syncs ordered by id.
    pub fn snapshot(&self) -> Vec<SyncStatus> {
        let mut all: Vec<SyncStatus> = self
            .tracked
            .iter()
            .map(|entry| entry.status.clone())
            .collect();
        all.sort_by(|a, b| a.sync_id.cmp(&b.sync_id));
        all
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatusUpdate> {
        self.updates.subscribe()
    }

    /// Fetches every pollable sync concurrently and merges the results.
    ///
    /// `ERRORED` entries stay put until a new registration re-tracks them.
    /// Returns the number of status requests issued.
    pub async fn poll_once(&self) -> usize {
        let targets: Vec<(String, Option<String>)> = self
            .tracked
            .iter()
            .filter(|entry| entry.status.status != SyncState::Errored)
            .map(|entry| (entry.key().clone(), entry.user_token.clone()))
            .collect();
        if targets.is_empty() {
            return 0;
        }

        debug!(count = targets.len(), "Polling sync statuses");
        let results = join_all(targets.iter().map(|(sync_id, token)| async move {
            let result = self.source.fetch_status(sync_id, token.as_deref()).await;
            (sync_id, result)
        }))
        .await;

        for (sync_id, result) in results {
            self.apply(sync_id, result);
        }
        targets.len()
    }

    fn apply(&self, sync_id: &str, result: Result<RemoteSyncStatus, StatusFetchError>) {
        let Some(mut entry) = self.tracked.get_mut(sync_id) else {
            debug!(%sync_id, "Ignoring status for untracked sync");
            return;
        };
        let previous = entry.status.status;

        match result {
            Ok(remote) => {
                entry.status.status = remote.status;
                entry.status.message = remote.message;
                entry.status.last_synced_at = remote.summary.last_synced_at;
                entry.status.synced_records_count = remote.summary.synced_records_count;
                entry.status.total_records = remote.summary.total_records;
            }
            Err(error) => {
                warn!(%sync_id, %error, "Sync status fetch failed");
                entry.status.status = SyncState::Errored;
                entry.status.message = Some(FETCH_FAILED_MESSAGE.to_string());
            }
        }

        let current = entry.status.clone();
        drop(entry);
        if previous != current.status {
            info!(%sync_id, from = ?previous, to = ?current.status, "Sync status changed");
        }
        let _ = self.updates.send(SyncStatusUpdate {
            previous: Some(previous),
            current,
        });
    }

    /// Spawns the interval loop. The first poll happens one interval after
    /// start. Calling `start` while running is a no-op. A zero interval is
    /// refused and leaves the poller stopped.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock();
        if task.is_some() {
            return true;
        }
        if self.interval.is_zero() {
            error!("Sync status poller not started: poll interval is zero");
            return false;
        }

        let poller = Arc::downgrade(self);
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(poller) = poller.upgrade() else {
                    break;
                };
                poller.poll_once().await;
            }
        });
        *task = Some(handle.abort_handle());
        info!(interval_secs = period.as_secs_f64(), "Sync status poller started");
        true
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!("Sync status poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Stops polling and forgets every tracked sync.
    pub fn shutdown(&self) {
        self.stop();
        self.tracked.clear();
    }
}

impl Drop for SyncStatusPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
