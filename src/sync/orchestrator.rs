//! Sync orchestrator.
//!
//! Drives upload (queue → remote) and download (remote → local store)
//! passes. At most one session runs at a time: starting a session while
//! another is `Syncing` returns a rejected [`SyncReport`] immediately.
//!
//! Error policy:
//! - item and table failures are counted in the report and never returned
//!   as `Err`
//! - storage failures abort the session with `Err` and leave the status at
//!   `Error` before it returns to `Idle`
//! - an unconfigured remote is rejected before any state change

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{EntityType, Operation, QueueItem, QueueStatus, Record};
use crate::storage::LocalStore;
use crate::sync::notifier::{ListenerId, ListenerRegistry};
use crate::sync::remote::{RemoteApi, RemoteError};
use crate::sync::types::{SyncReport, SyncStatus};

pub const ALREADY_SYNCING: &str = "Sync already in progress";
pub const NOT_CONFIGURED: &str = "Supabase is not configured";

/// Coordinates sync passes against one local store and one remote.
pub struct SyncOrchestrator<R> {
    store: Arc<LocalStore>,
    remote: Arc<R>,
    status: Mutex<SyncStatus>,
    listeners: ListenerRegistry<SyncStatus>,
    default_tables: Vec<EntityType>,
}

fn set_status(status: &Mutex<SyncStatus>, listeners: &ListenerRegistry<SyncStatus>, next: SyncStatus) {
    *status.lock().unwrap_or_else(PoisonError::into_inner) = next;
    debug!(status = %next, "Sync status changed");
    listeners.notify(&next);
}

/// Returns a session dropped before completion to `Idle` through `Error`.
struct SessionGuard<'a> {
    name: &'static str,
    status: &'a Mutex<SyncStatus>,
    listeners: &'a ListenerRegistry<SyncStatus>,
    finished: bool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(session = self.name, "Sync session cancelled");
        set_status(self.status, self.listeners, SyncStatus::Error);
        set_status(self.status, self.listeners, SyncStatus::Idle);
    }
}

impl<R: RemoteApi> SyncOrchestrator<R> {
    /// Create an orchestrator that downloads every entity type by default.
    pub fn new(store: Arc<LocalStore>, remote: Arc<R>) -> Self {
        Self {
            store,
            remote,
            status: Mutex::new(SyncStatus::Idle),
            listeners: ListenerRegistry::new(),
            default_tables: EntityType::ALL.to_vec(),
        }
    }

    /// Override the tables used by `sync_from_remote(None)` and `full_sync`.
    #[must_use]
    pub fn with_default_tables(mut self, tables: Vec<EntityType>) -> Self {
        self.default_tables = tables;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    #[must_use]
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    #[must_use]
    pub fn default_tables(&self) -> &[EntityType] {
        &self.default_tables
    }

    /// Current session state.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a status listener, called on every transition.
    pub fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ====================
    // Session state
    // ====================

    fn transition(&self, next: SyncStatus) {
        set_status(&self.status, &self.listeners, next);
    }

    /// `Idle → Syncing`. Returns false if a session is already running.
    fn try_begin(&self) -> bool {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if *status == SyncStatus::Syncing {
                return false;
            }
            *status = SyncStatus::Syncing;
        }
        debug!(status = %SyncStatus::Syncing, "Sync status changed");
        self.listeners.notify(&SyncStatus::Syncing);
        true
    }

    async fn run_session<F>(&self, name: &'static str, work: F) -> Result<SyncReport>
    where
        F: Future<Output = Result<SyncReport>>,
    {
        if !self.remote.is_configured() {
            warn!(session = name, "Sync skipped: remote not configured");
            return Ok(SyncReport::rejected(NOT_CONFIGURED));
        }
        if !self.try_begin() {
            info!(session = name, "Sync rejected: already in progress");
            return Ok(SyncReport::rejected(ALREADY_SYNCING));
        }

        let mut guard = SessionGuard {
            name,
            status: &self.status,
            listeners: &self.listeners,
            finished: false,
        };
        info!(session = name, "Sync session started");
        let outcome = work.await;
        guard.finished = true;

        match &outcome {
            Ok(report) => {
                info!(
                    session = name,
                    synced = report.synced,
                    failed = report.failed,
                    "Sync session finished"
                );
                self.transition(SyncStatus::Success);
            }
            Err(e) => {
                warn!(session = name, error = %e, "Sync session failed");
                self.transition(SyncStatus::Error);
            }
        }
        self.transition(SyncStatus::Idle);

        outcome
    }

    // ====================
    // Public sessions
    // ====================

    /// Upload every eligible queue item.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures.
    pub async fn sync_to_remote(&self) -> Result<SyncReport> {
        self.run_session("upload", self.upload_pass()).await
    }

    /// Download active snapshots for `tables` (default tables when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures.
    pub async fn sync_from_remote(&self, tables: Option<&[EntityType]>) -> Result<SyncReport> {
        let tables = tables.unwrap_or(self.default_tables.as_slice());
        self.run_session("download", self.download_pass(tables)).await
    }

    /// Upload, then download, in one session.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures.
    pub async fn full_sync(&self) -> Result<SyncReport> {
        self.run_session("full", async {
            let up = self.upload_pass().await?;
            let down = self.download_pass(&self.default_tables).await?;
            Ok(up.merge(down))
        })
        .await
    }

    /// Refresh one record from the remote, bypassing the queue.
    ///
    /// Not guarded by the session state; races with a running session are
    /// resolved by whichever local write lands last. A record missing on the
    /// remote leaves the local store untouched, since it may be an offline
    /// write still waiting in the queue.
    ///
    /// # Errors
    ///
    /// Returns a remote error if the fetch fails or the remote is not
    /// configured, or a storage error if the local write fails.
    pub async fn sync_entity(&self, entity_type: EntityType, id: &str) -> Result<Option<Record>> {
        if !self.remote.is_configured() {
            return Err(RemoteError::NotConfigured.into());
        }

        let fetched = self.remote.fetch_one(entity_type, id).await?;
        if let Some(record) = &fetched {
            self.store.put(entity_type, record)?;
        }
        debug!(entity_type = %entity_type, id, found = fetched.is_some(), "Refreshed entity");
        Ok(fetched)
    }

    // ====================
    // Passes
    // ====================

    async fn upload_pass(&self) -> Result<SyncReport> {
        let recovered = self.store.recover_interrupted()?;
        if recovered > 0 {
            info!(recovered, "Recovered queue items left processing by an interrupted session");
        }

        let items = self.store.dequeue_pending()?;
        let mut synced = 0;
        let mut errors = Vec::new();

        for item in items {
            self.store.update_status(&item.id, QueueStatus::Processing, None)?;

            match self.push_item(&item).await {
                Ok(()) => {
                    self.store.update_status(&item.id, QueueStatus::Completed, None)?;
                    synced += 1;
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(
                        item_id = %item.id,
                        entity_type = %item.entity_type,
                        entity_id = %item.entity_id,
                        retry_count = item.retry_count + 1,
                        error = %message,
                        "Upload failed"
                    );
                    self.store
                        .update_status(&item.id, QueueStatus::Failed, Some(&message))?;
                    errors.push(format!(
                        "{} {}/{}: {message}",
                        item.operation, item.entity_type, item.entity_id
                    ));
                }
            }
        }

        let cleared = self.store.clear_completed()?;
        debug!(cleared, "Cleared completed queue items");

        Ok(SyncReport::from_counts(synced, errors.len(), errors))
    }

    async fn push_item(&self, item: &QueueItem) -> std::result::Result<(), RemoteError> {
        match item.operation {
            Operation::Create | Operation::Update => {
                let record = item
                    .payload
                    .to_record()
                    .map_err(|e| RemoteError::Decode(format!("queued payload: {e}")))?;
                self.remote.upsert(item.entity_type, &record).await
            }
            Operation::Delete => self.remote.delete(item.entity_type, &item.entity_id).await,
        }
    }

    async fn download_pass(&self, tables: &[EntityType]) -> Result<SyncReport> {
        let mut synced = 0;
        let mut errors = Vec::new();

        for &entity_type in tables {
            match self.remote.select_active(entity_type).await {
                Ok(records) => {
                    synced += self.store.put_many(entity_type, &records)?;
                    debug!(entity_type = %entity_type, count = records.len(), "Downloaded table");
                }
                Err(e) => {
                    warn!(entity_type = %entity_type, error = %e, "Download failed");
                    errors.push(format!("{entity_type}: {e}"));
                }
            }
        }

        self.store.set_last_sync_time(Utc::now())?;
        Ok(SyncReport::from_counts(synced, errors.len(), errors))
    }
}
