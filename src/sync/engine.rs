//! Sync engine: the surface the UI talks to.
//!
//! Wires the orchestrator, queue manager, realtime bridge and connectivity
//! signal around one shared [`LocalStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::{EntityPayload, EntityType, QueueItem, Record};
use crate::storage::{LocalStore, StorageStats};
use crate::sync::connectivity::Connectivity;
use crate::sync::notifier::ListenerId;
use crate::sync::orchestrator::SyncOrchestrator;
use crate::sync::queue::SyncQueueManager;
use crate::sync::realtime::{RealtimeBridge, RemoteChange};
use crate::sync::remote::RemoteApi;
use crate::sync::types::{SyncReport, SyncStatus};

pub const OFFLINE: &str = "Device is offline";

/// Offline-first sync engine.
pub struct SyncEngine<R> {
    store: Arc<LocalStore>,
    orchestrator: SyncOrchestrator<R>,
    queue: SyncQueueManager,
    realtime: RealtimeBridge,
    connectivity: Connectivity,
}

impl<R: RemoteApi + 'static> SyncEngine<R> {
    /// Create an engine that assumes the device is online.
    pub fn new(store: Arc<LocalStore>, remote: Arc<R>) -> Self {
        Self {
            orchestrator: SyncOrchestrator::new(Arc::clone(&store), remote),
            queue: SyncQueueManager::new(Arc::clone(&store)),
            realtime: RealtimeBridge::new(Arc::clone(&store)),
            connectivity: Connectivity::default(),
            store,
        }
    }

    #[must_use]
    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    #[must_use]
    pub fn with_default_tables(mut self, tables: Vec<EntityType>) -> Self {
        self.orchestrator = self.orchestrator.with_default_tables(tables);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    #[must_use]
    pub fn orchestrator(&self) -> &SyncOrchestrator<R> {
        &self.orchestrator
    }

    #[must_use]
    pub fn queue(&self) -> &SyncQueueManager {
        &self.queue
    }

    #[must_use]
    pub fn realtime(&self) -> &RealtimeBridge {
        &self.realtime
    }

    #[must_use]
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Full sync, unless the device is offline.
    ///
    /// # Errors
    ///
    /// Returns an error only for local storage failures.
    pub async fn perform_sync(&self) -> Result<SyncReport> {
        if !self.connectivity.is_online() {
            warn!("Sync skipped: device is offline");
            return Ok(SyncReport::rejected(OFFLINE));
        }
        self.orchestrator.full_sync().await
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.orchestrator.status()
    }

    /// # Errors
    ///
    /// Returns a storage error if the metadata read fails.
    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.last_sync_time()
    }

    /// # Errors
    ///
    /// Returns a storage error if any count fails.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        self.store.storage_stats()
    }

    pub fn add_status_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        self.orchestrator.add_listener(callback)
    }

    pub fn remove_status_listener(&self, id: ListenerId) -> bool {
        self.orchestrator.remove_listener(id)
    }

    pub fn add_change_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&RemoteChange) + Send + Sync + 'static,
    {
        self.realtime.add_listener(callback)
    }

    pub fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.realtime.remove_listener(id)
    }

    /// Save locally and queue for upload. See [`SyncQueueManager::save`].
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn save(&self, payload: EntityPayload) -> Result<QueueItem> {
        self.queue.save(payload)
    }

    /// Delete locally and queue a remote delete. See [`SyncQueueManager::remove`].
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn remove(&self, entity_type: EntityType, id: &str) -> Result<QueueItem> {
        self.queue.remove(entity_type, id)
    }

    /// Active records of a type, for display.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn list(&self, entity_type: EntityType) -> Result<Vec<Record>> {
        self.store.get_active(entity_type)
    }

    /// Run a full sync on every offline → online transition.
    ///
    /// The task ends when the engine is dropped.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        let mut edges = self.connectivity.online_edges();

        tokio::spawn(async move {
            while edges.next().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                info!("Connectivity restored, starting sync");
                match engine.perform_sync().await {
                    Ok(report) => info!(
                        synced = report.synced,
                        failed = report.failed,
                        rejected = report.rejected,
                        "Auto sync finished"
                    ),
                    Err(e) => warn!(error = %e, "Auto sync failed"),
                }
            }
        })
    }
}
