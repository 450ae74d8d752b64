//! Realtime bridge.
//!
//! Applies server-pushed change events to the local store outside the
//! pull-based sync cycle. Change listeners registered here are separate from
//! the orchestrator's status listeners: "a sync finished" and "something
//! changed underneath me" are different signals.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{EntityType, Record};
use crate::storage::LocalStore;
use crate::sync::notifier::{ListenerId, ListenerRegistry};
use crate::sync::remote::RemoteError;

/// A change pushed by the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert { record: Record },
    Update { record: Record },
    Delete { id: String },
}

impl ChangeEvent {
    /// Id of the affected record.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Insert { record } | Self::Update { record } => &record.id,
            Self::Delete { id } => id,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "INSERT",
            Self::Update { .. } => "UPDATE",
            Self::Delete { .. } => "DELETE",
        }
    }
}

/// A change event tagged with its table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub entity_type: EntityType,
    pub event: ChangeEvent,
}

pub type ChangeSender = mpsc::UnboundedSender<RemoteChange>;
pub type ChangeReceiver = mpsc::UnboundedReceiver<RemoteChange>;

/// Subscribe/unsubscribe pair per entity type.
///
/// A subscription forwards every event for its table into `sender` until
/// unsubscribed.
pub trait RealtimeChannel: Send + Sync {
    fn subscribe(
        &self,
        entity_type: EntityType,
        sender: ChangeSender,
    ) -> impl Future<Output = std::result::Result<(), RemoteError>> + Send;

    fn unsubscribe(
        &self,
        entity_type: EntityType,
    ) -> impl Future<Output = std::result::Result<(), RemoteError>> + Send;
}

/// Applies remote changes to the local store and fans them out.
#[derive(Debug)]
pub struct RealtimeBridge {
    store: Arc<LocalStore>,
    listeners: ListenerRegistry<RemoteChange>,
}

impl RealtimeBridge {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Register a change listener, called after each event is applied.
    pub fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&RemoteChange) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Apply one pushed event: insert/update → put, delete → delete.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the local write fails; listeners are not
    /// notified then.
    pub fn on_remote_change(&self, entity_type: EntityType, event: ChangeEvent) -> Result<()> {
        match &event {
            ChangeEvent::Insert { record } | ChangeEvent::Update { record } => {
                self.store.put(entity_type, record)?;
            }
            ChangeEvent::Delete { id } => {
                self.store.delete(entity_type, id)?;
            }
        }
        debug!(entity_type = %entity_type, kind = event.kind(), id = event.id(), "Applied remote change");

        self.listeners.notify(&RemoteChange { entity_type, event });
        Ok(())
    }

    /// Subscribe `tables` on `channel`, merged into one stream.
    ///
    /// # Errors
    ///
    /// Returns a remote error if any subscription fails.
    pub async fn start<C: RealtimeChannel>(
        &self,
        channel: &C,
        tables: &[EntityType],
    ) -> Result<ChangeReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        for &entity_type in tables {
            channel.subscribe(entity_type, tx.clone()).await?;
        }
        info!(tables = tables.len(), "Realtime subscriptions started");
        Ok(rx)
    }

    /// Apply events from `rx` until every sender is gone.
    ///
    /// Returns the number of events applied.
    ///
    /// # Errors
    ///
    /// Stops at the first storage error.
    pub async fn pump(&self, mut rx: ChangeReceiver) -> Result<usize> {
        let mut applied = 0;
        while let Some(change) = rx.recv().await {
            self.on_remote_change(change.entity_type, change.event)?;
            applied += 1;
        }
        debug!(applied, "Realtime stream closed");
        Ok(applied)
    }

    /// Unsubscribe `tables`. Failures are logged and skipped.
    pub async fn stop<C: RealtimeChannel>(&self, channel: &C, tables: &[EntityType]) {
        for &entity_type in tables {
            if let Err(e) = channel.unsubscribe(entity_type).await {
                warn!(entity_type = %entity_type, error = %e, "Unsubscribe failed");
            }
        }
    }
}

/// In-process channel: events are injected with [`MemoryChannel::emit`].
#[derive(Debug, Default)]
pub struct MemoryChannel {
    senders: Mutex<HashMap<EntityType, ChangeSender>>,
}

impl MemoryChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event to the table's subscriber. Returns false if nobody
    /// is subscribed.
    pub fn emit(&self, entity_type: EntityType, event: ChangeEvent) -> bool {
        let senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders
            .get(&entity_type)
            .is_some_and(|tx| tx.send(RemoteChange { entity_type, event }).is_ok())
    }

    #[must_use]
    pub fn is_subscribed(&self, entity_type: EntityType) -> bool {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&entity_type)
    }
}

impl RealtimeChannel for MemoryChannel {
    async fn subscribe(
        &self,
        entity_type: EntityType,
        sender: ChangeSender,
    ) -> std::result::Result<(), RemoteError> {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity_type, sender);
        Ok(())
    }

    async fn unsubscribe(&self, entity_type: EntityType) -> std::result::Result<(), RemoteError> {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&entity_type);
        Ok(())
    }
}
