//! Sync queue manager.
//!
//! Every local mutation that must reach the server goes through here: the
//! local write and its queue entry are committed in the same SQLite
//! transaction, so a saved record without a queue entry cannot exist.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{Result, StorageError};
use crate::model::{EntityPayload, EntityType, Operation, QueueItem, QueueStatus};
use crate::storage::LocalStore;
use crate::storage::queue::insert_queue_item;
use crate::storage::sqlite::{delete_record, select_record, upsert_record};

/// Write-through mutation recorder over a [`LocalStore`].
#[derive(Debug, Clone)]
pub struct SyncQueueManager {
    store: Arc<LocalStore>,
}

impl SyncQueueManager {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Save a record locally and queue it for upload.
    ///
    /// Queued as `create` when the id is not stored yet, `update` otherwise.
    /// Soft deletes are saves with `is_active = false`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if either write fails; neither is kept then.
    pub fn save(&self, payload: EntityPayload) -> Result<QueueItem> {
        let entity_type = payload.entity_type();
        let record = payload.to_record().map_err(StorageError::from)?;
        let now = chrono::Utc::now().timestamp_millis();

        let item = self.store.mutate("save", |tx| {
            let operation = if select_record(tx, entity_type, &record.id)?.is_some() {
                Operation::Update
            } else {
                Operation::Create
            };
            upsert_record(tx, entity_type, &record, now)?;
            insert_queue_item(tx, operation, payload, now)
        })?;

        debug!(item_id = %item.id, entity_type = %entity_type, entity_id = %item.entity_id, operation = %item.operation, "Saved and queued");
        Ok(item)
    }

    /// Delete a record locally and queue a remote delete.
    ///
    /// The queued payload is the last stored snapshot, or just the id when
    /// the record was never stored locally or its snapshot no longer fits
    /// the entity's shape.
    ///
    /// # Errors
    ///
    /// Returns a storage error if either write fails; neither is kept then.
    pub fn remove(&self, entity_type: EntityType, id: &str) -> Result<QueueItem> {
        let now = chrono::Utc::now().timestamp_millis();

        let item = self.store.mutate("remove", |tx| {
            let id_only = || EntityPayload::from_data(entity_type, json!({ "id": id }));
            let payload = match select_record(tx, entity_type, id)? {
                Some(snapshot) => EntityPayload::from_record(entity_type, &snapshot).or_else(|e| {
                    warn!(entity_type = %entity_type, id, error = %e, "Stored snapshot unreadable, queueing id only");
                    id_only()
                }),
                None => id_only(),
            }
            .map_err(StorageError::from)?;

            delete_record(tx, entity_type, id)?;
            insert_queue_item(tx, Operation::Delete, payload, now)
        })?;

        debug!(item_id = %item.id, entity_type = %entity_type, entity_id = id, "Deleted and queued");
        Ok(item)
    }

    /// Items the next upload pass will attempt.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn eligible(&self) -> Result<Vec<QueueItem>> {
        self.store.dequeue_pending()
    }

    /// Failed items out of automatic retries.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn needs_attention(&self) -> Result<Vec<QueueItem>> {
        self.store.stuck_items()
    }

    /// All items, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn list(&self, status: Option<QueueStatus>) -> Result<Vec<QueueItem>> {
        self.store.list_queue(status)
    }

    /// Operator action: give a failed or interrupted item another automatic
    /// attempt.
    ///
    /// `retry_count` is kept, so an exhausted item gets exactly one more try.
    ///
    /// # Errors
    ///
    /// Returns `QueueItemNotFound` or `InvalidArgument` (item neither failed
    /// nor processing).
    pub fn requeue(&self, item_id: &str) -> Result<QueueItem> {
        let item = self.store.requeue_item(item_id)?;
        info!(item_id, retry_count = item.retry_count, "Requeued item");
        Ok(item)
    }

    /// Drop completed items.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub fn clear_completed(&self) -> Result<usize> {
        self.store.clear_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityPayload, Record};
    use serde_json::json;

    fn manager() -> SyncQueueManager {
        SyncQueueManager::new(Arc::new(LocalStore::open_memory().unwrap()))
    }

    fn credit(id: &str, status: &str) -> EntityPayload {
        EntityPayload::from_data(
            EntityType::Credits,
            json!({"id": id, "debtor_id": "D1", "status": status, "amount": 900}),
        )
        .unwrap()
    }

    #[test]
    fn test_save_writes_record_and_queue_entry() {
        let queue = manager();
        let item = queue.save(credit("CR1", "open")).unwrap();

        assert_eq!(item.operation, Operation::Create);
        assert_eq!(item.entity_type, EntityType::Credits);
        let stored = queue.store().get(EntityType::Credits, "CR1").unwrap().unwrap();
        assert_eq!(stored.field("amount"), Some(json!(900)));
        assert_eq!(queue.eligible().unwrap().len(), 1);
    }

    #[test]
    fn test_second_save_is_update() {
        let queue = manager();
        queue.save(credit("CR1", "open")).unwrap();
        let item = queue.save(credit("CR1", "closed")).unwrap();

        assert_eq!(item.operation, Operation::Update);
        // Both mutations are kept, in order
        let ops: Vec<_> = queue.list(None).unwrap().iter().map(|i| i.operation).collect();
        assert_eq!(ops, vec![Operation::Create, Operation::Update]);
    }

    #[test]
    fn test_remove_queues_last_snapshot() {
        let queue = manager();
        queue.save(credit("CR1", "open")).unwrap();
        let item = queue.remove(EntityType::Credits, "CR1").unwrap();

        assert_eq!(item.operation, Operation::Delete);
        assert!(queue.store().get(EntityType::Credits, "CR1").unwrap().is_none());
        match &item.payload {
            EntityPayload::Credits(c) => assert_eq!(c.status, Some(Some("open".to_string()))),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_remove_unknown_id_still_queues() {
        let queue = manager();
        let item = queue.remove(EntityType::Users, "U9").unwrap();
        assert_eq!(item.entity_id, "U9");
        assert_eq!(item.payload.to_record().unwrap(), Record::new("U9"));
    }

    #[test]
    fn test_failed_enqueue_rolls_back_local_write() {
        let queue = manager();
        queue
            .store()
            .read(|conn| Ok(conn.execute_batch("DROP TABLE sync_queue")?))
            .unwrap();

        assert!(queue.save(credit("CR1", "open")).is_err());
        assert!(queue.store().get(EntityType::Credits, "CR1").unwrap().is_none());
    }

    #[test]
    fn test_requeue_and_needs_attention() {
        let queue = manager();
        let item = queue.save(credit("CR1", "open")).unwrap();
        for _ in 0..3 {
            queue
                .store()
                .update_status(&item.id, QueueStatus::Failed, Some("503"))
                .unwrap();
        }
        assert!(queue.eligible().unwrap().is_empty());
        assert_eq!(queue.needs_attention().unwrap().len(), 1);

        queue.requeue(&item.id).unwrap();
        assert_eq!(queue.eligible().unwrap().len(), 1);
        assert!(queue.needs_attention().unwrap().is_empty());
    }

    #[test]
    fn test_remove_with_malformed_snapshot_queues_id() {
        let queue = manager();
        queue
            .store()
            .put(EntityType::Debtors, &Record::new("D7").with_field("code", 42))
            .unwrap();

        let item = queue.remove(EntityType::Debtors, "D7").unwrap();

        assert_eq!(item.operation, Operation::Delete);
        assert_eq!(item.entity_id, "D7");
        assert_eq!(item.payload.id(), "D7");
        assert!(queue.store().get(EntityType::Debtors, "D7").unwrap().is_none());
    }
}
