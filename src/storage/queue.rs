//! Sync queue table operations.
//!
//! The queue is append-only from the caller's point of view: items move
//! through `pending → processing → completed | failed` and are only deleted
//! by [`LocalStore::clear_completed`].

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result, StorageError};
use crate::model::{EntityPayload, EntityType, MAX_RETRIES, Operation, QueueItem, QueueStatus};
use crate::storage::sqlite::{LocalStore, to_usize};

const QUEUE_COLUMNS: &str = "id, entity_type, entity_id, operation, data, status, error_message, retry_count, created_at, updated_at";

/// Raw row before string columns are parsed into enums.
struct QueueRow {
    id: String,
    entity_type: String,
    entity_id: String,
    operation: String,
    data: String,
    status: String,
    error_message: Option<String>,
    retry_count: i64,
    created_at: i64,
    updated_at: i64,
}

impl QueueRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            operation: row.get(3)?,
            data: row.get(4)?,
            status: row.get(5)?,
            error_message: row.get(6)?,
            retry_count: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_item(self) -> Result<QueueItem> {
        let payload: EntityPayload =
            serde_json::from_str(&self.data).map_err(StorageError::from)?;
        Ok(QueueItem {
            id: self.id,
            entity_type: self.entity_type.parse::<EntityType>()?,
            entity_id: self.entity_id,
            operation: self.operation.parse::<Operation>()?,
            payload,
            status: self.status.parse::<QueueStatus>()?,
            error_message: self.error_message,
            retry_count: u32::try_from(self.retry_count).unwrap_or(0),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Append a pending item (retry_count 0). Usable inside a transaction.
pub(crate) fn insert_queue_item(
    conn: &Connection,
    operation: Operation,
    payload: EntityPayload,
    now: i64,
) -> Result<QueueItem> {
    let item = QueueItem {
        id: format!("q_{}", uuid::Uuid::new_v4()),
        entity_type: payload.entity_type(),
        entity_id: payload.id().to_string(),
        operation,
        payload,
        status: QueueStatus::Pending,
        error_message: None,
        retry_count: 0,
        created_at: now,
        updated_at: now,
    };
    let data = serde_json::to_string(&item.payload).map_err(StorageError::from)?;

    conn.execute(
        "INSERT INTO sync_queue (id, entity_type, entity_id, operation, data, status, retry_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6, ?6)",
        rusqlite::params![
            item.id,
            item.entity_type.table(),
            item.entity_id,
            item.operation.as_str(),
            data,
            now
        ],
    )?;

    Ok(item)
}

fn query_items<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<QueueItem>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, QueueRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(QueueRow::into_item).collect()
}

impl LocalStore {
    /// Append a new pending mutation.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the insert fails.
    pub fn enqueue(&self, operation: Operation, payload: EntityPayload) -> Result<QueueItem> {
        let now = chrono::Utc::now().timestamp_millis();
        let item = self.mutate("enqueue", |tx| insert_queue_item(tx, operation, payload, now))?;
        debug!(item_id = %item.id, entity_type = %item.entity_type, operation = %item.operation, "Enqueued mutation");
        Ok(item)
    }

    /// Items eligible for an upload attempt, oldest first.
    ///
    /// Eligible means `pending`, or `failed` with retries left. Evaluated
    /// against the table on every call.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn dequeue_pending(&self) -> Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue
             WHERE status = 'pending' OR (status = 'failed' AND retry_count < ?1)
             ORDER BY created_at ASC, rowid ASC"
        );
        self.read(|conn| query_items(conn, &sql, [MAX_RETRIES]))
    }

    /// Transition an item's status.
    ///
    /// Entering `failed` increments `retry_count`; no other transition
    /// touches it. `error_message` replaces the stored message.
    ///
    /// # Errors
    ///
    /// Returns `QueueItemNotFound` if no item has `item_id`.
    pub fn update_status(
        &self,
        item_id: &str,
        status: QueueStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let bump = i64::from(status == QueueStatus::Failed);

        let updated = self.mutate("update_status", |tx| {
            Ok(tx.execute(
                "UPDATE sync_queue
                 SET status = ?1, error_message = ?2, retry_count = retry_count + ?3, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![status.as_str(), error_message, bump, now, item_id],
            )?)
        })?;

        if updated == 0 {
            return Err(Error::QueueItemNotFound {
                id: item_id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete all `completed` items.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub fn clear_completed(&self) -> Result<usize> {
        self.mutate("clear_completed", |tx| {
            Ok(tx.execute("DELETE FROM sync_queue WHERE status = 'completed'", [])?)
        })
    }

    /// Reset items left `processing` by an interrupted upload pass to
    /// `pending`. Returns the number of items reset.
    ///
    /// Only call this while holding the upload session; remote upserts and
    /// deletes are keyed by id, so a repeated attempt is harmless.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the update fails.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("recover_interrupted", |tx| {
            Ok(tx.execute(
                "UPDATE sync_queue SET status = 'pending', updated_at = ?1 WHERE status = 'processing'",
                [now],
            )?)
        })
    }

    /// Put a failed or interrupted item back to `pending`, keeping its
    /// `retry_count`.
    ///
    /// # Errors
    ///
    /// Returns `QueueItemNotFound` for an unknown id, or `InvalidArgument`
    /// if the item is neither `failed` nor `processing`.
    pub fn requeue_item(&self, item_id: &str) -> Result<QueueItem> {
        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("requeue", |tx| {
            let status: Option<String> = tx
                .query_row("SELECT status FROM sync_queue WHERE id = ?1", [item_id], |row| {
                    row.get(0)
                })
                .optional()?;

            match status.as_deref() {
                None => {
                    return Err(Error::QueueItemNotFound {
                        id: item_id.to_string(),
                    });
                }
                Some("failed" | "processing") => {}
                Some(other) => {
                    return Err(Error::InvalidArgument(format!(
                        "queue item {item_id} is {other}, only failed or processing items can be requeued"
                    )));
                }
            }

            tx.execute(
                "UPDATE sync_queue SET status = 'pending', updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, item_id],
            )?;

            let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?1");
            let row = tx.query_row(&sql, [item_id], QueueRow::from_row)?;
            row.into_item()
        })
    }

    /// Get a queue item by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn get_queue_item(&self, item_id: &str) -> Result<Option<QueueItem>> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?1");
        self.read(|conn| {
            conn.query_row(&sql, [item_id], QueueRow::from_row)
                .optional()?
                .map(QueueRow::into_item)
                .transpose()
        })
    }

    /// List queue items, optionally filtered by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn list_queue(&self, status: Option<QueueStatus>) -> Result<Vec<QueueItem>> {
        self.read(|conn| match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE status = ?1
                     ORDER BY created_at ASC, rowid ASC"
                );
                query_items(conn, &sql, [status.as_str()])
            }
            None => {
                let sql = format!(
                    "SELECT {QUEUE_COLUMNS} FROM sync_queue ORDER BY created_at ASC, rowid ASC"
                );
                query_items(conn, &sql, [])
            }
        })
    }

    /// Queue items referencing one entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn queue_for_entity(&self, entity_type: EntityType, entity_id: &str) -> Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY created_at ASC, rowid ASC"
        );
        self.read(|conn| query_items(conn, &sql, [entity_type.table(), entity_id]))
    }

    /// Failed items that exhausted their retries.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn stuck_items(&self) -> Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE status = 'failed' AND retry_count >= ?1
             ORDER BY created_at ASC, rowid ASC"
        );
        self.read(|conn| query_items(conn, &sql, [MAX_RETRIES]))
    }

    /// Number of items not yet completed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn pending_count(&self) -> Result<usize> {
        self.read(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE status != 'completed'",
                [],
                |row| row.get(0),
            )?;
            Ok(to_usize(n))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;

    fn payload(id: &str) -> EntityPayload {
        EntityPayload::from_record(EntityType::Debtors, &Record::new(id).with_field("code", "C"))
            .unwrap()
    }

    #[test]
    fn test_enqueue_starts_pending() {
        let store = LocalStore::open_memory().unwrap();
        let item = store.enqueue(Operation::Update, payload("D1")).unwrap();

        assert!(item.id.starts_with("q_"));
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.entity_type, EntityType::Debtors);
        assert_eq!(item.entity_id, "D1");

        let stored = store.get_queue_item(&item.id).unwrap().unwrap();
        assert_eq!(stored, item);
    }

    #[test]
    fn test_dequeue_is_fifo() {
        let store = LocalStore::open_memory().unwrap();
        let a = store.enqueue(Operation::Create, payload("D1")).unwrap();
        let b = store.enqueue(Operation::Update, payload("D1")).unwrap();
        let c = store.enqueue(Operation::Delete, payload("D2")).unwrap();

        let ids: Vec<_> = store.dequeue_pending().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[test]
    fn test_no_deduplication() {
        let store = LocalStore::open_memory().unwrap();
        store.enqueue(Operation::Update, payload("D1")).unwrap();
        store.enqueue(Operation::Update, payload("D1")).unwrap();

        assert_eq!(store.queue_for_entity(EntityType::Debtors, "D1").unwrap().len(), 2);
    }

    #[test]
    fn test_retry_count_only_increments_on_failed() {
        let store = LocalStore::open_memory().unwrap();
        let item = store.enqueue(Operation::Update, payload("D1")).unwrap();

        store.update_status(&item.id, QueueStatus::Processing, None).unwrap();
        store.update_status(&item.id, QueueStatus::Failed, Some("timeout")).unwrap();
        store.update_status(&item.id, QueueStatus::Processing, None).unwrap();

        let stored = store.get_queue_item(&item.id).unwrap().unwrap();
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.status, QueueStatus::Processing);
        assert_eq!(stored.error_message, None);
    }

    #[test]
    fn test_retry_budget_excludes_exhausted_items() {
        let store = LocalStore::open_memory().unwrap();
        let item = store.enqueue(Operation::Update, payload("D1")).unwrap();

        for attempt in 1..=3 {
            assert_eq!(store.dequeue_pending().unwrap().len(), 1, "attempt {attempt}");
            store.update_status(&item.id, QueueStatus::Processing, None).unwrap();
            store.update_status(&item.id, QueueStatus::Failed, Some("500")).unwrap();
        }

        assert!(store.dequeue_pending().unwrap().is_empty());
        let stuck = store.stuck_items().unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].retry_count, 3);
        assert!(stuck[0].needs_attention());

        // Retained and still counted
        assert_eq!(store.pending_count().unwrap(), 1);
        let stats = store.storage_stats().unwrap();
        assert_eq!(stats.pending_sync, 1);
        assert_eq!(stats.needs_attention, 1);
    }

    #[test]
    fn test_update_status_missing_item() {
        let store = LocalStore::open_memory().unwrap();
        let err = store
            .update_status("q_missing", QueueStatus::Completed, None)
            .unwrap_err();
        assert!(matches!(err, Error::QueueItemNotFound { .. }));
    }

    #[test]
    fn test_clear_completed_only_removes_completed() {
        let store = LocalStore::open_memory().unwrap();
        let done = store.enqueue(Operation::Update, payload("D1")).unwrap();
        let failed = store.enqueue(Operation::Update, payload("D2")).unwrap();
        let pending = store.enqueue(Operation::Update, payload("D3")).unwrap();

        store.update_status(&done.id, QueueStatus::Completed, None).unwrap();
        store.update_status(&failed.id, QueueStatus::Failed, Some("x")).unwrap();

        assert_eq!(store.clear_completed().unwrap(), 1);
        assert!(store.get_queue_item(&done.id).unwrap().is_none());
        assert!(store.get_queue_item(&failed.id).unwrap().is_some());
        assert!(store.get_queue_item(&pending.id).unwrap().is_some());
    }

    #[test]
    fn test_requeue_keeps_retry_count() {
        let store = LocalStore::open_memory().unwrap();
        let item = store.enqueue(Operation::Update, payload("D1")).unwrap();
        for _ in 0..3 {
            store.update_status(&item.id, QueueStatus::Failed, Some("500")).unwrap();
        }

        let requeued = store.requeue_item(&item.id).unwrap();
        assert_eq!(requeued.status, QueueStatus::Pending);
        assert_eq!(requeued.retry_count, 3);
        assert_eq!(store.dequeue_pending().unwrap().len(), 1);
    }

    #[test]
    fn test_requeue_rejects_non_failed() {
        let store = LocalStore::open_memory().unwrap();
        let item = store.enqueue(Operation::Update, payload("D1")).unwrap();

        assert!(matches!(
            store.requeue_item(&item.id).unwrap_err(),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(
            store.requeue_item("q_nope").unwrap_err(),
            Error::QueueItemNotFound { .. }
        ));
    }

    #[test]
    fn test_interrupted_item_can_be_recovered() {
        let store = LocalStore::open_memory().unwrap();
        let a = store.enqueue(Operation::Update, payload("D1")).unwrap();
        let b = store.enqueue(Operation::Update, payload("D2")).unwrap();
        let c = store.enqueue(Operation::Update, payload("D3")).unwrap();
        store.update_status(&a.id, QueueStatus::Processing, None).unwrap();
        store.update_status(&b.id, QueueStatus::Processing, None).unwrap();
        store.update_status(&c.id, QueueStatus::Completed, None).unwrap();

        // Left processing: not eligible until reset
        assert!(store.dequeue_pending().unwrap().is_empty());

        let requeued = store.requeue_item(&a.id).unwrap();
        assert_eq!(requeued.status, QueueStatus::Pending);
        assert_eq!(store.recover_interrupted().unwrap(), 1);

        let ids: Vec<_> = store.dequeue_pending().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(
            store.get_queue_item(&c.id).unwrap().unwrap().status,
            QueueStatus::Completed
        );
    }

    #[test]
    fn test_list_queue_by_status() {
        let store = LocalStore::open_memory().unwrap();
        let a = store.enqueue(Operation::Update, payload("D1")).unwrap();
        store.enqueue(Operation::Update, payload("D2")).unwrap();
        store.update_status(&a.id, QueueStatus::Failed, Some("x")).unwrap();

        assert_eq!(store.list_queue(None).unwrap().len(), 2);
        let failed = store.list_queue(Some(QueueStatus::Failed)).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_message.as_deref(), Some("x"));
    }
}
