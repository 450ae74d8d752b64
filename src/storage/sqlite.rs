//! SQLite storage implementation.
//!
//! [`LocalStore`] is the on-device copy of every synchronized entity table,
//! plus the sync queue and metadata tables (see `storage::queue` and
//! `storage::meta`). The connection sits behind a mutex so the store can be
//! shared across tasks; the lock is never held across an `.await`.

use crate::error::{Error, Result, StorageError};
use crate::model::{EntityType, MAX_RETRIES, Record};
use crate::storage::schema::{apply_schema, field_expr};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// SQLite-based local store.
#[derive(Debug)]
pub struct LocalStore {
    conn: Mutex<Connection>,
}

/// Row counts for one entity table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub entity_type: EntityType,
    /// All rows, soft-deleted included.
    pub total: usize,
    /// Rows with `is_active = true`.
    pub active: usize,
}

/// Storage statistics surfaced to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    /// Per-table counts, in `EntityType::ALL` order.
    pub tables: Vec<TableCount>,
    /// Queue items not yet completed, including exhausted failures.
    pub pending_sync: usize,
    /// Failed queue items out of automatic retries.
    pub needs_attention: usize,
    /// Time of the last successful download pass.
    pub last_sync_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl StorageStats {
    /// Counts for one entity type.
    #[must_use]
    pub fn table(&self, entity_type: EntityType) -> Option<&TableCount> {
        self.tables.iter().find(|t| t.entity_type == entity_type)
    }

    /// Total stored records across all tables.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.tables.iter().map(|t| t.total).sum()
    }
}

impl LocalStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage(StorageError::Poisoned))
    }

    /// Run a read against the connection.
    ///
    /// # Errors
    ///
    /// Returns whatever the closure returns, or a poisoned-lock error.
    pub fn read<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a mutation in an IMMEDIATE transaction.
    ///
    /// Commits if the closure succeeds, rolls back otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub fn mutate<F, R>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let result = f(&tx)?;
        tx.commit()?;

        debug!(op, "Committed mutation");
        Ok(result)
    }

    // ====================
    // Entity Records
    // ====================

    /// Upsert one record by id.
    ///
    /// Reapplying the same record only refreshes `stored_at`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn put(&self, entity_type: EntityType, record: &Record) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("put", |tx| upsert_record(tx, entity_type, record, now))
    }

    /// Upsert many records in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns a storage error if any write fails; nothing is written then.
    pub fn put_many(&self, entity_type: EntityType, records: &[Record]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("put_many", |tx| {
            for record in records {
                upsert_record(tx, entity_type, record, now)?;
            }
            Ok(records.len())
        })
    }

    /// Get a record by id, soft-deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails. A missing id is `Ok(None)`.
    pub fn get(&self, entity_type: EntityType, id: &str) -> Result<Option<Record>> {
        self.read(|conn| select_record(conn, entity_type, id))
    }

    /// All records of a type, soft-deleted ones included.
    ///
    /// This is the raw bookkeeping view; UI lists use [`LocalStore::get_active`].
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn get_all(&self, entity_type: EntityType) -> Result<Vec<Record>> {
        let sql = format!("SELECT data FROM {} ORDER BY id", entity_type.table());
        self.read(|conn| query_records(conn, &sql, []))
    }

    /// Active (`is_active = true`) records of a type.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn get_active(&self, entity_type: EntityType) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT data FROM {} WHERE is_active = 1 ORDER BY id",
            entity_type.table()
        );
        self.read(|conn| query_records(conn, &sql, []))
    }

    /// Active records whose indexed `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `field` is not a declared index field
    /// of `entity_type`, or a storage error if the query fails.
    pub fn find_by(
        &self,
        entity_type: EntityType,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>> {
        if !entity_type.has_index(field) {
            return Err(Error::InvalidArgument(format!(
                "{entity_type} has no index on '{field}' (indexed: {})",
                entity_type.index_fields().join(", ")
            )));
        }

        let sql = format!(
            "SELECT data FROM {} WHERE is_active = 1 AND {} IS ?1 ORDER BY id",
            entity_type.table(),
            field_expr(field)
        );
        let param = json_param(value);
        self.read(|conn| query_records(conn, &sql, [param]))
    }

    /// Delete a record. Deleting an absent id is a no-op.
    ///
    /// Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub fn delete(&self, entity_type: EntityType, id: &str) -> Result<bool> {
        self.mutate("delete", |tx| delete_record(tx, entity_type, id))
    }

    /// Wipe a table (full resync).
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails.
    pub fn clear(&self, entity_type: EntityType) -> Result<usize> {
        let sql = format!("DELETE FROM {}", entity_type.table());
        self.mutate("clear", |tx| Ok(tx.execute(&sql, [])?))
    }

    /// Row counts for one table.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn count(&self, entity_type: EntityType) -> Result<TableCount> {
        self.read(|conn| count_table(conn, entity_type))
    }

    /// Per-table counts, queue backlog and last sync time.
    ///
    /// # Errors
    ///
    /// Returns a storage error if any query fails.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        let (tables, pending_sync, needs_attention) = self.read(|conn| {
            let tables = EntityType::ALL
                .iter()
                .map(|t| count_table(conn, *t))
                .collect::<Result<Vec<_>>>()?;

            let pending_sync: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE status != 'completed'",
                [],
                |row| row.get(0),
            )?;
            let needs_attention: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE status = 'failed' AND retry_count >= ?1",
                [MAX_RETRIES],
                |row| row.get(0),
            )?;

            Ok((tables, to_usize(pending_sync), to_usize(needs_attention)))
        })?;

        Ok(StorageStats {
            tables,
            pending_sync,
            needs_attention,
            last_sync_time: self.last_sync_time()?,
        })
    }
}

// ====================
// Connection-level helpers (usable inside a transaction)
// ====================

pub(crate) fn upsert_record(
    conn: &Connection,
    entity_type: EntityType,
    record: &Record,
    now: i64,
) -> Result<()> {
    let data = serde_json::to_string(record).map_err(StorageError::from)?;
    let sql = format!(
        "INSERT INTO {} (id, data, is_active, content_hash, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            data = excluded.data,
            is_active = excluded.is_active,
            content_hash = excluded.content_hash,
            stored_at = excluded.stored_at",
        entity_type.table()
    );
    conn.execute(
        &sql,
        rusqlite::params![
            record.id,
            data,
            record.is_active,
            record.content_hash(),
            now
        ],
    )?;
    Ok(())
}

pub(crate) fn select_record(
    conn: &Connection,
    entity_type: EntityType,
    id: &str,
) -> Result<Option<Record>> {
    let sql = format!("SELECT data FROM {} WHERE id = ?1", entity_type.table());
    let data: Option<String> = conn
        .query_row(&sql, [id], |row| row.get(0))
        .optional()?;

    data.map(|d| decode_record(&d)).transpose()
}

pub(crate) fn delete_record(conn: &Connection, entity_type: EntityType, id: &str) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", entity_type.table());
    Ok(conn.execute(&sql, [id])? > 0)
}

fn query_records<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.iter().map(|d| decode_record(d)).collect()
}

fn decode_record(data: &str) -> Result<Record> {
    Ok(serde_json::from_str(data).map_err(StorageError::from)?)
}

fn count_table(conn: &Connection, entity_type: EntityType) -> Result<TableCount> {
    let sql = format!(
        "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM {}",
        entity_type.table()
    );
    let (total, active): (i64, i64) = conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(TableCount {
        entity_type,
        total: to_usize(total),
        active: to_usize(active),
    })
}

/// Map a JSON value to the SQLite value `json_extract` yields for it.
fn json_param(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Sql::Real(n.as_f64().unwrap_or_default()), Sql::Integer),
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

pub(crate) fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn debtor(id: &str, code: &str) -> Record {
        Record::new(id).with_field("code", code).with_field("name", format!("Debtor {id}"))
    }

    #[test]
    fn test_open_memory() {
        let storage = LocalStore::open_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offsync.db");
        {
            let store = LocalStore::open(&path).unwrap();
            store.put(EntityType::Debtors, &debtor("D1", "C-1")).unwrap();
        }
        let store = LocalStore::open(&path).unwrap();
        assert!(store.get(EntityType::Debtors, "D1").unwrap().is_some());
    }

    #[test]
    fn test_put_get_round_trip() {
        let store = LocalStore::open_memory().unwrap();
        let record = debtor("D1", "C-1").with_field("balance", 1500.5);
        store.put(EntityType::Debtors, &record).unwrap();

        let fetched = store.get(EntityType::Debtors, "D1").unwrap();
        assert_eq!(fetched, Some(record));
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = LocalStore::open_memory().unwrap();
        assert_eq!(store.get(EntityType::Credits, "nope").unwrap(), None);
        assert!(store.get_all(EntityType::Credits).unwrap().is_empty());
    }

    #[test]
    fn test_put_is_idempotent() {
        let store = LocalStore::open_memory().unwrap();
        let snapshot = vec![debtor("D1", "C-1"), debtor("D2", "C-2")];

        store.put_many(EntityType::Debtors, &snapshot).unwrap();
        let once = store.get_all(EntityType::Debtors).unwrap();

        store.put_many(EntityType::Debtors, &snapshot).unwrap();
        let twice = store.get_all(EntityType::Debtors).unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.count(EntityType::Debtors).unwrap().total, 2);
    }

    #[test]
    fn test_put_overwrites_by_id() {
        let store = LocalStore::open_memory().unwrap();
        store.put(EntityType::Debtors, &debtor("D1", "OLD")).unwrap();
        store.put(EntityType::Debtors, &debtor("D1", "NEW")).unwrap();

        let all = store.get_all(EntityType::Debtors).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].field("code"), Some(json!("NEW")));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = LocalStore::open_memory().unwrap();
        store.put(EntityType::Users, &Record::new("U1")).unwrap();

        assert!(store.delete(EntityType::Users, "U1").unwrap());
        assert!(!store.delete(EntityType::Users, "U1").unwrap());
        assert!(!store.delete(EntityType::Users, "never-existed").unwrap());
    }

    #[test]
    fn test_clear_wipes_only_one_table() {
        let store = LocalStore::open_memory().unwrap();
        store.put(EntityType::Debtors, &debtor("D1", "C-1")).unwrap();
        store.put(EntityType::Credits, &Record::new("CR1")).unwrap();

        assert_eq!(store.clear(EntityType::Debtors).unwrap(), 1);
        assert!(store.get_all(EntityType::Debtors).unwrap().is_empty());
        assert_eq!(store.get_all(EntityType::Credits).unwrap().len(), 1);
    }

    #[test]
    fn test_soft_deleted_records_hidden_from_active_list() {
        let store = LocalStore::open_memory().unwrap();
        store.put(EntityType::Debtors, &debtor("D1", "C-1")).unwrap();
        store.put(EntityType::Debtors, &debtor("D2", "C-2").inactive()).unwrap();

        assert_eq!(store.get_all(EntityType::Debtors).unwrap().len(), 2);
        let active = store.get_active(EntityType::Debtors).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "D1");

        let counts = store.count(EntityType::Debtors).unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.active, 1);

        // Still retrievable on explicit request
        assert!(!store.get(EntityType::Debtors, "D2").unwrap().unwrap().is_active);
    }

    #[test]
    fn test_find_by_index() {
        let store = LocalStore::open_memory().unwrap();
        store
            .put_many(
                EntityType::Credits,
                &[
                    Record::new("CR1").with_field("debtor_id", "D1"),
                    Record::new("CR2").with_field("debtor_id", "D1"),
                    Record::new("CR3").with_field("debtor_id", "D2"),
                    Record::new("CR4").with_field("debtor_id", "D1").inactive(),
                ],
            )
            .unwrap();

        let found = store
            .find_by(EntityType::Credits, "debtor_id", &json!("D1"))
            .unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["CR1", "CR2"]);
    }

    #[test]
    fn test_find_by_boolean_field() {
        let store = LocalStore::open_memory().unwrap();
        store
            .put_many(
                EntityType::Notifications,
                &[
                    Record::new("N1").with_field("is_read", false),
                    Record::new("N2").with_field("is_read", true),
                ],
            )
            .unwrap();

        let unread = store
            .find_by(EntityType::Notifications, "is_read", &json!(false))
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "N1");
    }

    #[test]
    fn test_find_by_rejects_undeclared_field() {
        let store = LocalStore::open_memory().unwrap();
        let err = store
            .find_by(EntityType::Debtors, "phone", &json!("555"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_mutate_rolls_back_on_error() {
        let store = LocalStore::open_memory().unwrap();
        let result: Result<()> = store.mutate("failing", |tx| {
            upsert_record(tx, EntityType::Debtors, &debtor("D1", "C-1"), 0)?;
            Err(Error::Other("boom".to_string()))
        });
        assert!(result.is_err());
        assert!(store.get(EntityType::Debtors, "D1").unwrap().is_none());
    }

    #[test]
    fn test_storage_stats_counts_tables() {
        let store = LocalStore::open_memory().unwrap();
        store.put(EntityType::Debtors, &debtor("D1", "C-1")).unwrap();
        store.put(EntityType::Debtors, &debtor("D2", "C-2").inactive()).unwrap();
        store.put(EntityType::Users, &Record::new("U1")).unwrap();

        let stats = store.storage_stats().unwrap();
        assert_eq!(stats.tables.len(), EntityType::ALL.len());
        assert_eq!(stats.table(EntityType::Debtors).unwrap().total, 2);
        assert_eq!(stats.table(EntityType::Debtors).unwrap().active, 1);
        assert_eq!(stats.total_records(), 3);
        assert_eq!(stats.pending_sync, 0);
        assert!(stats.last_sync_time.is_none());
    }
}
