//! Database schema definitions.
//!
//! Layout:
//! - one table per entity type, keyed by record id, with the record JSON in
//!   `data` and expression indexes on each declared index field
//! - `sync_queue`, keyed by generated id, indexed on `status`
//! - `sync_metadata`, one row per key

use rusqlite::{Connection, Result};

use crate::model::EntityType;

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Static part of the schema (queue, metadata, version tracking).
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Sync Queue
-- ====================

-- One row per local mutation not yet confirmed by the server.
-- Rows are only deleted after reaching 'completed'.
CREATE TABLE IF NOT EXISTS sync_queue (
    id TEXT PRIMARY KEY,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    operation TEXT NOT NULL CHECK (operation IN ('create', 'update', 'delete')),
    data TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    error_message TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status);
CREATE INDEX IF NOT EXISTS idx_sync_queue_entity ON sync_queue(entity_type, entity_id);
CREATE INDEX IF NOT EXISTS idx_sync_queue_created ON sync_queue(created_at);

-- ====================
-- Sync Metadata
-- ====================

CREATE TABLE IF NOT EXISTS sync_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
";

/// SQL expression used to index and query a JSON field of an entity row.
///
/// Queries must use exactly this expression for SQLite to pick the index.
#[must_use]
pub fn field_expr(field: &str) -> String {
    format!("json_extract(data, '$.{field}')")
}

/// DDL for one entity table and its indexes.
#[must_use]
pub fn entity_table_sql(entity_type: EntityType) -> String {
    let table = entity_type.table();
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            content_hash TEXT NOT NULL,
            stored_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_active ON {table}(is_active);\n"
    );

    for field in entity_type.index_fields() {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_{field} ON {table}({});\n",
            field_expr(field)
        ));
    }

    sql
}

/// Apply the schema to the database.
///
/// Idempotent: every statement uses `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    for entity_type in EntityType::ALL {
        conn.execute_batch(&entity_table_sql(entity_type))?;
    }

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables = table_names(&conn);
        for entity_type in EntityType::ALL {
            assert!(tables.contains(&entity_type.table().to_string()));
        }
        assert!(tables.contains(&"sync_queue".to_string()));
        assert!(tables.contains(&"sync_metadata".to_string()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");

        let versions: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_declared_index_fields_are_indexed() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let exists: bool = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type='index' AND name = ?1")
            .unwrap()
            .exists(["idx_credits_debtor_id"])
            .unwrap();
        assert!(exists);
    }

    #[test]
    fn test_queue_status_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let ok = conn.execute(
            "INSERT INTO sync_queue (id, entity_type, entity_id, operation, data, status, created_at, updated_at)
             VALUES ('q1', 'debtors', 'D1', 'update', '{}', 'pending', 0, 0)",
            [],
        );
        assert!(ok.is_ok());

        let bad = conn.execute(
            "INSERT INTO sync_queue (id, entity_type, entity_id, operation, data, status, created_at, updated_at)
             VALUES ('q2', 'debtors', 'D1', 'update', '{}', 'done', 0, 0)",
            [],
        );
        assert!(bad.is_err());
    }
}
