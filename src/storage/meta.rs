//! Key/value sync metadata.

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use crate::error::Result;
use crate::storage::sqlite::LocalStore;

/// Metadata key for the time of the last successful download pass.
pub const LAST_SYNC_TIME_KEY: &str = "lastSyncTime";

impl LocalStore {
    /// Read a metadata value.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM sync_metadata WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Write a metadata value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.mutate("set_meta", |tx| {
            tx.execute(
                "INSERT INTO sync_metadata (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, now],
            )?;
            Ok(())
        })
    }

    /// Time of the last successful download pass.
    ///
    /// An unparseable stored value reads as `None`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails.
    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.get_meta(LAST_SYNC_TIME_KEY)?.and_then(|v| {
            DateTime::parse_from_rfc3339(&v)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }))
    }

    /// Record the time of a successful download pass.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the write fails.
    pub fn set_last_sync_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.set_meta(LAST_SYNC_TIME_KEY, &at.to_rfc3339())
    }
}
