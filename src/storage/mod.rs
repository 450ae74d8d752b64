//! SQLite storage layer for offsync.
//!
//! This module provides the on-device persistence layer using SQLite with:
//! - WAL mode for concurrent reads during a sync
//! - One table per entity type with expression indexes on declared fields
//! - A durable mutation queue and a key/value metadata table
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Entity record storage
//! - [`queue`] - Sync queue operations
//! - [`meta`] - Sync metadata

pub mod meta;
pub mod queue;
pub mod schema;
pub mod sqlite;

pub use meta::LAST_SYNC_TIME_KEY;
pub use sqlite::{LocalStore, StorageStats, TableCount};
