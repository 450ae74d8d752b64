//! Data models for offsync.
//!
//! This module contains the sync domain models:
//! - EntityType / Record (opaque keyed business records)
//! - EntityPayload (typed mutation payloads)
//! - QueueItem (pending local mutations)

pub mod entity;
pub mod queue;

pub use entity::{
    Collateral, Credit, Debtor, EntityPayload, EntityType, Notification, Record, User,
};
pub use queue::{MAX_RETRIES, Operation, QueueItem, QueueStatus};
