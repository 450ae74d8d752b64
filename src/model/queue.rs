//! Sync queue model.
//!
//! A queue item is one local mutation the server has not confirmed yet.

use serde::{Deserialize, Serialize};

use super::entity::{EntityPayload, EntityType};
use crate::error::Error;

/// Number of `failed` transitions after which an item stops being retried.
///
/// The comparison is strict (`retry_count < MAX_RETRIES`), so an item is
/// attempted at most three times automatically.
pub const MAX_RETRIES: u32 = 3;

/// Kind of mutation carried by a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// String representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(Error::InvalidArgument(format!("unknown operation: {s}"))),
        }
    }
}

/// Lifecycle state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    /// String representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(Error::InvalidArgument(format!("unknown queue status: {s}"))),
        }
    }
}

/// A pending local mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Generated identifier (`q_<uuid>`).
    pub id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: Operation,
    /// Full snapshot of the entity at enqueue time.
    pub payload: EntityPayload,
    pub status: QueueStatus,
    pub error_message: Option<String>,
    /// Number of transitions into `failed`.
    pub retry_count: u32,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
}

impl QueueItem {
    /// Whether the orchestrator should attempt this item on the next pass.
    #[must_use]
    pub fn is_retry_eligible(&self) -> bool {
        match self.status {
            QueueStatus::Pending => true,
            QueueStatus::Failed => self.retry_count < MAX_RETRIES,
            QueueStatus::Processing | QueueStatus::Completed => false,
        }
    }

    /// Failed and out of automatic retries; needs an operator.
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        self.status == QueueStatus::Failed && self.retry_count >= MAX_RETRIES
    }
}
