//! Sync session types.

use serde::Serialize;

/// Lifecycle state of the sync session.
///
/// `Idle → Syncing → Success | Error → Idle`. A session only starts from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate outcome of a sync pass or session.
///
/// Item and table failures are counted here instead of being returned as
/// errors. A report with `rejected = true` means the session never started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub synced: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub rejected: bool,
}

impl SyncReport {
    /// A session that was refused before doing any work.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            rejected: true,
            ..Self::default()
        }
    }

    /// A completed pass. Succeeds when nothing failed.
    #[must_use]
    pub fn from_counts(synced: usize, failed: usize, errors: Vec<String>) -> Self {
        Self {
            success: failed == 0,
            synced,
            failed,
            errors,
            message: None,
            rejected: false,
        }
    }

    /// Combine two passes: counts are summed, errors concatenated.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.success = self.success && other.success;
        self.synced += other.synced;
        self.failed += other.failed;
        self.errors.extend(other.errors);
        self.rejected = self.rejected || other.rejected;
        self.message = match (self.message.take(), other.message) {
            (Some(a), Some(b)) => Some(format!("{a}; {b}")),
            (a, b) => a.or(b),
        };
        self
    }
}
