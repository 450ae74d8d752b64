//! Error types for offsync.
//!
//! Provides structured error handling with:
//! - A distinct `StorageError` for local persistence failures
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=storage, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::RemoteError;

/// Result type alias for offsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Storage Error ─────────────────────────────────────────────

/// Local persistence failure.
///
/// Never silently retried: a lost write acknowledgement for a queued
/// mutation is surfaced to the caller.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(#[source] rusqlite::Error),

    #[error("storage corrupted: {0}")]
    Corrupted(#[source] rusqlite::Error),

    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage connection lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DiskFull) => Self::QuotaExceeded(err),
            Some(rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase) => {
                Self::Corrupted(err)
            }
            _ => Self::Database(err),
        }
    }
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Storage (exit 2)
    NotInitialized,
    AlreadyInitialized,
    StorageError,
    QuotaExceeded,
    StorageCorrupted,

    // Not Found (exit 3)
    RecordNotFound,
    QueueItemNotFound,

    // Validation (exit 4)
    UnknownEntityType,
    InvalidArgument,

    // Remote (exit 6)
    RemoteError,

    // Config (exit 7)
    NotConfigured,
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::StorageError => "STORAGE_ERROR",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::StorageCorrupted => "STORAGE_CORRUPTED",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::QueueItemNotFound => "QUEUE_ITEM_NOT_FOUND",
            Self::UnknownEntityType => "UNKNOWN_ENTITY_TYPE",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::RemoteError => "REMOTE_ERROR",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::StorageError
            | Self::QuotaExceeded
            | Self::StorageCorrupted => 2,
            Self::RecordNotFound | Self::QueueItemNotFound => 3,
            Self::UnknownEntityType | Self::InvalidArgument => 4,
            Self::RemoteError => 6,
            Self::NotConfigured | Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether retrying the same call later can succeed.
    ///
    /// True for transient remote failures and busy/locked storage.
    /// Quota and corruption need operator action first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteError | Self::StorageError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in offsync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `offsync init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Record not found: {entity_type}/{id}")]
    RecordNotFound { entity_type: String, id: String },

    #[error("Queue item not found: {id}")]
    QueueItemNotFound { id: String },

    #[error("Unknown entity type: {name}")]
    UnknownEntityType { name: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            Self::QueueItemNotFound { .. } => ErrorCode::QueueItemNotFound,
            Self::UnknownEntityType { .. } => ErrorCode::UnknownEntityType,
            Self::Storage(StorageError::QuotaExceeded(_)) => ErrorCode::QuotaExceeded,
            Self::Storage(StorageError::Corrupted(_)) => ErrorCode::StorageCorrupted,
            Self::Storage(_) => ErrorCode::StorageError,
            Self::Remote(RemoteError::NotConfigured) => ErrorCode::NotConfigured,
            Self::Remote(_) => ErrorCode::RemoteError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `offsync init` to create the local database".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::RecordNotFound { entity_type, .. } => Some(format!(
                "Use `offsync get {entity_type}` to list stored records, \
                 or `offsync sync entity {entity_type} <id>` to pull it from the server."
            )),

            Self::QueueItemNotFound { .. } => {
                Some("Use `offsync queue list` to see queued mutations.".to_string())
            }

            Self::UnknownEntityType { .. } => Some(
                "Valid entity types: debtors, credits, collaterals, notifications, users"
                    .to_string(),
            ),

            Self::Storage(StorageError::QuotaExceeded(_)) => Some(
                "The device is out of space. Free disk space; queued mutations are kept."
                    .to_string(),
            ),

            Self::Storage(StorageError::Corrupted(_)) => Some(
                "The local database is damaged. Unsynced mutations may be lost; \
                 run `offsync init --force` and `offsync sync down` to rebuild."
                    .to_string(),
            ),

            Self::Remote(RemoteError::NotConfigured) => Some(
                "Set OFFSYNC_SUPABASE_URL and OFFSYNC_SUPABASE_KEY, \
                 or add supabase_url / supabase_anon_key to ~/.offsync/config.json"
                    .to_string(),
            ),

            Self::Storage(_)
            | Self::Remote(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
