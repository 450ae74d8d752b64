//! Command implementations.

pub mod completions;
pub mod init;
pub mod queue;
pub mod records;
pub mod status;
pub mod sync;
pub mod version;
pub mod watch;

use crate::config::{OffsyncConfig, load_config, resolve_db_path};
use crate::error::{Error, Result};
use crate::model::EntityType;
use crate::storage::LocalStore;
use crate::sync::{Connectivity, SupabaseClient, SyncEngine, SyncReport};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An opened local database and the configuration that located it.
pub(crate) struct Workspace {
    pub db_path: PathBuf,
    pub config: OffsyncConfig,
    pub store: Arc<LocalStore>,
}

impl Workspace {
    /// Open an initialized database.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the database file does not exist.
    pub fn open(db: Option<&Path>) -> Result<Self> {
        let config = load_config()?;
        let db_path = resolve_db_path(db, &config).ok_or(Error::NotInitialized)?;
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }
        let store = Arc::new(LocalStore::open(&db_path)?);
        Ok(Self {
            db_path,
            config,
            store,
        })
    }

    /// Sync engine over this workspace's store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured download tables are invalid or the
    /// HTTP client cannot be built.
    pub fn engine(&self, offline: bool) -> Result<SyncEngine<SupabaseClient>> {
        let remote = SupabaseClient::new(&self.config.supabase())?;
        Ok(SyncEngine::new(Arc::clone(&self.store), Arc::new(remote))
            .with_connectivity(Connectivity::new(!offline))
            .with_default_tables(self.config.download_tables()?))
    }
}

/// Runtime for the async parts of a command.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

pub(crate) fn parse_tables(names: &[String]) -> Result<Vec<EntityType>> {
    names.iter().map(|n| n.trim().parse()).collect()
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string(value)?;
    println!("{payload}");
    Ok(())
}

/// Print a sync report.
pub(crate) fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }

    if report.rejected {
        let message = report.message.as_deref().unwrap_or("Sync rejected");
        println!("{} {}", "Skipped:".yellow().bold(), message);
        return Ok(());
    }

    let headline = if report.success {
        "Sync complete".green().bold()
    } else {
        "Sync finished with errors".red().bold()
    };
    println!("{headline}");
    println!("  Synced: {}", report.synced);
    if report.failed > 0 {
        println!("  Failed: {}", report.failed.to_string().red());
        for error in &report.errors {
            println!("    {} {error}", "-".dimmed());
        }
    }
    if let Some(message) = &report.message {
        println!("  {}", message.dimmed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tables() {
        let tables = parse_tables(&["debtors".into(), " users".into()]).unwrap();
        assert_eq!(tables, vec![EntityType::Debtors, EntityType::Users]);
        assert!(matches!(
            parse_tables(&["loans".into()]),
            Err(Error::UnknownEntityType { .. })
        ));
    }

    #[test]
    fn test_open_missing_database_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let result = Workspace::open(Some(dir.path().join("missing.db").as_path()));
        assert!(matches!(result, Err(Error::NotInitialized)));
    }
}
