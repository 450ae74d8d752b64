//! Initialize the local database.
//!
//! Creates the SQLite file with every entity table, the mutation queue and
//! the metadata table. Remote credentials are not required; an unconfigured
//! installation works fully offline and rejects sync requests.

use crate::config::{load_config, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::LocalStore;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    supabase_configured: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `force` is not
/// set, or an error if the file cannot be created.
pub fn execute(db_path: Option<&Path>, force: bool, json: bool) -> Result<()> {
    let config = load_config()?;
    let db_path = resolve_db_path(db_path, &config)
        .ok_or_else(|| Error::Config("Could not determine database location".to_string()))?;

    if db_path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized { path: db_path });
        }
        remove_database(&db_path)?;
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    LocalStore::open(&db_path)?;

    let supabase_configured = config.supabase().is_configured();

    if json {
        let output = InitOutput {
            database: db_path,
            supabase_configured,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized offsync database");
        println!("  Database: {}", db_path.display());
        if !supabase_configured {
            println!();
            println!(
                "Supabase is not configured; records stay local until \
                 OFFSYNC_SUPABASE_URL and OFFSYNC_SUPABASE_KEY are set."
            );
        }
    }

    Ok(())
}

/// Remove the database and its WAL side files.
fn remove_database(db_path: &Path) -> Result<()> {
    fs::remove_file(db_path)?;
    for suffix in ["-wal", "-shm"] {
        let mut side = db_path.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            fs::remove_file(side)?;
        }
    }
    Ok(())
}
