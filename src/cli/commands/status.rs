//! Status command implementation.

use crate::cli::commands::{Workspace, print_json};
use crate::error::Result;
use crate::storage::{StorageStats, TableCount};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    database: PathBuf,
    supabase_configured: bool,
    online: bool,
    #[serde(flatten)]
    stats: StorageStats,
}

/// Execute status command.
///
/// # Errors
///
/// Returns `NotInitialized` if there is no database, or a storage error.
pub fn execute(db_path: Option<&Path>, offline: bool, json: bool) -> Result<()> {
    let workspace = Workspace::open(db_path)?;
    let engine = workspace.engine(offline)?;

    let output = StatusOutput {
        supabase_configured: workspace.config.supabase().is_configured(),
        online: engine.connectivity().is_online(),
        stats: engine.storage_stats()?,
        database: workspace.db_path,
    };

    if json {
        return print_json(&output);
    }

    println!("{}", "offsync".bold());
    println!("  Database: {}", output.database.display());
    println!(
        "  Remote:   {}",
        if output.supabase_configured {
            "configured".green()
        } else {
            "not configured".yellow()
        }
    );
    println!(
        "  Network:  {}",
        if output.online {
            "online".green()
        } else {
            "offline".yellow()
        }
    );
    match output.stats.last_sync_time {
        Some(at) => println!("  Last sync: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  Last sync: {}", "never".dimmed()),
    }

    println!();
    println!("{}", "Queue".bold());
    println!("  Pending sync:    {}", output.stats.pending_sync);
    if output.stats.needs_attention > 0 {
        println!(
            "  Needs attention: {}  {}",
            output.stats.needs_attention.to_string().red(),
            "(offsync queue list --stuck)".dimmed()
        );
    }

    println!();
    println!("{}", "Records".bold());
    for TableCount {
        entity_type,
        total,
        active,
    } in &output.stats.tables
    {
        let inactive = total - active;
        if inactive > 0 {
            println!("  {:<14} {active:>6}  {}", entity_type.table(), format!("(+{inactive} inactive)").dimmed());
        } else {
            println!("  {:<14} {active:>6}", entity_type.table());
        }
    }

    Ok(())
}
