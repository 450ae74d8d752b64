//! Watch command: apply server-pushed changes until Ctrl-C.

use crate::cli::commands::{Workspace, parse_tables, runtime};
use crate::error::{Error, Result};
use crate::sync::{OFFLINE, RealtimeBridge, RemoteChange, RemoteError, SupabaseRealtime};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Execute the watch command.
///
/// Each applied change is printed as it arrives (one JSON object per line
/// in JSON mode).
///
/// # Errors
///
/// Returns `NotConfigured` without credentials, or a remote or storage error.
pub fn execute(tables: &[String], db_path: Option<&Path>, offline: bool, json: bool) -> Result<()> {
    let workspace = Workspace::open(db_path)?;
    let supabase = workspace.config.supabase();
    if !supabase.is_configured() {
        return Err(Error::Remote(RemoteError::NotConfigured));
    }
    if offline {
        eprintln!("{} {OFFLINE}", "Skipped:".yellow().bold());
        return Ok(());
    }

    let tables = if tables.is_empty() {
        workspace.config.download_tables()?
    } else {
        parse_tables(tables)?
    };

    let bridge = RealtimeBridge::new(Arc::clone(&workspace.store));
    let applied = Arc::new(AtomicUsize::new(0));
    {
        let applied = Arc::clone(&applied);
        bridge.add_listener(move |change: &RemoteChange| {
            applied.fetch_add(1, Ordering::Relaxed);
            print_change(change, json);
        });
    }

    let channel = SupabaseRealtime::new(&supabase);
    let rt = runtime()?;
    rt.block_on(async {
        let rx = bridge.start(&channel, &tables).await?;
        if !json {
            eprintln!("Watching {} table(s). Press Ctrl-C to stop.", tables.len());
        }

        let outcome = tokio::select! {
            result = bridge.pump(rx) => result.map(|_| ()),
            _ = tokio::signal::ctrl_c() => Ok(()),
        };

        bridge.stop(&channel, &tables).await;
        channel.close().await;
        outcome
    })?;

    info!(applied = applied.load(Ordering::Relaxed), "Watch stopped");
    Ok(())
}

fn print_change(change: &RemoteChange, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(change) {
            println!("{line}");
        }
        return;
    }

    let kind = change.event.kind();
    let kind = match kind {
        "INSERT" => kind.green(),
        "UPDATE" => kind.cyan(),
        _ => kind.red(),
    };
    println!("{kind:<6} {}/{}", change.entity_type, change.event.id().bold());
}
