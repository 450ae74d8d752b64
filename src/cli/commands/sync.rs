//! Sync command implementation.
//!
//! `full` (the default) runs the engine's full session: upload the queue,
//! then download fresh snapshots. `up` and `down` run one pass each, and
//! `entity` refreshes a single record. Every variant honors `--offline`.

use crate::cli::SyncCommands;
use crate::cli::commands::{Workspace, parse_tables, print_json, print_report, runtime};
use crate::error::Result;
use crate::model::{EntityType, Record};
use crate::sync::{OFFLINE, SyncReport};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

#[derive(Serialize)]
struct EntityOutput<'a> {
    entity_type: EntityType,
    id: &'a str,
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a Record>,
}

/// Execute a sync command.
///
/// Item and table failures are reported in the output, not as errors.
///
/// # Errors
///
/// Returns an error for a missing database, invalid table names, or a local
/// storage failure.
pub fn execute(
    command: Option<&SyncCommands>,
    db_path: Option<&Path>,
    offline: bool,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::open(db_path)?;
    let engine = workspace.engine(offline)?;
    engine.add_status_listener(|status| debug!(%status, "Sync status changed"));

    if !engine.connectivity().is_online() {
        return print_report(&SyncReport::rejected(OFFLINE), json);
    }

    let rt = runtime()?;
    match command {
        None | Some(SyncCommands::Full) => {
            let report = rt.block_on(engine.perform_sync())?;
            print_report(&report, json)
        }
        Some(SyncCommands::Up) => {
            let report = rt.block_on(engine.orchestrator().sync_to_remote())?;
            print_report(&report, json)
        }
        Some(SyncCommands::Down { tables }) => {
            let tables = parse_tables(tables)?;
            let tables = (!tables.is_empty()).then_some(tables.as_slice());
            let report = rt.block_on(engine.orchestrator().sync_from_remote(tables))?;
            print_report(&report, json)
        }
        Some(SyncCommands::Entity { entity, id }) => {
            let entity_type: EntityType = entity.parse()?;
            let record = rt.block_on(engine.orchestrator().sync_entity(entity_type, id))?;
            print_entity(entity_type, id, record.as_ref(), json)
        }
    }
}

fn print_entity(
    entity_type: EntityType,
    id: &str,
    record: Option<&Record>,
    json: bool,
) -> Result<()> {
    if json {
        return print_json(&EntityOutput {
            entity_type,
            id,
            found: record.is_some(),
            record,
        });
    }

    match record {
        Some(_) => println!("{} {entity_type}/{}", "Refreshed".green(), id.bold()),
        None => println!(
            "{} {entity_type}/{} {}",
            "Removed".yellow(),
            id.bold(),
            "(not found on server)".dimmed()
        ),
    }
    Ok(())
}
