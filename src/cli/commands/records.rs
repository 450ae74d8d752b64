//! Record commands: put, delete, get.
//!
//! Writes go through the queue manager so every local mutation has a
//! matching queue item. Reads come straight from the local store.

use crate::cli::commands::{Workspace, print_json};
use crate::error::{Error, Result};
use crate::model::{EntityPayload, EntityType, QueueItem, Record};
use crate::sync::SyncQueueManager;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

#[derive(Serialize)]
struct MutationOutput<'a> {
    entity_type: EntityType,
    id: &'a str,
    operation: &'a str,
    queue_id: &'a str,
}

impl<'a> MutationOutput<'a> {
    fn new(item: &'a QueueItem) -> Self {
        Self {
            entity_type: item.entity_type,
            id: &item.entity_id,
            operation: item.operation.as_str(),
            queue_id: &item.id,
        }
    }
}

fn print_mutation(item: &QueueItem, json: bool) -> Result<()> {
    if json {
        return print_json(&MutationOutput::new(item));
    }
    println!(
        "{} {}/{} {}",
        "Queued".green(),
        item.entity_type,
        item.entity_id.bold(),
        format!("({} {})", item.operation, item.id).dimmed()
    );
    Ok(())
}

/// Parse the JSON argument of `put`, generating an id when absent.
fn parse_payload(entity_type: EntityType, data: &str) -> Result<EntityPayload> {
    let mut value: Value = serde_json::from_str(data)
        .map_err(|e| Error::InvalidArgument(format!("record is not valid JSON: {e}")))?;

    let Some(object) = value.as_object_mut() else {
        return Err(Error::InvalidArgument("record must be a JSON object".to_string()));
    };
    let has_id = object
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    if !has_id {
        object.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
    }

    EntityPayload::from_data(entity_type, value)
        .map_err(|e| Error::InvalidArgument(format!("invalid {entity_type} record: {e}")))
}

/// Execute `put`.
///
/// # Errors
///
/// Returns an error for an unknown entity type, malformed JSON, or a
/// storage failure.
pub fn execute_put(db_path: Option<&Path>, entity: &str, data: &str, json: bool) -> Result<()> {
    let entity_type: EntityType = entity.parse()?;
    let payload = parse_payload(entity_type, data)?;

    let workspace = Workspace::open(db_path)?;
    let item = SyncQueueManager::new(Arc::clone(&workspace.store)).save(payload)?;
    print_mutation(&item, json)
}

/// Execute `delete`.
///
/// Deleting an id that is not stored locally still queues the remote delete.
///
/// # Errors
///
/// Returns an error for an unknown entity type or a storage failure.
pub fn execute_delete(db_path: Option<&Path>, entity: &str, id: &str, json: bool) -> Result<()> {
    let entity_type: EntityType = entity.parse()?;
    let workspace = Workspace::open(db_path)?;
    let item = SyncQueueManager::new(Arc::clone(&workspace.store)).remove(entity_type, id)?;
    print_mutation(&item, json)
}

/// Execute `get`.
///
/// With an id, shows that record (active or not). Otherwise lists active
/// records, all records with `all`, or records matching `filter`.
///
/// # Errors
///
/// Returns `RecordNotFound` for a missing id, `InvalidArgument` for a
/// malformed or non-indexed filter.
pub fn execute_get(
    db_path: Option<&Path>,
    entity: &str,
    id: Option<&str>,
    all: bool,
    filter: Option<&str>,
    json: bool,
) -> Result<()> {
    let entity_type: EntityType = entity.parse()?;
    let workspace = Workspace::open(db_path)?;
    let store = &workspace.store;

    if let Some(id) = id {
        let record = store.get(entity_type, id)?.ok_or_else(|| Error::RecordNotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        })?;
        if json {
            return print_json(&record);
        }
        print_record(&record);
        return Ok(());
    }

    let records = match filter {
        Some(filter) => {
            let (field, value) = parse_filter(filter)?;
            store.find_by(entity_type, field, &value)?
        }
        None if all => store.get_all(entity_type)?,
        None => store.get_active(entity_type)?,
    };

    if json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("No {entity_type} records.");
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    println!("{}", format!("{} {entity_type}", records.len()).dimmed());
    Ok(())
}

/// Split `field=value`. The value is read as JSON when it parses, else as a string.
fn parse_filter(filter: &str) -> Result<(&str, Value)> {
    let (field, raw) = filter
        .split_once('=')
        .ok_or_else(|| Error::InvalidArgument(format!("expected FIELD=VALUE, got `{filter}`")))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(Error::InvalidArgument("filter field is empty".to_string()));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((field, value))
}

fn print_record(record: &Record) {
    let fields = serde_json::to_string(&record.fields).unwrap_or_default();
    if record.is_active {
        println!("{}  {fields}", record.id.bold());
    } else {
        println!("{}  {} {}", record.id.bold(), "(inactive)".yellow(), fields.dimmed());
    }
}
