//! Queue command implementation.

use crate::cli::QueueCommands;
use crate::cli::commands::{Workspace, print_json};
use crate::error::Result;
use crate::model::{QueueItem, QueueStatus};
use crate::sync::SyncQueueManager;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Serialize)]
struct ClearOutput {
    removed: usize,
}

/// Execute a queue command.
///
/// # Errors
///
/// Returns `QueueItemNotFound` or `InvalidArgument` for a bad requeue, or a
/// storage error.
pub fn execute(command: &QueueCommands, db_path: Option<&Path>, json: bool) -> Result<()> {
    let workspace = Workspace::open(db_path)?;
    let queue = SyncQueueManager::new(Arc::clone(&workspace.store));

    match command {
        QueueCommands::List { status, stuck } => {
            let items = if *stuck {
                queue.needs_attention()?
            } else {
                let status = status.as_deref().map(str::parse::<QueueStatus>).transpose()?;
                queue.list(status)?
            };
            if json {
                return print_json(&items);
            }
            print_items(&items);
            Ok(())
        }
        QueueCommands::Requeue { id } => {
            let item = queue.requeue(id)?;
            if json {
                return print_json(&item);
            }
            println!(
                "{} {} {}",
                "Requeued".green(),
                item.id.bold(),
                format!("({} {}/{})", item.operation, item.entity_type, item.entity_id).dimmed()
            );
            Ok(())
        }
        QueueCommands::Clear => {
            let removed = queue.clear_completed()?;
            if json {
                return print_json(&ClearOutput { removed });
            }
            println!("Removed {removed} completed item(s)");
            Ok(())
        }
    }
}

fn status_label(item: &QueueItem) -> ColoredString {
    let label = item.status.as_str();
    if item.needs_attention() {
        label.red().bold()
    } else {
        match item.status {
            QueueStatus::Pending => label.normal(),
            QueueStatus::Processing => label.cyan(),
            QueueStatus::Completed => label.green(),
            QueueStatus::Failed => label.yellow(),
        }
    }
}

fn print_items(items: &[QueueItem]) {
    if items.is_empty() {
        println!("Queue is empty.");
        return;
    }

    for item in items {
        println!(
            "{}  {:<10} {:<6} {}/{}",
            item.id.dimmed(),
            status_label(item),
            item.operation.as_str(),
            item.entity_type,
            item.entity_id.bold()
        );
        if let Some(error) = &item.error_message {
            println!("    {} {error} {}", "!".red(), format!("(retries: {})", item.retry_count).dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{EntityPayload, EntityType, Operation};
    use crate::storage::LocalStore;
    use serde_json::json;

    #[test]
    fn test_requeue_pending_item_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("offsync.db");
        let store = LocalStore::open(&db).unwrap();
        let payload = EntityPayload::from_data(EntityType::Users, json!({"id": "U1"})).unwrap();
        let item = store.enqueue(Operation::Create, payload).unwrap();
        drop(store);

        let result = execute(&QueueCommands::Requeue { id: item.id }, Some(db.as_path()), true);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));

        let result = execute(&QueueCommands::Requeue { id: "q_missing".into() }, Some(db.as_path()), true);
        assert!(matches!(result, Err(Error::QueueItemNotFound { .. })));
    }

    #[test]
    fn test_list_rejects_unknown_status() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("offsync.db");
        LocalStore::open(&db).unwrap();

        let command = QueueCommands::List {
            status: Some("stalled".into()),
            stuck: false,
        };
        assert!(matches!(execute(&command, Some(db.as_path()), true), Err(Error::InvalidArgument(_))));
    }
}
