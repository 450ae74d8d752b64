//! Offline-first synchronization.
//!
//! Local mutations are written to the [`LocalStore`](crate::storage::LocalStore)
//! and queued in the same transaction. When the device is online the
//! orchestrator uploads the queue, then pulls fresh snapshots of each entity
//! table. Server-pushed changes are applied by the realtime bridge.
//!
//! # Architecture
//!
//! ```text
//! save/remove ──▶ SyncQueueManager ──▶ LocalStore (record + queue item)
//!                                            │
//! perform_sync ──▶ SyncOrchestrator ──upload──▶ RemoteApi
//!                        │          ◀─download──
//!                        └─▶ status listeners
//!
//! RealtimeChannel ──▶ RealtimeBridge ──▶ LocalStore ──▶ change listeners
//! ```
//!
//! # Example
//!
//! ```ignore
//! use offsync::sync::{SyncEngine, SupabaseClient};
//!
//! let engine = Arc::new(SyncEngine::new(store, Arc::new(SupabaseClient::new(&config)?)));
//! engine.add_status_listener(|status| println!("sync: {status}"));
//! engine.save(payload)?;
//! let report = engine.perform_sync().await?;
//! ```

mod connectivity;
mod engine;
mod notifier;
mod orchestrator;
mod queue;
mod realtime;
mod remote;
mod supabase_realtime;
mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use connectivity::{Connectivity, OnlineEdges};
pub use engine::{OFFLINE, SyncEngine};
pub use notifier::{Listener, ListenerId, ListenerRegistry};
pub use orchestrator::{ALREADY_SYNCING, NOT_CONFIGURED, SyncOrchestrator};
pub use queue::SyncQueueManager;
pub use realtime::{
    ChangeEvent, ChangeReceiver, ChangeSender, MemoryChannel, RealtimeBridge, RealtimeChannel,
    RemoteChange,
};
pub use remote::{REQUEST_TIMEOUT, RemoteApi, RemoteError, SupabaseClient};
pub use supabase_realtime::{HEARTBEAT_INTERVAL, SupabaseRealtime};
pub use types::{SyncReport, SyncStatus};
