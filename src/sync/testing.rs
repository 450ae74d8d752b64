//! In-memory remote for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::model::{EntityType, Record};
use crate::sync::remote::{RemoteApi, RemoteError};

/// One call made against [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Upsert(EntityType, String),
    Delete(EntityType, String),
    SelectActive(EntityType),
    FetchOne(EntityType, String),
}

#[derive(Default)]
struct MockState {
    tables: HashMap<EntityType, BTreeMap<String, Record>>,
    failing_tables: HashSet<EntityType>,
    failing_ids: HashSet<String>,
    calls: Vec<RemoteCall>,
}

/// A `RemoteApi` backed by maps, with failure injection.
pub struct MockRemote {
    configured: bool,
    yield_on_call: bool,
    state: Mutex<MockState>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            configured: true,
            yield_on_call: false,
            state: Mutex::new(MockState::default()),
        }
    }

    /// A remote whose `is_configured` is false.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Yield to the scheduler at the start of every call, so concurrent
    /// sessions interleave on a single-threaded runtime.
    #[must_use]
    pub fn yielding(mut self) -> Self {
        self.yield_on_call = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Seed a server-side record.
    pub fn insert(&self, entity_type: EntityType, record: Record) {
        self.state()
            .tables
            .entry(entity_type)
            .or_default()
            .insert(record.id.clone(), record);
    }

    pub fn record(&self, entity_type: EntityType, id: &str) -> Option<Record> {
        self.state().tables.get(&entity_type).and_then(|t| t.get(id).cloned())
    }

    /// Every call against `entity_type` fails.
    pub fn fail_table(&self, entity_type: EntityType) {
        self.state().failing_tables.insert(entity_type);
    }

    /// Every upsert/delete/fetch for `id` fails.
    pub fn fail_id(&self, id: &str) {
        self.state().failing_ids.insert(id.to_string());
    }

    pub fn heal_id(&self, id: &str) {
        self.state().failing_ids.remove(id);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    async fn enter(&self, call: RemoteCall) -> Result<(), RemoteError> {
        if self.yield_on_call {
            tokio::task::yield_now().await;
        }

        let mut state = self.state();
        let (entity_type, id) = match &call {
            RemoteCall::Upsert(t, id) | RemoteCall::Delete(t, id) | RemoteCall::FetchOne(t, id) => {
                (*t, Some(id.clone()))
            }
            RemoteCall::SelectActive(t) => (*t, None),
        };
        state.calls.push(call);

        let id_fails = id.is_some_and(|id| state.failing_ids.contains(&id));
        if state.failing_tables.contains(&entity_type) || id_fails {
            return Err(RemoteError::Status {
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl RemoteApi for MockRemote {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn upsert(&self, entity_type: EntityType, record: &Record) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Upsert(entity_type, record.id.clone())).await?;
        self.insert(entity_type, record.clone());
        Ok(())
    }

    async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError> {
        self.enter(RemoteCall::Delete(entity_type, id.to_string())).await?;
        if let Some(table) = self.state().tables.get_mut(&entity_type) {
            table.remove(id);
        }
        Ok(())
    }

    async fn select_active(&self, entity_type: EntityType) -> Result<Vec<Record>, RemoteError> {
        self.enter(RemoteCall::SelectActive(entity_type)).await?;
        Ok(self
            .state()
            .tables
            .get(&entity_type)
            .map(|t| t.values().filter(|r| r.is_active).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_one(&self, entity_type: EntityType, id: &str) -> Result<Option<Record>, RemoteError> {
        self.enter(RemoteCall::FetchOne(entity_type, id.to_string())).await?;
        Ok(self.record(entity_type, id))
    }
}
