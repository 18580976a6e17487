//! Durable map `agent_id -> LifecycleRecord` (spec §4.3). The single
//! source of truth for agent state; every state transition in the
//! Lifecycle Runner persists here before the runner continues.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

use cairn_core::{AgentId, AgentState, Error, LifecycleRecord, Result};

use crate::object_store::ObjectStore;

fn agent_key(agent_id: &str) -> String {
    format!("agent:{agent_id}")
}

/// Concurrent, persisted lifecycle store. Reads are served from an
/// in-memory cache; writes go to the cache and the backing store before
/// `save` returns, so a `load`/`list` immediately after a `save` observes
/// it.
pub struct LifecycleStore {
    cache: DashMap<AgentId, LifecycleRecord>,
    store: Arc<dyn ObjectStore>,
}

impl LifecycleStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            cache: DashMap::new(),
            store,
        }
    }

    pub async fn save(&self, record: LifecycleRecord) -> Result<()> {
        let key = agent_key(&record.agent_id);
        let bytes = serde_json::to_vec(&record)?;
        self.store.put(&key, bytes).await?;
        self.cache.insert(record.agent_id.clone(), record);
        Ok(())
    }

    pub fn load(&self, agent_id: &str) -> Option<LifecycleRecord> {
        self.cache.get(agent_id).map(|r| r.clone())
    }

    pub async fn delete(&self, agent_id: &str) -> Result<()> {
        self.cache.remove(agent_id);
        self.store.delete(&agent_key(agent_id)).await?;
        Ok(())
    }

    pub fn list_all(&self) -> Vec<LifecycleRecord> {
        self.cache.iter().map(|r| r.value().clone()).collect()
    }

    /// Records whose state is not `accepted` or `rejected`. `errored` is
    /// included here — it is "active" for listing purposes even though
    /// it is terminal for scheduling.
    pub fn list_active(&self) -> Vec<LifecycleRecord> {
        self.cache
            .iter()
            .filter(|r| !matches!(r.value().state, AgentState::Accepted | AgentState::Rejected))
            .map(|r| r.value().clone())
            .collect()
    }

    /// Re-hydrate the in-memory cache from the backing store. Used at
    /// startup before Recovery (§4.10) inspects `list_active`.
    pub async fn restore_from_store(&self) -> Result<()> {
        for key in self.store.list("agent").await? {
            let bytes = self.store.get(&key).await?;
            let record: LifecycleRecord = serde_json::from_slice(&bytes)
                .map_err(|e| Error::StorageError(format!("corrupt lifecycle record {key}: {e}")))?;
            self.cache.insert(record.agent_id.clone(), record);
        }
        Ok(())
    }

    /// Delete every terminal record (`accepted`, `rejected`, `errored`)
    /// whose `state_changed_at` is older than `max_age`. Returns the
    /// count deleted. Scratch-artifact cleanup at `overlay_location` is
    /// the caller's responsibility (the Orchestrator owns the trash
    /// directory layout).
    pub async fn cleanup_old(&self, max_age: std::time::Duration) -> Result<Vec<LifecycleRecord>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let stale: Vec<LifecycleRecord> = self
            .cache
            .iter()
            .filter(|r| {
                matches!(
                    r.value().state,
                    AgentState::Accepted | AgentState::Rejected | AgentState::Errored
                ) && r.value().state_changed_at < cutoff
            })
            .map(|r| r.value().clone())
            .collect();

        for record in &stale {
            self.delete(&record.agent_id).await?;
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalObjectStore;
    use cairn_core::TaskPriority;

    fn store() -> LifecycleStore {
        let dir = tempfile::tempdir().unwrap();
        let obj: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));
        std::mem::forget(dir);
        LifecycleStore::new(obj)
    }

    fn record(id: &str, state: AgentState) -> LifecycleRecord {
        let mut r = LifecycleRecord::new(id.to_string(), "task".into(), TaskPriority::Normal, id.to_string());
        r.transition(state);
        r
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let s = store();
        s.save(record("agent-1", AgentState::Queued)).await.unwrap();
        let loaded = s.load("agent-1").unwrap();
        assert_eq!(loaded.state, AgentState::Queued);
    }

    #[tokio::test]
    async fn list_active_excludes_accepted_and_rejected_but_keeps_errored() {
        let s = store();
        s.save(record("a", AgentState::Queued)).await.unwrap();
        s.save(record("b", AgentState::Accepted)).await.unwrap();
        s.save(record("c", AgentState::Rejected)).await.unwrap();
        s.save(record("d", AgentState::Errored)).await.unwrap();

        let active: Vec<_> = s.list_active().into_iter().map(|r| r.agent_id).collect();
        assert!(active.contains(&"a".to_string()));
        assert!(active.contains(&"d".to_string()));
        assert!(!active.contains(&"b".to_string()));
        assert!(!active.contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let s = store();
        s.save(record("a", AgentState::Accepted)).await.unwrap();
        s.delete("a").await.unwrap();
        s.delete("a").await.unwrap();
        assert!(s.load("a").is_none());
    }

    #[tokio::test]
    async fn cleanup_old_removes_only_aged_terminal_records() {
        let s = store();
        let mut fresh = record("fresh", AgentState::Accepted);
        fresh.state_changed_at = Utc::now();
        s.save(fresh).await.unwrap();

        let mut stale = record("stale", AgentState::Rejected);
        stale.state_changed_at = Utc::now() - chrono::Duration::days(30);
        s.save(stale).await.unwrap();

        let mut active = record("active", AgentState::Queued);
        active.state_changed_at = Utc::now() - chrono::Duration::days(30);
        s.save(active).await.unwrap();

        let removed = s.cleanup_old(std::time::Duration::from_secs(86_400)).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].agent_id, "stale");
        assert!(s.load("fresh").is_some());
        assert!(s.load("active").is_some());
    }

    #[tokio::test]
    async fn restore_from_store_repopulates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let obj: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(dir.path().to_path_buf()));

        {
            let s = LifecycleStore::new(obj.clone());
            s.save(record("a", AgentState::Queued)).await.unwrap();
        }

        let restored = LifecycleStore::new(obj);
        restored.restore_from_store().await.unwrap();
        assert!(restored.load("a").is_some());
    }
}
