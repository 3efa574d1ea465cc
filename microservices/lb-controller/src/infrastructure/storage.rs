//! Durable key-value storage
//!
//! One flat JSON keyspace backs everything the control plane must not lose
//! across restarts: the registry map, per-actor config/health/workflow
//! state, the per-actor alarm slot, workflow step checkpoints and the
//! pending-workflow index.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use edgelb_core::{EdgelbError, Result};
use edgelb_workflow::{CheckpointStore, WorkflowError};

/// Key layout for the controller's durable state.
pub mod keys {
    pub const REGISTRY_PREFIX: &str = "registry/";
    pub const PENDING_PREFIX: &str = "wf-pending/";

    pub fn registry(name: &str) -> String {
        format!("{}{}", REGISTRY_PREFIX, name)
    }

    pub fn lb_config(name: &str) -> String {
        format!("lb/{}/config", name)
    }

    pub fn lb_health(name: &str) -> String {
        format!("lb/{}/health", name)
    }

    pub fn lb_workflow(name: &str) -> String {
        format!("lb/{}/workflow", name)
    }

    /// The single pending-wake-up-time slot for one actor.
    pub fn alarm(name: &str) -> String {
        format!("alarm/{}", name)
    }

    pub fn checkpoint(workflow_id: &str, step: &str) -> String {
        format!("wf/{}/{}", workflow_id, step)
    }

    pub fn checkpoint_prefix(workflow_id: &str) -> String {
        format!("wf/{}/", workflow_id)
    }

    pub fn pending(workflow_id: &str) -> String {
        format!("{}{}", PENDING_PREFIX, workflow_id)
    }
}

/// Restart-surviving key-value storage.
#[async_trait]
pub trait DurableStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>>;
}

/// Typed read helper over the JSON store.
pub async fn get_json<T: DeserializeOwned>(store: &dyn DurableStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Typed write helper over the JSON store.
pub async fn put_json<T: Serialize>(store: &dyn DurableStore, key: &str, value: &T) -> Result<()> {
    store.put(key, serde_json::to_value(value)?).await
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }
}

/// File-backed store: the whole keyspace lives in one `state.json` under
/// the data dir, rewritten through a temp file + rename on every mutation.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl FileStore {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let dir: PathBuf = data_dir.into();
        fs::create_dir_all(&dir)?;
        let path = dir.join("state.json");
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, serde_json::Value>) -> Result<()> {
        let raw = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&raw)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, serde_json::Value)>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Workflow checkpoint persistence on top of the durable store.
pub struct StoreCheckpoints {
    store: Arc<dyn DurableStore>,
}

impl StoreCheckpoints {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }
}

fn storage_err(err: EdgelbError) -> WorkflowError {
    WorkflowError::Storage(err.to_string())
}

#[async_trait]
impl CheckpointStore for StoreCheckpoints {
    async fn load(
        &self,
        workflow_id: &str,
        step: &str,
    ) -> std::result::Result<Option<serde_json::Value>, WorkflowError> {
        self.store
            .get(&keys::checkpoint(workflow_id, step))
            .await
            .map_err(storage_err)
    }

    async fn save(
        &self,
        workflow_id: &str,
        step: &str,
        outcome: &serde_json::Value,
    ) -> std::result::Result<(), WorkflowError> {
        self.store
            .put(&keys::checkpoint(workflow_id, step), outcome.clone())
            .await
            .map_err(storage_err)
    }

    async fn clear(&self, workflow_id: &str) -> std::result::Result<(), WorkflowError> {
        let entries = self
            .store
            .list_prefix(&keys::checkpoint_prefix(workflow_id))
            .await
            .map_err(storage_err)?;
        for (key, _) in entries {
            self.store.delete(&key).await.map_err(storage_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("edgelb-test-{}", Uuid::new_v4()));

        {
            let store = FileStore::open(&dir).unwrap();
            store
                .put("registry/lb1", json!({"name": "lb1"}))
                .await
                .unwrap();
            store.put("alarm/lb1", json!("2026-01-01T00:00:00Z")).await.unwrap();
        }

        let store = FileStore::open(&dir).unwrap();
        assert_eq!(
            store.get("registry/lb1").await.unwrap(),
            Some(json!({"name": "lb1"}))
        );
        store.delete("alarm/lb1").await.unwrap();
        assert!(store.get("alarm/lb1").await.unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let store = MemoryStore::new();
        store.put("registry/a", json!(1)).await.unwrap();
        store.put("registry/b", json!(2)).await.unwrap();
        store.put("lb/a/config", json!(3)).await.unwrap();

        let mut listed = store.list_prefix(keys::REGISTRY_PREFIX).await.unwrap();
        listed.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "registry/a");
    }

    #[tokio::test]
    async fn test_checkpoints_roundtrip_and_clear() {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let checkpoints = StoreCheckpoints::new(store.clone());

        checkpoints
            .save("wf-1", "probe-endpoint", &json!({"isHealthy": true}))
            .await
            .unwrap();
        assert!(checkpoints
            .load("wf-1", "probe-endpoint")
            .await
            .unwrap()
            .is_some());
        assert!(checkpoints.load("wf-1", "other").await.unwrap().is_none());

        checkpoints.clear("wf-1").await.unwrap();
        assert!(checkpoints
            .load("wf-1", "probe-endpoint")
            .await
            .unwrap()
            .is_none());
    }
}
