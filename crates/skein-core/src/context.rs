use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ModelConfig};
use crate::hooks::WorkflowHooks;
use crate::traits::LlmClient;

/// Shared key/value store visible to every node and tool call of a workflow.
///
/// Reads may run concurrently; writes are serialized and the last writer wins.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    inner: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with initial values.
    pub fn from_map(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.read().get(key).cloned()
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.read()
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Point-in-time copy of every variable.
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, serde_json::Value>> {
        // A poisoned lock only means a writer panicked mid-insert; the map is still usable.
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, serde_json::Value>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-node invocation scope passed to every tool call.
///
/// Owned by one action loop run. Tool-private state lives here and is torn
/// down through [`crate::traits::Tool::destroy`] when the node finishes.
#[derive(Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub node_id: String,
    pub variables: VariableStore,
    pub llm: Arc<dyn LlmClient>,
    pub config: Arc<AppConfig>,
    /// Model parameters for this node, after action-level overrides.
    pub model: ModelConfig,
    pub hooks: Option<Arc<dyn WorkflowHooks>>,
    pub cancel: CancellationToken,
    state: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl ExecutionContext {
    pub fn new(
        workflow_id: impl Into<String>,
        node_id: impl Into<String>,
        variables: VariableStore,
        llm: Arc<dyn LlmClient>,
        config: Arc<AppConfig>,
    ) -> Self {
        let model = config.model.clone();
        Self {
            workflow_id: workflow_id.into(),
            node_id: node_id.into(),
            variables,
            llm,
            config,
            model,
            hooks: None,
            cancel: CancellationToken::new(),
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_hooks(mut self, hooks: Option<Arc<dyn WorkflowHooks>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = model;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Read a tool-private value (e.g. a selector map cache).
    pub fn state_get(&self, key: &str) -> Option<serde_json::Value> {
        self.lock_state().get(key).cloned()
    }

    pub fn state_set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.lock_state().insert(key.into(), value);
    }

    pub fn state_remove(&self, key: &str) -> Option<serde_json::Value> {
        self.lock_state().remove(key)
    }

    pub fn state_len(&self) -> usize {
        self.lock_state().len()
    }

    /// Drop all tool-private state.
    pub fn clear_state(&self) {
        self.lock_state().clear();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HashMap<String, serde_json::Value>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("workflow_id", &self.workflow_id)
            .field("node_id", &self.node_id)
            .field("model", &self.model.model_id)
            .field("hooks", &self.hooks.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("state_keys", &self.state_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_store_last_writer_wins() {
        let store = VariableStore::new();
        let other = store.clone();
        store.set("k", serde_json::json!(1));
        other.set("k", serde_json::json!(2));
        assert_eq!(store.get("k"), Some(serde_json::json!(2)));
        assert!(store.contains("k"));
        assert_eq!(store.remove("k"), Some(serde_json::json!(2)));
        assert!(store.get("k").is_none());
    }

    #[test]
    fn test_variable_store_snapshot_is_detached() {
        let mut seed = HashMap::new();
        seed.insert("topic".to_string(), serde_json::json!("rust"));
        let store = VariableStore::from_map(seed);
        let snap = store.snapshot();
        store.set("topic", serde_json::json!("go"));
        assert_eq!(snap["topic"], "rust");
        assert_eq!(store.get_str("topic").as_deref(), Some("go"));
    }

    #[tokio::test]
    async fn test_variable_store_concurrent_writers() {
        let store = VariableStore::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.set(format!("k{}", i), serde_json::json!(i));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.snapshot().len(), 16);
    }
}
