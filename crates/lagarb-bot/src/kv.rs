//! Shared key-value store and decision publishing.

use crate::error::AppResult;
use dashmap::DashMap;
use lagarb_detector::EdgeDecision;
use std::sync::Arc;
use tracing::debug;

/// Minimal key-value surface for published decisions.
pub trait KeyValueStore: Send + Sync {
    fn set(&self, key: &str, value: String);
    fn get(&self, key: &str) -> Option<String>;
    /// Keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> Vec<String>;
}

/// In-process store shared between tasks.
#[derive(Debug, Default)]
pub struct SharedKvStore {
    entries: DashMap<String, String>,
}

impl SharedKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for SharedKvStore {
    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn keys(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

/// Writes gate-approved decisions under `<namespace>:edge:<symbol>`.
#[derive(Clone)]
pub struct DecisionPublisher {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl DecisionPublisher {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn key_for(&self, symbol: &str) -> String {
        format!("{}:edge:{}", self.namespace, symbol)
    }

    /// Publish the full decision. Returns the key written.
    pub fn publish(&self, decision: &EdgeDecision) -> AppResult<String> {
        let key = self.key_for(decision.symbol.as_str());
        let value = serde_json::to_string(decision)?;
        self.store.set(&key, value);
        debug!(%key, trigger = %decision.trigger_type, "Decision published");
        Ok(key)
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }
}
