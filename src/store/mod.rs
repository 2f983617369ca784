//! Persistence collaborator: namespaced key/value plus append-only lists.
//!
//! Session metadata and history, and the confirmation allow-list, are
//! persisted through this seam. The store is expected to provide its own
//! concurrency discipline; [`MemoryStore`] guards everything behind one lock
//! so read-modify-write sequences performed under a single call are atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

/// Namespaced key/value + append-only-list store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value by key.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Set a value, replacing any previous one.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Delete a key (value or list). Returns whether anything was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// List keys (values and lists) under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Append an entry to the list stored at `key`, creating it if needed.
    async fn append(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Read the full list stored at `key` (empty if absent).
    async fn range(&self, key: &str) -> Result<Vec<serde_json::Value>>;
}

#[derive(Default)]
struct MemoryStoreInner {
    values: HashMap<String, serde_json::Value>,
    lists: HashMap<String, Vec<serde_json::Value>>,
}

/// In-memory store for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.inner.lock().await.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.inner.lock().await.values.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let had_value = inner.values.remove(key).is_some();
        let had_list = inner.lists.remove(key).is_some();
        Ok(had_value || had_list)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let mut keys: Vec<String> = inner
            .values
            .keys()
            .chain(inner.lists.keys())
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn append(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.inner
            .lock()
            .await
            .lists
            .entry(key.to_owned())
            .or_default()
            .push(value);
        Ok(())
    }

    async fn range(&self, key: &str) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .inner
            .lock()
            .await
            .lists
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}
