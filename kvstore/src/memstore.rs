//! In-memory `KvStore` behind a reader-writer lock.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::store::{Data, KvStore, StagedStore, StoreError, TxFn};

/// In-memory store. Cheap to construct, safe to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemStore {
    entries: RwLock<BTreeMap<String, Data>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with initial entries.
    pub fn with_entries(entries: BTreeMap<String, Data>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

struct MemTx {
    staged: BTreeMap<String, Data>,
}

impl StagedStore for MemTx {
    fn get(&self, key: &str) -> Option<Data> {
        self.staged.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Data) {
        self.staged.insert(key.to_string(), value);
    }

    fn delete(&mut self, key: &str) {
        self.staged.remove(key);
    }

    fn has(&self, key: &str) -> bool {
        self.staged.contains_key(key)
    }
}

#[async_trait]
impl KvStore for MemStore {
    async fn get(&self, key: &str) -> Result<Option<Data>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Data) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn set_many(&self, entries: BTreeMap<String, Data>) -> Result<(), StoreError> {
        let mut guard = self.entries.write();
        guard.extend(entries);
        Ok(())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, Data>, StoreError> {
        Ok(self.entries.read().clone())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.entries.write().clear();
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn transaction(&self, f: TxFn) -> Result<(), StoreError> {
        // Hold the write lock for the whole body so the staged view is
        // isolated from concurrent writers.
        let mut guard = self.entries.write();
        let mut tx = MemTx {
            staged: guard.clone(),
        };
        f(&mut tx)?;
        *guard = tx.staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_has_delete() {
        let store = MemStore::new();
        store.set("a", json!(1)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
        assert!(store.has("a").await.unwrap());
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.delete("a").await.unwrap();
        assert!(!store.has("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_many_and_get_all() {
        let store = MemStore::new();
        store.set("keep", json!("old")).await.unwrap();

        let mut batch = BTreeMap::new();
        batch.insert("a".to_string(), json!(1));
        batch.insert("b".to_string(), json!(2));
        store.set_many(batch).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all["a"], json!(1));
        assert_eq!(all["b"], json!(2));
        assert_eq!(all["keep"], json!("old"));

        store.delete_all().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_transaction_commits_on_ok() {
        let store = MemStore::new();
        store
            .transaction(Box::new(|tx| {
                tx.set("a", json!(1));
                tx.set("b", json!(2));
                Ok(())
            }))
            .await
            .unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get("b").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_transaction_discards_on_err() {
        let store = MemStore::new();
        store.set("a", json!("before")).await.unwrap();

        let result = store
            .transaction(Box::new(|tx| {
                tx.set("a", json!("after"));
                tx.set("b", json!(2));
                Err(StoreError::Backend("boom".to_string()))
            }))
            .await;

        assert!(result.is_err());
        assert_eq!(store.get("a").await.unwrap(), Some(json!("before")));
        assert!(!store.has("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_transaction_sees_staged_state() {
        let store = MemStore::new();
        store.set("a", json!(1)).await.unwrap();

        store
            .transaction(Box::new(|tx| {
                assert_eq!(tx.get("a"), Some(json!(1)));
                tx.delete("a");
                assert!(!tx.has("a"));
                Ok(())
            }))
            .await
            .unwrap();

        assert!(!store.has("a").await.unwrap());
    }
}
