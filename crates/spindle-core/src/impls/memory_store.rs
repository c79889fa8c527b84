//! InMemoryStore - 開発用・テスト用の StateStore
//!
//! HashMap<String, Value> を Mutex で保護するだけの実装です。
//! ロック区間で await しないので std の Mutex で十分です。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::ports::StateStore;

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    documents: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw document (including malformed ones, for tests).
    pub fn insert_raw(&self, key: &str, document: serde_json::Value) {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        documents.insert(key.to_string(), document);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        documents.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        documents.keys().cloned().collect()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(documents.get(key).cloned())
    }

    async fn write(&self, key: &str, document: &serde_json::Value) -> Result<(), StoreError> {
        self.insert_raw(key, document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_missing_key_is_none() {
        let store = InMemoryStore::new();
        assert!(store.read("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_then_read() {
        let store = InMemoryStore::new();
        store
            .write("q.json", &serde_json::json!({"queues": {}}))
            .await
            .unwrap();

        let doc = store.read("q.json").await.unwrap().unwrap();
        assert_eq!(doc, serde_json::json!({"queues": {}}));
        assert_eq!(store.keys(), vec!["q.json".to_string()]);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = InMemoryStore::new();
        store.write("a", &serde_json::json!(1)).await.unwrap();
        store.write("b", &serde_json::json!(2)).await.unwrap();

        assert_eq!(store.read("a").await.unwrap(), Some(serde_json::json!(1)));
        assert_eq!(store.read("b").await.unwrap(), Some(serde_json::json!(2)));
    }
}
