use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Record, Store};
use crate::error::Result;

/// In-process store for local runs and tests.
///
/// Keeps every inserted record; reads return the earliest one for a key.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let records = self.records.read().await;
        Ok(records.get(key).and_then(|r| r.first()).cloned())
    }

    async fn insert(&self, key: &str, content: &str) -> Result<Record> {
        let record = Record::new(key, content);
        self.records
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_never_overwrites() {
        let store = MemoryStore::new();
        store.insert("k", "first").await.unwrap();
        store.insert("k", "second").await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("k").await.unwrap().unwrap().content, "first");
    }

    #[tokio::test]
    async fn empty_store_returns_none() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_stamps_timestamps() {
        let store = MemoryStore::new();
        let record = store.insert("k", "v").await.unwrap();
        assert_eq!(record.created_at, record.updated_at);
        assert_eq!(record.key, "k");
    }
}
