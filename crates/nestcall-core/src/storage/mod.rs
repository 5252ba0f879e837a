//! Storage gateway: one read/write contract over several named backends.
//!
//! Every backend stores plain `(key, content)` records with creation and
//! update timestamps. The gateway owns a `name → Store` map built from
//! configuration; names it does not know yield
//! [`NestError::UnsupportedBackend`].

pub mod embedded;
pub mod memory;
pub mod mongo;
pub mod mysql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::{NestError, Result};

pub use embedded::EmbeddedStore;
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use mysql::MysqlStore;

/// Value returned by a read when no record exists for the key.
pub const NOT_FOUND: &str = "Not Found";

/// Table/collection holding records in the SQL and document backends.
pub(crate) const SAMPLE: &str = "sample";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single storage engine.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up the record stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Record>>;

    /// Create a new record. Never overwrites or merges.
    async fn insert(&self, key: &str, content: &str) -> Result<Record>;
}

pub(crate) fn storage_err(e: impl std::fmt::Display) -> NestError {
    NestError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// StorageGateway
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct StorageGateway {
    backends: HashMap<String, Arc<dyn Store>>,
}

impl StorageGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        self.backends.insert(name.into(), store);
        self
    }

    /// Connect every configured backend, failing on the first that cannot
    /// be opened.
    pub async fn connect(backends: &BTreeMap<String, BackendConfig>) -> Result<Self> {
        let mut gateway = Self::new();
        for (name, config) in backends {
            let store = connect(config).await?;
            tracing::info!(backend = %name, kind = config.kind(), "storage backend ready");
            gateway.backends.insert(name.clone(), store);
        }
        Ok(gateway)
    }

    pub fn backend_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn store(&self, backend: &str) -> Result<&Arc<dyn Store>> {
        self.backends
            .get(backend)
            .ok_or_else(|| NestError::UnsupportedBackend(backend.to_string()))
    }

    /// Read `key`, returning [`NOT_FOUND`] when there is no record.
    pub async fn read(&self, backend: &str, key: &str) -> Result<String> {
        let store = self.store(backend)?;
        Ok(match store.get(key).await? {
            Some(record) => record.content,
            None => NOT_FOUND.to_string(),
        })
    }

    /// Persist a new record and return the value written.
    pub async fn write(&self, backend: &str, key: &str, value: &str) -> Result<String> {
        let store = self.store(backend)?;
        let record = store.insert(key, value).await?;
        Ok(record.content)
    }
}

/// Open the store described by `config`.
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config {
        BackendConfig::Memory => Arc::new(MemoryStore::new()),
        BackendConfig::Redb { path } => Arc::new(EmbeddedStore::open(path)?),
        BackendConfig::Mysql {
            url,
            max_connections,
        } => Arc::new(MysqlStore::connect(url, *max_connections).await?),
        BackendConfig::Mongodb { url, database } => {
            Arc::new(MongoStore::connect(url, database).await?)
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> StorageGateway {
        StorageGateway::new()
            .with_backend("mysql", Arc::new(MemoryStore::new()))
            .with_backend("mongodb", Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn read_after_write_returns_value() {
        let gw = gateway();
        assert_eq!(gw.write("mysql", "u1", "hello").await.unwrap(), "hello");
        assert_eq!(gw.read("mysql", "u1").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn missing_key_reads_as_not_found() {
        let gw = gateway();
        assert_eq!(gw.read("mongodb", "nobody").await.unwrap(), NOT_FOUND);
    }

    #[tokio::test]
    async fn backends_are_isolated() {
        let gw = gateway();
        gw.write("mysql", "k", "v").await.unwrap();
        assert_eq!(gw.read("mongodb", "k").await.unwrap(), NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_backend_is_not_supported() {
        let gw = gateway();
        let err = gw.read("redis", "k").await.unwrap_err();
        assert_eq!(err.to_string(), "redis not supported");
        let err = gw.write("redis", "k", "v").await.unwrap_err();
        assert_eq!(err.to_string(), "redis not supported");
    }

    #[tokio::test]
    async fn connect_builds_memory_backends_from_config() {
        let gw = StorageGateway::connect(&crate::config::ServiceConfig::default().backends)
            .await
            .unwrap();
        assert_eq!(gw.backend_names(), ["mongodb", "mysql"]);
    }
}
