//! Embedded record store backed by redb.
//!
//! # Table design
//!
//! A single `sample` table maps the record key (UTF-8) to the JSON-encoded
//! [`Record`]. Keys are unique: inserting an existing key is a storage
//! error, matching the primary-key behaviour of the SQL backend.
//!
//! redb is synchronous, so every call hops onto `spawn_blocking`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};

use super::{storage_err, Record, Store};
use crate::error::{NestError, Result};

/// Key: record key. Value: JSON-encoded Record.
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("sample");

pub struct EmbeddedStore {
    db: Arc<Database>,
}

impl EmbeddedStore {
    /// Open or create the redb database at `path`.
    ///
    /// Creates the table if it doesn't already exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(storage_err)?;
        // Ensure the table exists before any reads
        let wt = db.begin_write().map_err(storage_err)?;
        wt.open_table(RECORDS).map_err(storage_err)?;
        wt.commit().map_err(storage_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn get_blocking(db: &Database, key: &str) -> Result<Option<Record>> {
        let rt = db.begin_read().map_err(storage_err)?;
        let table = rt.open_table(RECORDS).map_err(storage_err)?;
        let Some(entry) = table.get(key).map_err(storage_err)? else {
            return Ok(None);
        };
        let record: Record = serde_json::from_slice(entry.value()).map_err(storage_err)?;
        Ok(Some(record))
    }

    fn insert_blocking(db: &Database, record: &Record) -> Result<()> {
        let value = serde_json::to_vec(record).map_err(storage_err)?;
        let wt = db.begin_write().map_err(storage_err)?;
        {
            let mut table = wt.open_table(RECORDS).map_err(storage_err)?;
            let exists = table
                .get(record.key.as_str())
                .map_err(storage_err)?
                .is_some();
            if exists {
                return Err(NestError::Storage(format!(
                    "duplicate key '{}'",
                    record.key
                )));
            }
            table
                .insert(record.key.as_str(), value.as_slice())
                .map_err(storage_err)?;
        }
        wt.commit().map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl Store for EmbeddedStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::get_blocking(&db, &key))
            .await
            .map_err(|e| NestError::Storage(format!("task join error: {e}")))?
    }

    async fn insert(&self, key: &str, content: &str) -> Result<Record> {
        let db = self.db.clone();
        let record = Record::new(key, content);
        let stored = record.clone();
        tokio::task::spawn_blocking(move || Self::insert_blocking(&db, &stored))
            .await
            .map_err(|e| NestError::Storage(format!("task join error: {e}")))??;
        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
