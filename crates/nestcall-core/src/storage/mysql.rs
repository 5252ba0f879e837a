//! Relational backend over a sqlx MySQL pool.
//!
//! Records live in the `sample` table keyed by `uuid`; a second insert for
//! the same key violates the primary key and surfaces as a storage error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;

use super::{storage_err, Record, Store, SAMPLE};
use crate::error::Result;

pub struct MysqlStore {
    pool: MySqlPool,
}

impl MysqlStore {
    /// Connect a pool and make sure the `sample` table exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(storage_err)?;
        let store = Self::from_pool(pool);
        store.init().await?;
        Ok(store)
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn init(&self) -> Result<()> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {SAMPLE} (
                uuid VARCHAR(36) NOT NULL PRIMARY KEY,
                content TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            )"
        );
        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

fn record_from_row(row: &MySqlRow) -> std::result::Result<Record, sqlx::Error> {
    let content: Option<String> = row.try_get("content")?;
    let created_at: Option<DateTime<Utc>> = row.try_get("created_at")?;
    let updated_at: Option<DateTime<Utc>> = row.try_get("updated_at")?;
    Ok(Record {
        key: row.try_get("uuid")?,
        content: content.unwrap_or_default(),
        created_at: created_at.unwrap_or_default(),
        updated_at: updated_at.unwrap_or_default(),
    })
}

#[async_trait]
impl Store for MysqlStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let select =
            format!("SELECT uuid, content, created_at, updated_at FROM {SAMPLE} WHERE uuid = ?");
        let row = sqlx::query(&select)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.as_ref()
            .map(record_from_row)
            .transpose()
            .map_err(storage_err)
    }

    async fn insert(&self, key: &str, content: &str) -> Result<Record> {
        let record = Record::new(key, content);
        let insert =
            format!("INSERT INTO {SAMPLE} (uuid, content, created_at, updated_at) VALUES (?, ?, ?, ?)");
        sqlx::query(&insert)
            .bind(&record.key)
            .bind(&record.content)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(record)
    }
}
