//! Document backend over the official MongoDB driver.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection};

use super::{storage_err, Record, Store, SAMPLE};
use crate::error::Result;

/// Documents are `{uuid, content, created_at, updated_at}` in `sample`.
///
/// There is no unique index on `uuid`; reads return the first match.
pub struct MongoStore {
    sample: Collection<Document>,
}

impl MongoStore {
    pub async fn connect(url: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(url).await.map_err(storage_err)?;
        Ok(Self::new(&client, database))
    }

    pub fn new(client: &Client, database: &str) -> Self {
        Self {
            sample: client.database(database).collection(SAMPLE),
        }
    }
}

fn to_bson_time(ts: DateTime<Utc>) -> mongodb::bson::DateTime {
    mongodb::bson::DateTime::from_millis(ts.timestamp_millis())
}

fn from_bson_time(doc: &Document, field: &str) -> DateTime<Utc> {
    doc.get_datetime(field)
        .ok()
        .and_then(|t| DateTime::from_timestamp_millis(t.timestamp_millis()))
        .unwrap_or_default()
}

fn record_to_document(record: &Record) -> Document {
    doc! {
        "uuid": record.key.as_str(),
        "content": record.content.as_str(),
        "created_at": to_bson_time(record.created_at),
        "updated_at": to_bson_time(record.updated_at),
    }
}

fn record_from_document(key: &str, doc: &Document) -> Record {
    Record {
        key: doc.get_str("uuid").unwrap_or(key).to_string(),
        content: doc.get_str("content").unwrap_or_default().to_string(),
        created_at: from_bson_time(doc, "created_at"),
        updated_at: from_bson_time(doc, "updated_at"),
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        let found = self
            .sample
            .find_one(doc! { "uuid": key })
            .await
            .map_err(storage_err)?;
        Ok(found.map(|d| record_from_document(key, &d)))
    }

    async fn insert(&self, key: &str, content: &str) -> Result<Record> {
        let record = Record::new(key, content);
        self.sample
            .insert_one(record_to_document(&record))
            .await
            .map_err(storage_err)?;
        Ok(record)
    }
}
