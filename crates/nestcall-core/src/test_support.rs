use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dispatch::PeerDispatcher;
use crate::error::{NestError, Result};
use crate::storage::{MemoryStore, StorageGateway};
use crate::types::Action;

/// Gateway with `mysql` and `mongodb` both backed by memory stores.
pub(crate) fn memory_gateway() -> StorageGateway {
    StorageGateway::new()
        .with_backend("mysql", Arc::new(MemoryStore::new()))
        .with_backend("mongodb", Arc::new(MemoryStore::new()))
}

/// Peer dispatcher with canned replies. Services without a reply fail.
#[derive(Default)]
pub(crate) struct FakePeer {
    replies: HashMap<String, Vec<Action>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakePeer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, service: &str, actions: Vec<Action>) -> Self {
        self.replies.insert(service.to_string(), actions);
        self
    }
}

#[async_trait]
impl PeerDispatcher for FakePeer {
    async fn call(&self, service: &str, _actions: &[Action]) -> Result<Vec<Action>> {
        self.calls.lock().unwrap().push(service.to_string());
        self.replies
            .get(service)
            .cloned()
            .ok_or_else(|| NestError::PeerCall {
                service: service.to_string(),
                reason: "connection refused".into(),
            })
    }
}
