//! Outbound calls to peer services.
//!
//! A `Call` action forwards its nested actions to a peer speaking the same
//! envelope protocol. The peer's annotated actions come back verbatim.
//! One attempt per call; retrying is the caller's business.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::config::{PeerDirectory, ServiceConfig};
use crate::error::{NestError, Result};
use crate::types::{format_timestamp, Action, Envelope};

#[async_trait]
pub trait PeerDispatcher: Send + Sync {
    /// Forward `actions` to `service` and return the peer's actions.
    async fn call(&self, service: &str, actions: &[Action]) -> Result<Vec<Action>>;
}

/// Peer reply; `actions` must be present for the call to count.
#[derive(Deserialize)]
struct PeerReply {
    actions: Vec<Action>,
}

pub struct HttpDispatcher {
    caller: String,
    directory: PeerDirectory,
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(
        caller: impl Into<String>,
        directory: PeerDirectory,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NestError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            caller: caller.into(),
            directory,
            client,
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Self::new(
            config.service_name.clone(),
            config.peer_directory(),
            Duration::from_secs(config.call_timeout_secs),
        )
    }

    fn outbound(&self, service: &str, actions: &[Action]) -> Envelope {
        let mut meta = Map::new();
        meta.insert("caller".into(), Value::String(self.caller.clone()));
        meta.insert("callee".into(), Value::String(service.to_string()));
        meta.insert(
            "callTime".into(),
            Value::String(format_timestamp(Utc::now())),
        );
        Envelope {
            meta,
            actions: actions.to_vec(),
        }
    }
}

#[async_trait]
impl PeerDispatcher for HttpDispatcher {
    async fn call(&self, service: &str, actions: &[Action]) -> Result<Vec<Action>> {
        let url = self.directory.resolve(service);
        let fail = |reason: String| {
            tracing::warn!(service, %url, %reason, "peer call failed");
            NestError::PeerCall {
                service: service.to_string(),
                reason,
            }
        };

        tracing::debug!(service, %url, actions = actions.len(), "calling peer");
        let response = self
            .client
            .post(&url)
            .json(&self.outbound(service, actions))
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("peer answered {status}")));
        }
        let reply: PeerReply = response
            .json()
            .await
            .map_err(|e| fail(format!("unreadable response: {e}")))?;
        Ok(reply.actions)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
