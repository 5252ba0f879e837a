//! Envelope orchestration.
//!
//! Actions run strictly in order. Each one is stamped with this service's
//! name, its status and a completion time; failures are collected into an
//! error list that is logged but never returned to the caller. A failing
//! action never stops the ones after it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::executor::Executor;
use crate::types::{format_timestamp, Envelope, RETURN_TIME};

/// An envelope after processing, with the diagnostics gathered on the way.
#[derive(Debug)]
pub struct Processed {
    pub envelope: Envelope,
    /// One entry per failed action, in execution order.
    pub errors: Vec<String>,
    pub received_at: DateTime<Utc>,
}

/// Hands out completion times that never go backwards within one envelope.
struct Clock {
    last: DateTime<Utc>,
}

impl Clock {
    fn start() -> Self {
        Self { last: Utc::now() }
    }

    fn tick(&mut self) -> DateTime<Utc> {
        self.last = self.last.max(Utc::now());
        self.last
    }
}

pub struct Orchestrator {
    service_name: String,
    executor: Executor,
}

impl Orchestrator {
    pub fn new(service_name: impl Into<String>, executor: Executor) -> Self {
        Self {
            service_name: service_name.into(),
            executor,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub async fn process(&self, envelope: Envelope) -> Processed {
        let span = tracing::info_span!(
            "envelope",
            request_id = %Uuid::new_v4(),
            service = %self.service_name
        );
        self.run(envelope).instrument(span).await
    }

    async fn run(&self, mut envelope: Envelope) -> Processed {
        let mut clock = Clock::start();
        let received_at = clock.last;
        tracing::info!(inbound = %to_json(&envelope), "envelope received");

        let mut errors = Vec::new();
        for action in envelope.actions.iter_mut() {
            let outcome = self.executor.execute(&mut action.operation).await;
            if let Some(err) = &outcome.error {
                tracing::debug!(action = action.operation.tag(), error = %err, "action failed");
                errors.push(err.diagnostic());
            }
            action.stamp(outcome.status, &self.service_name, clock.tick());
        }

        envelope.meta.insert(
            RETURN_TIME.to_string(),
            Value::String(format_timestamp(clock.tick())),
        );

        tracing::info!(outbound = %to_json(&envelope), "envelope processed");
        if !errors.is_empty() {
            tracing::warn!(errors = ?errors, "envelope finished with failed actions");
        }

        Processed {
            envelope,
            errors,
            received_at,
        }
    }
}

fn to_json(envelope: &Envelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
