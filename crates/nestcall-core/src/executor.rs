//! Runs a single action against storage or a peer.

use std::sync::Arc;

use crate::dispatch::PeerDispatcher;
use crate::error::NestError;
use crate::storage::StorageGateway;
use crate::types::{Operation, Status};

/// Result of executing one action. The payload is updated in place.
#[derive(Debug)]
pub struct Outcome {
    pub status: Status,
    pub error: Option<NestError>,
}

impl Outcome {
    fn from_result(result: Result<(), NestError>) -> Self {
        match result {
            Ok(()) => Self {
                status: Status::Passed,
                error: None,
            },
            Err(e) => Self {
                status: Status::Failed,
                error: Some(e),
            },
        }
    }
}

#[derive(Clone)]
pub struct Executor {
    gateway: StorageGateway,
    dispatcher: Arc<dyn PeerDispatcher>,
}

impl Executor {
    pub fn new(gateway: StorageGateway, dispatcher: Arc<dyn PeerDispatcher>) -> Self {
        Self {
            gateway,
            dispatcher,
        }
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    /// Execute `operation`, writing read values and peer results into its
    /// payload. Failures leave the payload as it was.
    pub async fn execute(&self, operation: &mut Operation) -> Outcome {
        let result = match operation {
            Operation::Echo(_) => Ok(()),
            Operation::Read(p) => self
                .gateway
                .read(&p.service_name, &p.key)
                .await
                .map(|value| p.value = Some(value)),
            Operation::Write(p) => self
                .gateway
                .write(&p.service_name, &p.key, &p.value)
                .await
                .map(|written| p.value = written),
            Operation::Call(p) => self
                .dispatcher
                .call(&p.service_name, &p.actions)
                .await
                .map(|actions| p.actions = actions),
            Operation::Unknown { tag, .. } => Err(NestError::UnknownAction(tag.clone())),
        };
        Outcome::from_result(result)
    }
}
