use std::sync::Arc;

use nestcall_core::config::{Limits, ServiceConfig};
use nestcall_core::dispatch::HttpDispatcher;
use nestcall_core::storage::StorageGateway;
use nestcall_core::{Executor, Orchestrator};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub limits: Limits,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, limits: Limits) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            limits,
        }
    }

    /// Connect storage backends and build the peer client described by
    /// `config`.
    pub async fn from_config(config: &ServiceConfig) -> nestcall_core::Result<Self> {
        let gateway = StorageGateway::connect(&config.backends).await?;
        let dispatcher = HttpDispatcher::from_config(config)?;
        let executor = Executor::new(gateway, Arc::new(dispatcher));
        Ok(Self::new(
            Orchestrator::new(config.service_name.clone(), executor),
            config.limits.clone(),
        ))
    }
}
