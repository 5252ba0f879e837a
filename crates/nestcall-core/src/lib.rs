//! `nestcall-core`: the nested-call protocol and its orchestrator.
//!
//! ```text
//! Envelope ──▶ Orchestrator ──▶ Executor ──┬──▶ StorageGateway ──▶ Store (memory | redb | mysql | mongodb)
//!                                          └──▶ PeerDispatcher ──▶ peer service (same protocol)
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod storage;
pub mod types;

#[cfg(test)]
mod test_support;

pub use error::{NestError, Result};
pub use executor::{Executor, Outcome};
pub use orchestrator::{Orchestrator, Processed};
pub use types::{Action, Envelope, Operation, Status};
