//! External collaborator contracts
//!
//! The core drives real backends through these traits: a content-watching
//! driver, a posting backend, an engagement runner, and the workflow stores.
//! Each trait ships with a seeded simulated implementation so the pool runs
//! end-to-end without any real device control or network access, and tests
//! get reproducible data.

pub mod engagement;
pub mod posting;
pub mod store;
pub mod watching;

use std::sync::Arc;
use thiserror::Error;

// Re-export main types
pub use engagement::{EngagementService, EngagementSummary, SimulatedEngagementService};
pub use posting::{PostContent, PostReceipt, PostingService, SimulatedPostingService};
pub use store::{
    FileWorkflowStore, MemoryWorkflowStore, StoreError, WorkflowConfigStore, WorkflowReportStore,
};
pub use watching::{ContentWatchingService, SimulatedWatchService, WatchSessionStats};

/// Errors reported by collaborator services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Backend unreachable; the phase (and workflow) fails rather than
    /// silently retrying
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Unknown collaborator-side session id
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

/// Bundle of every collaborator the orchestrator needs
#[derive(Clone)]
pub struct Collaborators {
    pub watching: Arc<dyn ContentWatchingService>,
    pub posting: Arc<dyn PostingService>,
    pub engagement: Arc<dyn EngagementService>,
    pub reports: Arc<dyn WorkflowReportStore>,
    pub configs: Arc<dyn WorkflowConfigStore>,
}

impl Collaborators {
    /// Fully simulated collaborators with in-memory stores
    pub fn simulated(seed: u64) -> Self {
        let store = Arc::new(MemoryWorkflowStore::new());
        Self {
            watching: Arc::new(SimulatedWatchService::new(seed)),
            posting: Arc::new(SimulatedPostingService::new(seed)),
            engagement: Arc::new(SimulatedEngagementService::new(seed)),
            reports: store.clone(),
            configs: store,
        }
    }

    /// Simulated collaborators persisting workflows to a directory
    pub fn simulated_with_store(seed: u64, store: Arc<FileWorkflowStore>) -> Self {
        Self {
            watching: Arc::new(SimulatedWatchService::new(seed)),
            posting: Arc::new(SimulatedPostingService::new(seed)),
            engagement: Arc::new(SimulatedEngagementService::new(seed)),
            reports: store.clone(),
            configs: store,
        }
    }
}
