//! Error types for the workflow module

use thiserror::Error;

use super::model::{PhaseKind, WorkflowId, WorkflowStatus};
use crate::services::StoreError;

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Workflow-specific errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow not found
    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    /// Requested transition is not legal from the current status
    #[error("Workflow {id} is {status}, cannot {action}")]
    InvalidTransition {
        id: WorkflowId,
        status: WorkflowStatus,
        action: &'static str,
    },

    /// Workflow config rejected at creation
    #[error("Invalid workflow config: {0}")]
    InvalidConfig(String),

    /// A phase failed; the whole workflow fails with it
    #[error("Phase {index} ({kind}) failed: {reason}")]
    PhaseExecutionFailed {
        index: usize,
        kind: PhaseKind,
        reason: String,
    },

    /// A collaborator backend was unreachable
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),
}
