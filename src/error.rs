//! Unified error handling for the droidpool crate
//!
//! This module consolidates the domain-specific errors into a single
//! [`Error`] enum while keeping the per-module types usable on their own.
//!
//! # Architecture
//!
//! - [`PoolErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors

use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::allocation::AllocationError;
pub use crate::health::ProbeError;
pub use crate::registry::RegistryError;
pub use crate::services::StoreError;
pub use crate::workflow::WorkflowError;

/// Result type using the unified error
pub type Result<T> = std::result::Result<T, Error>;

/// Common trait for pool error types
pub trait PoolErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the pool keeps operating)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Device registry and capacity errors
    Resource,
    /// Allocation and queueing errors
    Scheduling,
    /// Workflow lifecycle and phase errors
    Workflow,
    /// Persistence errors
    Storage,
    /// Health probing errors
    Health,
}

/// Unified error enum wrapping all domain-specific errors
#[derive(Debug, Error)]
pub enum Error {
    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Allocation error
    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    /// Workflow error
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Probe error
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),
}

impl PoolErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            // Probe failures exclude one device, the pool continues
            Self::Probe(_) => true,
            // A busy pool clears as sessions release
            Self::Allocation(e) => e.is_retryable(),
            Self::Registry(_) => false,
            Self::Workflow(_) => false,
            Self::Store(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Registry(_) => ErrorCategory::Resource,
            Self::Allocation(_) => ErrorCategory::Scheduling,
            Self::Workflow(_) => ErrorCategory::Workflow,
            Self::Store(_) => ErrorCategory::Storage,
            Self::Probe(_) => ErrorCategory::Health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Activity, DeviceId, Platform};

    #[test]
    fn test_category_mapping() {
        let err: Error = RegistryError::DeviceNotFound(DeviceId::new("x")).into();
        assert_eq!(err.category(), ErrorCategory::Resource);
        assert!(!err.is_recoverable());

        let err: Error = ProbeError::Timeout(DeviceId::new("x")).into();
        assert_eq!(err.category(), ErrorCategory::Health);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_allocation_recoverability() {
        let retryable: Error = AllocationError::NoDeviceAvailable {
            estimated_wait_mins: Some(5),
        }
        .into();
        assert!(retryable.is_recoverable());

        let fatal: Error =
            AllocationError::invalid_request(Platform::Tiktok, Activity::Post).into();
        assert!(!fatal.is_recoverable());
    }
}
