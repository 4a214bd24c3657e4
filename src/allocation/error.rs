//! Error types for the allocation module

use std::fmt;

use crate::registry::{Activity, Platform};

/// Result type for allocation operations
pub type AllocationResult<T> = Result<T, AllocationError>;

/// Allocation-specific errors
#[derive(Debug, Clone)]
pub enum AllocationError {
    /// No device in the pool supports the requested platform/activity pair
    InvalidRequest {
        platform: Platform,
        activity: Activity,
    },

    /// No qualifying device became available within the wait bound
    NoDeviceAvailable {
        /// Estimated minutes until a qualifying device frees up, if one
        /// is expected to at all
        estimated_wait_mins: Option<u64>,
    },

    /// The scheduler dropped the request while shutting down
    SchedulerClosed,
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { platform, activity } => {
                write!(
                    f,
                    "No device in the pool supports {}/{}",
                    platform, activity
                )
            }
            Self::NoDeviceAvailable { estimated_wait_mins } => match estimated_wait_mins {
                Some(mins) => write!(
                    f,
                    "No device available (estimated wait: {} minutes)",
                    mins
                ),
                None => write!(f, "No device available and none expected to free up"),
            },
            Self::SchedulerClosed => write!(f, "Allocation scheduler closed"),
        }
    }
}

impl std::error::Error for AllocationError {}

impl AllocationError {
    /// Create an invalid request error
    pub fn invalid_request(platform: Platform, activity: Activity) -> Self {
        Self::InvalidRequest { platform, activity }
    }

    /// Check whether waiting longer could have helped
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoDeviceAvailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_display() {
        let err = AllocationError::invalid_request(Platform::Tiktok, Activity::Engage);
        assert!(err.to_string().contains("tiktok"));
        assert!(err.to_string().contains("engage"));
    }

    #[test]
    fn test_no_device_display() {
        let err = AllocationError::NoDeviceAvailable {
            estimated_wait_mins: Some(12),
        };
        assert!(err.to_string().contains("12"));
        assert!(err.is_retryable());

        let err = AllocationError::NoDeviceAvailable {
            estimated_wait_mins: None,
        };
        assert!(err.to_string().contains("none expected"));
    }
}
