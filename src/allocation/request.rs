//! Allocation request types
//!
//! An allocation request expresses demand for one device: target platform,
//! activity, priority, and optional constraints. Requests are immutable once
//! queued and live until granted, rejected, or expired.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{Activity, AllocationConstraints, Platform};
use crate::session::Session;

// ============================================================================
// Request Priority
// ============================================================================

/// Priority level for allocation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Default for RequestPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl RequestPriority {
    /// Parse from string
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

// ============================================================================
// Allocation Request
// ============================================================================

/// A request for one device from the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    /// Target social platform
    pub platform: Platform,

    /// Activity the device will perform
    pub activity: Activity,

    /// Expected session duration hint, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hint_secs: Option<u64>,

    /// Queue priority
    #[serde(default)]
    pub priority: RequestPriority,

    /// Optional device constraints
    #[serde(default)]
    pub constraints: AllocationConstraints,

    /// Maximum time this request may wait in the queue, in seconds
    ///
    /// `None` uses the scheduler's configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_timeout_secs: Option<u64>,
}

impl AllocationRequest {
    /// Create a request with default priority and no constraints
    pub fn new(platform: Platform, activity: Activity) -> Self {
        Self {
            platform,
            activity,
            duration_hint_secs: None,
            priority: RequestPriority::default(),
            constraints: AllocationConstraints::default(),
            queue_timeout_secs: None,
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the expected duration hint
    pub fn with_duration_secs(mut self, secs: u64) -> Self {
        self.duration_hint_secs = Some(secs);
        self
    }

    /// Set the device constraints
    pub fn with_constraints(mut self, constraints: AllocationConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Bound the queue wait
    pub fn with_queue_timeout_secs(mut self, secs: u64) -> Self {
        self.queue_timeout_secs = Some(secs);
        self
    }
}

// ============================================================================
// Grant
// ============================================================================

/// A granted allocation: the session now bound to a device
#[derive(Debug, Clone)]
pub struct Grant {
    /// The session opened for this request
    pub session: Session,

    /// Composite score of the chosen device at grant time
    pub score: f64,

    /// When the request was originally submitted
    pub submitted_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
