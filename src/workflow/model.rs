//! Workflow data structures
//!
//! A workflow is an ordered sequence of automation phases executed across a
//! device subset under a named coordination strategy, with a schedule window
//! and aggregate statistics rolled up from its sessions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::registry::{DeviceId, Platform};

// ============================================================================
// Workflow Identity
// ============================================================================

/// Unique workflow identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    /// Generate a fresh workflow id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for WorkflowId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Phases
// ============================================================================

/// Type of a workflow phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    /// Watch content feeds on allocated devices
    Watch,
    /// Publish content through assigned accounts
    Post,
    /// Run engagement actions for the phase duration
    Engage,
    /// Sleep with no side effects
    Wait,
    /// Produce and persist a report snapshot
    Analyze,
}

impl PhaseKind {
    /// Get phase kind ID as string
    pub fn id(&self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Post => "post",
            Self::Engage => "engage",
            Self::Wait => "wait",
            Self::Analyze => "analyze",
        }
    }

    /// Parse from string
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "watch" => Some(Self::Watch),
            "post" => Some(Self::Post),
            "engage" => Some(Self::Engage),
            "wait" => Some(Self::Wait),
            "analyze" => Some(Self::Analyze),
            _ => None,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// One phase in a workflow's ordered phase list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPhase {
    /// Phase type
    pub kind: PhaseKind,

    /// Phase duration in seconds
    pub duration_secs: u64,

    /// Issue per-device work concurrently within the phase
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Free-form phase parameters (caption, tags, media url, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, serde_json::Value>,
}

fn default_parallel() -> bool {
    true
}

impl WorkflowPhase {
    /// Create a phase with no parameters
    pub fn new(kind: PhaseKind, duration_secs: u64) -> Self {
        Self {
            kind,
            duration_secs,
            parallel: true,
            params: HashMap::new(),
        }
    }

    /// Set the parallel flag
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Add a string parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Look up a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }
}

// ============================================================================
// Schedule Window
// ============================================================================

/// Time window a workflow is scheduled within
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// First run time
    pub start: DateTime<Utc>,

    /// Optional end of the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,

    /// Re-run daily at the original start offset
    #[serde(default)]
    pub repeat_daily: bool,
}

impl ScheduleWindow {
    /// A window starting now, single run
    pub fn immediate() -> Self {
        Self {
            start: Utc::now(),
            end: None,
            repeat_daily: false,
        }
    }

    /// Next daily occurrence of the start offset strictly after `now`
    pub fn next_occurrence_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if self.start > now {
            return self.start;
        }
        let days = (now - self.start).num_days() + 1;
        self.start + Duration::days(days)
    }
}

// ============================================================================
// Workflow Status
// ============================================================================

/// Lifecycle status of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Waiting for its start time
    Scheduled,
    /// Phases executing
    Running,
    /// Manually halted between phases
    Paused,
    /// All phases finished
    Completed,
    /// A phase failed; partial statistics retained
    Failed,
}

impl WorkflowStatus {
    /// Get status ID as string
    pub fn id(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if the workflow is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

// ============================================================================
// Workflow Statistics
// ============================================================================

/// Aggregate statistics for a workflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStats {
    /// Completed runs
    pub runs: u64,

    /// Runs that finished without a phase failure
    pub successes: u64,

    /// Cumulative watch time in seconds
    pub total_watch_secs: u64,

    /// Cumulative posts published
    pub total_posts: u64,

    /// Cumulative engagement actions
    pub total_engagements: u64,

    /// When the last run finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,

    /// When the next run is due (repeat-daily workflows)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
}

impl WorkflowStats {
    /// Fold per-phase counters into the totals
    pub fn fold(&mut self, watch_secs: u64, posts: u64, engagements: u64) {
        self.total_watch_secs += watch_secs;
        self.total_posts += posts;
        self.total_engagements += engagements;
    }
}

// ============================================================================
// Workflow
// ============================================================================

/// Creation input for a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Human-readable workflow name
    pub name: String,

    /// Devices the workflow may use
    pub device_ids: Vec<DeviceId>,

    /// Target platforms
    pub platforms: Vec<Platform>,

    /// Schedule window
    pub schedule: ScheduleWindow,

    /// Ordered phase list
    pub phases: Vec<WorkflowPhase>,

    /// Coordination strategy name
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_strategy() -> String {
    "balanced".to_string()
}

/// A workflow and its full state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow identifier
    pub id: WorkflowId,

    /// Human-readable name
    pub name: String,

    /// Devices assigned to this workflow
    pub device_ids: Vec<DeviceId>,

    /// Target platforms
    pub platforms: Vec<Platform>,

    /// Schedule window
    pub schedule: ScheduleWindow,

    /// Ordered phase list
    pub phases: Vec<WorkflowPhase>,

    /// Coordination strategy name
    pub strategy: String,

    /// Lifecycle status
    pub status: WorkflowStatus,

    /// Aggregate statistics
    #[serde(default)]
    pub stats: WorkflowStats,

    /// Failure message, when status is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the workflow was created
    pub created_at: DateTime<Utc>,

    /// When the workflow record last changed
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a workflow from its config
    pub fn from_config(config: WorkflowConfig) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::generate(),
            name: config.name,
            device_ids: config.device_ids,
            platforms: config.platforms,
            schedule: config.schedule,
            phases: config.phases,
            strategy: config.strategy,
            status: WorkflowStatus::Scheduled,
            stats: WorkflowStats::default(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Flip a completed repeat-daily workflow back to scheduled once a full
    /// day has elapsed since its last run
    ///
    /// Returns `true` if the transition happened; `next_run` is recomputed
    /// from the original start offset.
    pub fn maybe_reschedule(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != WorkflowStatus::Completed || !self.schedule.repeat_daily {
            return false;
        }
        let last_run = match self.stats.last_run {
            Some(last) => last,
            None => return false,
        };
        if now - last_run < Duration::days(1) {
            return false;
        }
        if let Some(end) = self.schedule.end {
            if now > end {
                return false;
            }
        }

        self.status = WorkflowStatus::Scheduled;
        self.stats.next_run = Some(self.schedule.next_occurrence_after(now));
        self.updated_at = now;
        true
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// Workflow Report
// ============================================================================

/// Snapshot produced by an analyze phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    /// Workflow the report describes
    pub workflow_id: WorkflowId,

    /// Workflow name
    pub name: String,

    /// When the report was generated
    pub generated_at: DateTime<Utc>,

    /// Seconds since the workflow was created
    pub elapsed_secs: i64,

    /// Statistics at report time
    pub stats: WorkflowStats,

    /// Number of devices assigned
    pub device_count: usize,

    /// Number of target platforms
    pub platform_count: usize,

    /// Phase counts by kind
    pub phase_counts: HashMap<String, usize>,
}

impl WorkflowReport {
    /// Build a report from a workflow snapshot
    pub fn from_workflow(workflow: &Workflow, now: DateTime<Utc>) -> Self {
        let mut phase_counts: HashMap<String, usize> = HashMap::new();
        for phase in &workflow.phases {
            *phase_counts.entry(phase.kind.id().to_string()).or_insert(0) += 1;
        }

        Self {
            workflow_id: workflow.id,
            name: workflow.name.clone(),
            generated_at: now,
            elapsed_secs: (now - workflow.created_at).num_seconds(),
            stats: workflow.stats.clone(),
            device_count: workflow.device_ids.len(),
            platform_count: workflow.platforms.len(),
            phase_counts,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> WorkflowConfig {
        WorkflowConfig {
            name: "evening watch".to_string(),
            device_ids: vec![DeviceId::new("d1"), DeviceId::new("d2")],
            platforms: vec![Platform::Tiktok],
            schedule: ScheduleWindow::immediate(),
            phases: vec![
                WorkflowPhase::new(PhaseKind::Watch, 600),
                WorkflowPhase::new(PhaseKind::Analyze, 0),
            ],
            strategy: "balanced".to_string(),
        }
    }

    #[test]
    fn test_phase_kind_from_id() {
        assert_eq!(PhaseKind::from_id("watch"), Some(PhaseKind::Watch));
        assert_eq!(PhaseKind::from_id("ANALYZE"), Some(PhaseKind::Analyze));
        assert_eq!(PhaseKind::from_id("dance"), None);
    }

    #[test]
    fn test_workflow_from_config() {
        let workflow = Workflow::from_config(sample_config());
        assert_eq!(workflow.status, WorkflowStatus::Scheduled);
        assert_eq!(workflow.phases.len(), 2);
        assert_eq!(workflow.stats.runs, 0);
    }

    #[test]
    fn test_phase_params() {
        let phase = WorkflowPhase::new(PhaseKind::Post, 300)
            .with_param("caption", "new drop 🔥")
            .with_parallel(false);

        assert_eq!(phase.param_str("caption"), Some("new drop 🔥"));
        assert_eq!(phase.param_str("missing"), None);
        assert!(!phase.parallel);
    }

    #[test]
    fn test_next_occurrence_after() {
        let start = Utc::now() - Duration::days(3) - Duration::hours(2);
        let window = ScheduleWindow {
            start,
            end: None,
            repeat_daily: true,
        };

        let now = Utc::now();
        let next = window.next_occurrence_after(now);
        assert!(next > now);
        // Same time-of-day offset as the original start
        assert_eq!(
            (next - start).num_seconds() % 86_400,
            0,
            "next run must preserve the start offset"
        );
    }

    #[test]
    fn test_maybe_reschedule_after_a_day() {
        let mut workflow = Workflow::from_config(WorkflowConfig {
            schedule: ScheduleWindow {
                start: Utc::now() - Duration::days(2),
                end: None,
                repeat_daily: true,
            },
            ..sample_config()
        });
        workflow.status = WorkflowStatus::Completed;
        workflow.stats.last_run = Some(Utc::now() - Duration::days(1) - Duration::hours(1));

        let now = Utc::now();
        assert!(workflow.maybe_reschedule(now));
        assert_eq!(workflow.status, WorkflowStatus::Scheduled);
        let next = workflow.stats.next_run.unwrap();
        assert!(next > now);
    }

    #[test]
    fn test_maybe_reschedule_too_soon() {
        let mut workflow = Workflow::from_config(WorkflowConfig {
            schedule: ScheduleWindow {
                start: Utc::now() - Duration::days(2),
                end: None,
                repeat_daily: true,
            },
            ..sample_config()
        });
        workflow.status = WorkflowStatus::Completed;
        workflow.stats.last_run = Some(Utc::now() - Duration::hours(5));

        assert!(!workflow.maybe_reschedule(Utc::now()));
        assert_eq!(workflow.status, WorkflowStatus::Completed);
    }

    #[test]
    fn test_maybe_reschedule_requires_repeat_flag() {
        let mut workflow = Workflow::from_config(sample_config());
        workflow.status = WorkflowStatus::Completed;
        workflow.stats.last_run = Some(Utc::now() - Duration::days(3));

        assert!(!workflow.maybe_reschedule(Utc::now()));
    }

    #[test]
    fn test_workflow_json_round_trip() {
        let mut workflow = Workflow::from_config(sample_config());
        workflow.stats.fold(1200, 4, 17);
        workflow.status = WorkflowStatus::Completed;

        let json = workflow.to_json().unwrap();
        let restored = Workflow::from_json(&json).unwrap();

        assert_eq!(restored.id, workflow.id);
        assert_eq!(restored.status, WorkflowStatus::Completed);
        assert_eq!(restored.stats.total_watch_secs, 1200);
        assert_eq!(restored.stats.total_posts, 4);
        assert_eq!(restored.device_ids, workflow.device_ids);
    }

    #[test]
    fn test_report_from_workflow() {
        let workflow = Workflow::from_config(sample_config());
        let report = WorkflowReport::from_workflow(&workflow, Utc::now());

        assert_eq!(report.workflow_id, workflow.id);
        assert_eq!(report.device_count, 2);
        assert_eq!(report.platform_count, 1);
        assert_eq!(report.phase_counts.get("watch"), Some(&1));
        assert_eq!(report.phase_counts.get("analyze"), Some(&1));
    }
}
