//! Multi-device workflow orchestration
//!
//! This module defines and executes multi-phase automation workflows
//! (watch, post, engage, wait, analyze) over a subset of the device pool,
//! coordinated by a named strategy.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Workflow Orchestrator                      │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────┐  │
//! │  │  Strategy   │  │   Per-run    │  │   Control channel   │  │
//! │  │  Registry   │  │  phase task  │  │  (run/pause/stop)   │  │
//! │  └──────┬──────┘  └──────┬───────┘  └──────────┬──────────┘  │
//! │         │                │                      │             │
//! │         └────────────────┼──────────────────────┘             │
//! │                          │                                    │
//! │        allocation requests / session releases                 │
//! └──────────────────────────┼────────────────────────────────────┘
//!                            ▼
//!              AllocationScheduler → SessionManager → DeviceRegistry
//! ```
//!
//! Workflow state machine: `scheduled → running → {completed|failed}`, with
//! `running ⇄ paused` as a manual side-transition and `completed →
//! scheduled` for repeat-daily workflows once a day has elapsed.
//!
//! # Modules
//!
//! - [`model`] - Workflow, phase, schedule and report data structures
//! - [`strategy`] - Named coordination strategies (device order, pacing)
//! - [`orchestrator`] - The phase driver and workflow lifecycle operations
//! - [`error`] - Workflow error types

pub mod error;
pub mod model;
pub mod orchestrator;
pub mod strategy;

// Re-export main types
pub use error::{WorkflowError, WorkflowResult};
pub use model::{
    PhaseKind, ScheduleWindow, Workflow, WorkflowConfig, WorkflowId, WorkflowPhase,
    WorkflowReport, WorkflowStats, WorkflowStatus,
};
pub use orchestrator::{
    OrchestratorConfig, PostOutcome, PostingRunConfig, WatchRunConfig, WatchRunLaunch,
    WorkflowEvent, WorkflowOrchestrator, WorkflowSignal,
};
pub use strategy::{
    AllocationMode, ContentStrategy, CoordinationStrategy, EngagementLevel, StrategyRegistry,
    TimingMode,
};
