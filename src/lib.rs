//! droidpool - Device Pool Scheduler and Workflow Orchestrator
//!
//! A scheduling core for fleets of (simulated) mobile devices running social
//! automation: a health-constrained device pool, a priority allocation queue
//! with deterministic multi-factor scoring, and a multi-phase workflow
//! orchestrator (watch, post, engage, wait, analyze).
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`registry`] - Canonical device state with per-device mutation locks
//! - [`health`] - Background health monitoring and probe contracts
//! - [`allocation`] - Priority queue, device scoring, and wait estimation
//! - [`session`] - Allocation lifetime tracking and statistics rollup
//! - [`workflow`] - Multi-phase workflow orchestration and strategies
//! - [`services`] - External collaborator contracts with simulated doubles
//! - [`server`] - REST API surface and background-task wiring
//! - [`config`] - Configuration management and settings
//! - [`utils`] - Clock abstraction and shared helpers
//!
//! # Example
//!
//! ```no_run
//! use droidpool::config::AppConfig;
//! use droidpool::server::PoolServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let server = PoolServer::new(config)?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

pub mod allocation;
pub mod config;
pub mod error;
pub mod health;
pub mod registry;
pub mod server;
pub mod services;
pub mod session;
pub mod utils;
pub mod workflow;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::allocation::{AllocationRequest, AllocationScheduler, RequestPriority};
    pub use crate::config::AppConfig;
    pub use crate::error::{Error, ErrorCategory, PoolErrorTrait, Result};
    pub use crate::health::{DeviceHealthProbe, HealthMonitor, SimulatedHealthProbe};
    pub use crate::registry::{Activity, Device, DeviceId, DeviceRegistry, DeviceStatus, Platform};
    pub use crate::session::{Session, SessionManager, SessionOutcome};
    pub use crate::workflow::{Workflow, WorkflowConfig, WorkflowOrchestrator, WorkflowStatus};
}

// Direct re-exports for convenience
pub use registry::{Device, DeviceId, DeviceRegistry, DeviceStatus, Platform};
pub use workflow::{Workflow, WorkflowId, WorkflowStatus};
