//! Pool server and API surface
//!
//! Exposes the core's operations to the dashboard layer over REST and wires
//! the background loops together.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │            Pool Server              │
//! │                                     │
//! │  ┌──────────────────────────────┐  │
//! │  │        REST API              │  │
//! │  │  GET  /api/pool/stats        │  │
//! │  │  GET  /api/devices           │  │
//! │  │  POST /api/workflows         │  │
//! │  │  POST /api/workflows/{id}/…  │  │
//! │  │  POST /api/watch             │  │
//! │  │  POST /api/posts             │  │
//! │  └──────────────────────────────┘  │
//! │                                     │
//! │  background tasks:                  │
//! │  - allocation scheduling loop       │
//! │  - health sweep loop                │
//! │  - daily re-scheduling sweep        │
//! └─────────────────────────────────────┘
//! ```

pub mod api;
pub mod client;
pub mod server;

// Re-export main types
pub use api::{ApiResponse, DevicesResponse, HealthResponse, PoolStatsResponse, WorkflowsResponse};
pub use client::{ClientConfig, ClientError, PoolClient};
pub use server::{AppState, PoolServer, ServerError, ServerInfo};
