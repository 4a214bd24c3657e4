//! Device registry for pooled mobile devices
//!
//! The registry owns the canonical state of every device in the pool:
//! identity, capability set, health metrics, cumulative statistics, and the
//! session binding. All other components mutate devices only through it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           Device Registry           │
//! │                                     │
//! │  ┌──────────────────────────────┐  │
//! │  │   per-device locked records  │  │
//! │  │  - capabilities / accounts   │  │
//! │  │  - health metrics            │  │
//! │  │  - usage statistics          │  │
//! │  │  - current session binding   │  │
//! │  └──────────────────────────────┘  │
//! │                                     │
//! │  broadcast: Registered / Removed /  │
//! │             StatusChanged           │
//! └─────────────────────────────────────┘
//! ```

pub mod device;
pub mod registry;

// Re-export main types
pub use device::{
    Activity, Device, DeviceConfig, DeviceId, DevicePlatform, DeviceStats, DeviceStatus,
    HealthMetrics, Platform, StatsDelta,
};
pub use registry::{
    AllocationConstraints, DeviceEvent, DeviceRegistry, PoolStatistics, RegistryError,
    StatusChange,
};
