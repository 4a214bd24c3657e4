//! Device health monitoring
//!
//! A periodic background sweep queries every device through a
//! [`DeviceHealthProbe`] and applies the pool's health policy:
//!
//! - battery at zero takes the device offline; recovery brings it back
//! - temperature over the limit parks it in maintenance until cleared
//! - low battery raises an alert without blocking allocation
//! - a failed probe excludes the device until the next good probe
//!
//! Alerts are broadcast as [`HealthEvent`]s.

pub mod monitor;
pub mod probe;

// Re-export main types
pub use monitor::{HealthEvent, HealthMonitor, HealthMonitorConfig};
pub use probe::{DeviceHealthProbe, ProbeError, SimulatedHealthProbe};
