//! Device registry for the pool
//!
//! Holds the canonical state of every device. Mutations are serialized per
//! device id (each device sits behind its own lock); mutations on different
//! devices run concurrently. State changes are broadcast to subscribers.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

use super::device::{
    Activity, Device, DeviceConfig, DeviceId, DeviceStatus, HealthMetrics, Platform, StatsDelta,
};
use crate::session::SessionId;

// ============================================================================
// Registry Errors
// ============================================================================

/// Registry errors
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// Device already registered
    #[error("Device already registered: {0}")]
    AlreadyRegistered(DeviceId),

    /// Registry at capacity
    #[error("Registry at capacity: {current}/{max}")]
    CapacityExceeded { current: usize, max: usize },

    /// Device is not in a state that permits the operation
    #[error("Device {id} is {status}, expected {expected}")]
    InvalidState {
        id: DeviceId,
        status: DeviceStatus,
        expected: DeviceStatus,
    },
}

// ============================================================================
// Device Events
// ============================================================================

/// State-change events broadcast by the registry
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device joined the pool
    Registered { id: DeviceId },

    /// A device left the pool
    Removed { id: DeviceId },

    /// A device changed lifecycle status
    StatusChanged {
        id: DeviceId,
        from: DeviceStatus,
        to: DeviceStatus,
    },

    /// A device received a fresh health reading
    HealthUpdated { id: DeviceId },
}

/// Outcome of a status-change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    /// The transition took effect immediately
    Applied,
    /// The device holds a session; the transition applies on release
    Deferred,
    /// The device was already in the target status
    Unchanged,
}

// ============================================================================
// Allocation Constraints
// ============================================================================

/// Optional per-request device constraints
#[derive(Debug, Clone, Default, Serialize, serde::Deserialize)]
pub struct AllocationConstraints {
    /// Minimum battery level, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_battery: Option<f64>,

    /// Maximum temperature in degrees Celsius
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<f64>,

    /// Require a specific device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
}

impl AllocationConstraints {
    /// Check whether a device satisfies these constraints
    pub fn satisfied_by(&self, device: &Device) -> bool {
        if let Some(min) = self.min_battery {
            if device.health.battery_level < min {
                return false;
            }
        }
        if let Some(max) = self.max_temperature {
            if device.health.temperature_c > max {
                return false;
            }
        }
        if let Some(id) = &self.device_id {
            if &device.id != id {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Pool Statistics
// ============================================================================

/// Aggregate statistics over the whole pool
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct PoolStatistics {
    pub total_devices: usize,
    pub available: usize,
    pub busy: usize,
    pub offline: usize,
    pub maintenance: usize,
    pub error: usize,
    pub avg_battery: f64,
    pub avg_success_rate: f64,
    pub total_watch_secs: u64,
    pub total_posts: u64,
    pub total_engagements: u64,
}

impl PoolStatistics {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Pool Statistics\n\
             {:-<30}\n\
             Total Devices: {}\n\
             - Available: {}\n\
             - Busy: {}\n\
             - Offline: {}\n\
             - Maintenance: {}\n\
             - Error: {}\n\
             Avg Battery: {:.1}%\n\
             Avg Success Rate: {:.1}%\n\
             Watch Time: {}s\n\
             Posts: {}\n\
             Engagements: {}",
            "",
            self.total_devices,
            self.available,
            self.busy,
            self.offline,
            self.maintenance,
            self.error,
            self.avg_battery,
            self.avg_success_rate,
            self.total_watch_secs,
            self.total_posts,
            self.total_engagements
        )
    }
}

// ============================================================================
// Device Registry
// ============================================================================

/// Registry tracking all devices in a pool
///
/// The outer map lock is held only long enough to locate a device; each
/// device then has its own lock, so two mutations on the same id are
/// serialized while different devices proceed in parallel.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceId, Arc<RwLock<Device>>>>,
    max_devices: usize,
    events: broadcast::Sender<DeviceEvent>,
}

impl DeviceRegistry {
    /// Create a new registry with a device capacity bound
    pub fn new(max_devices: usize) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            devices: RwLock::new(HashMap::new()),
            max_devices,
            events,
        }
    }

    /// Subscribe to device state-change events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Register a new device
    pub async fn add(&self, config: DeviceConfig) -> Result<(), RegistryError> {
        let mut devices = self.devices.write().await;

        if devices.contains_key(&config.id) {
            return Err(RegistryError::AlreadyRegistered(config.id));
        }
        if devices.len() >= self.max_devices {
            return Err(RegistryError::CapacityExceeded {
                current: devices.len(),
                max: self.max_devices,
            });
        }

        let id = config.id.clone();
        let device = Device::from_config(config);
        devices.insert(id.clone(), Arc::new(RwLock::new(device)));

        tracing::info!(device = %id, "Device registered");
        let _ = self.events.send(DeviceEvent::Registered { id });
        Ok(())
    }

    /// Remove a device from the pool
    ///
    /// A device still holding a session has it force-dropped; the session
    /// manager's later release for that id becomes a no-op.
    pub async fn remove(&self, id: &DeviceId) -> Result<Device, RegistryError> {
        let entry = {
            let mut devices = self.devices.write().await;
            devices
                .remove(id)
                .ok_or_else(|| RegistryError::DeviceNotFound(id.clone()))?
        };

        let mut device = entry.write().await;
        if let Some(session) = device.current_session.take() {
            tracing::warn!(device = %id, session = %session, "Removing device with active session");
            device.status = DeviceStatus::Offline;
        }

        let _ = self.events.send(DeviceEvent::Removed { id: id.clone() });
        Ok(device.clone())
    }

    /// Get a snapshot of a device
    pub async fn get(&self, id: &DeviceId) -> Option<Device> {
        let entry = self.devices.read().await.get(id).cloned()?;
        let device = entry.read().await;
        Some(device.clone())
    }

    /// List device snapshots, optionally filtered by status
    pub async fn list(&self, status: Option<DeviceStatus>) -> Vec<Device> {
        let entries: Vec<_> = self.devices.read().await.values().cloned().collect();
        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let device = entry.read().await;
            if status.is_none() || status == Some(device.status) {
                result.push(device.clone());
            }
        }
        result.sort_by(|a, b| a.id.cmp(&b.id));
        result
    }

    /// Number of registered devices
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Check if the pool is empty
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Record a health reading for a device
    pub async fn update_health(
        &self,
        id: &DeviceId,
        metrics: HealthMetrics,
    ) -> Result<(), RegistryError> {
        let entry = self.device_entry(id).await?;
        let mut device = entry.write().await;
        device.health = metrics;
        drop(device);

        let _ = self.events.send(DeviceEvent::HealthUpdated { id: id.clone() });
        Ok(())
    }

    /// Request a status transition for a device
    ///
    /// Demotions on a busy device are deferred until its session releases,
    /// preserving the busy-implies-session invariant.
    pub async fn set_status(
        &self,
        id: &DeviceId,
        status: DeviceStatus,
    ) -> Result<StatusChange, RegistryError> {
        let entry = self.device_entry(id).await?;
        let mut device = entry.write().await;

        if device.status == status {
            return Ok(StatusChange::Unchanged);
        }
        if device.status == DeviceStatus::Busy {
            device.pending_status = Some(status);
            return Ok(StatusChange::Deferred);
        }

        let from = device.status;
        device.status = status;
        let _ = self.events.send(DeviceEvent::StatusChanged {
            id: id.clone(),
            from,
            to: status,
        });
        Ok(StatusChange::Applied)
    }

    /// Bind a session to an available device and mark it busy
    pub async fn mark_busy(
        &self,
        id: &DeviceId,
        session: SessionId,
    ) -> Result<(), RegistryError> {
        let entry = self.device_entry(id).await?;
        let mut device = entry.write().await;

        if device.status != DeviceStatus::Available {
            return Err(RegistryError::InvalidState {
                id: id.clone(),
                status: device.status,
                expected: DeviceStatus::Available,
            });
        }

        device.status = DeviceStatus::Busy;
        device.current_session = Some(session);
        let _ = self.events.send(DeviceEvent::StatusChanged {
            id: id.clone(),
            from: DeviceStatus::Available,
            to: DeviceStatus::Busy,
        });
        Ok(())
    }

    /// Release a device's session, fold in the session statistics, and
    /// restore it to `available` (or apply a deferred health demotion)
    pub async fn mark_available(
        &self,
        id: &DeviceId,
        delta: &StatsDelta,
    ) -> Result<(), RegistryError> {
        let entry = self.device_entry(id).await?;
        let mut device = entry.write().await;

        device.current_session = None;
        device.stats.record_session(delta, Utc::now());

        let from = device.status;
        let to = device.pending_status.take().unwrap_or(DeviceStatus::Available);
        device.status = to;

        if from != to {
            let _ = self.events.send(DeviceEvent::StatusChanged {
                id: id.clone(),
                from,
                to,
            });
        }
        Ok(())
    }

    /// Check whether any registered device (in any status) covers the
    /// requested platform and activity
    pub async fn any_device_covers(&self, platform: Platform, activity: Activity) -> bool {
        let entries: Vec<_> = self.devices.read().await.values().cloned().collect();
        for entry in entries {
            let device = entry.read().await;
            if device.supports_platform(platform) && device.supports_activity(activity) {
                return true;
            }
        }
        false
    }

    /// Find allocatable devices matching a request
    ///
    /// Returns snapshots of available devices supporting the platform and
    /// activity that also satisfy the explicit constraints.
    pub async fn find_candidates(
        &self,
        platform: Platform,
        activity: Activity,
        constraints: &AllocationConstraints,
    ) -> Vec<Device> {
        let entries: Vec<_> = self.devices.read().await.values().cloned().collect();
        let mut candidates = Vec::new();
        for entry in entries {
            let device = entry.read().await;
            if device.status.is_allocatable()
                && device.supports_platform(platform)
                && device.supports_activity(activity)
                && constraints.satisfied_by(&device)
            {
                candidates.push(device.clone());
            }
        }
        candidates
    }

    /// Busy devices that support the given platform and activity
    ///
    /// Used by the wait estimator to look at in-flight sessions.
    pub async fn busy_devices_covering(
        &self,
        platform: Platform,
        activity: Activity,
    ) -> Vec<Device> {
        let entries: Vec<_> = self.devices.read().await.values().cloned().collect();
        let mut result = Vec::new();
        for entry in entries {
            let device = entry.read().await;
            if device.status == DeviceStatus::Busy
                && device.supports_platform(platform)
                && device.supports_activity(activity)
            {
                result.push(device.clone());
            }
        }
        result
    }

    /// Aggregate statistics over the whole pool
    pub async fn pool_statistics(&self) -> PoolStatistics {
        let devices = self.list(None).await;

        let mut stats = PoolStatistics {
            total_devices: devices.len(),
            available: 0,
            busy: 0,
            offline: 0,
            maintenance: 0,
            error: 0,
            avg_battery: 0.0,
            avg_success_rate: 0.0,
            total_watch_secs: 0,
            total_posts: 0,
            total_engagements: 0,
        };

        for device in &devices {
            match device.status {
                DeviceStatus::Available => stats.available += 1,
                DeviceStatus::Busy => stats.busy += 1,
                DeviceStatus::Offline => stats.offline += 1,
                DeviceStatus::Maintenance => stats.maintenance += 1,
                DeviceStatus::Error => stats.error += 1,
            }
            stats.avg_battery += device.health.battery_level;
            stats.avg_success_rate += device.stats.success_rate;
            stats.total_watch_secs += device.stats.total_watch_secs;
            stats.total_posts += device.stats.total_posts;
            stats.total_engagements += device.stats.total_engagements;
        }

        if !devices.is_empty() {
            stats.avg_battery /= devices.len() as f64;
            stats.avg_success_rate /= devices.len() as f64;
        }

        stats
    }

    // Internal: look up a device entry by id
    async fn device_entry(&self, id: &DeviceId) -> Result<Arc<RwLock<Device>>, RegistryError> {
        self.devices
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::DeviceNotFound(id.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================
