//! Background health monitoring
//!
//! Polls every registered device on a fixed interval and demotes or
//! promotes device status from the readings: dead batteries take devices
//! offline, overheating parks them in maintenance, failed probes exclude
//! them until the next successful read. Alerts go out as broadcast events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify, RwLock};

use super::probe::DeviceHealthProbe;
use crate::registry::{DeviceId, DeviceRegistry, DeviceStatus};

// ============================================================================
// Monitor Configuration
// ============================================================================

/// Configuration for the health monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// Seconds between sweeps over the pool
    pub interval_secs: u64,

    /// Battery level below which a low-battery alert is raised
    pub low_battery_threshold: f64,

    /// Temperature above which a device is parked in maintenance
    pub overheat_threshold_c: f64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            low_battery_threshold: 20.0,
            overheat_threshold_c: 45.0,
        }
    }
}

// ============================================================================
// Health Events
// ============================================================================

/// Alerts emitted by the health monitor
#[derive(Debug, Clone)]
pub enum HealthEvent {
    /// Battery below the alert threshold; device stays allocatable
    LowBattery { id: DeviceId, level: f64 },

    /// Device over the thermal limit; parked in maintenance
    Overheating { id: DeviceId, temperature_c: f64 },

    /// Battery hit zero; device taken offline
    WentOffline { id: DeviceId },

    /// An offline device's battery recovered; back in the pool
    BackOnline { id: DeviceId },

    /// Health probe failed; device excluded until the next good probe
    ProbeFailed { id: DeviceId, error: String },

    /// A device in error state produced a good probe again
    Recovered { id: DeviceId },
}

// ============================================================================
// Health Monitor
// ============================================================================

/// Periodic health sweep over the device pool
pub struct HealthMonitor {
    registry: Arc<DeviceRegistry>,
    probe: Arc<dyn DeviceHealthProbe>,
    config: HealthMonitorConfig,
    events: broadcast::Sender<HealthEvent>,
    is_running: RwLock<bool>,
    stop_notify: Notify,
    last_sweep: RwLock<Option<DateTime<Utc>>>,
}

impl HealthMonitor {
    /// Create a new monitor
    pub fn new(
        registry: Arc<DeviceRegistry>,
        probe: Arc<dyn DeviceHealthProbe>,
        config: HealthMonitorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            registry,
            probe,
            config,
            events,
            is_running: RwLock::new(false),
            stop_notify: Notify::new(),
            last_sweep: RwLock::new(None),
        }
    }

    /// Create with default config
    pub fn with_defaults(registry: Arc<DeviceRegistry>, probe: Arc<dyn DeviceHealthProbe>) -> Self {
        Self::new(registry, probe, HealthMonitorConfig::default())
    }

    /// Subscribe to health alerts
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Run the monitor loop until stopped
    pub async fn start(&self) {
        *self.is_running.write().await = true;
        let interval = std::time::Duration::from_secs(self.config.interval_secs);

        tracing::info!(
            interval_secs = self.config.interval_secs,
            "Health monitor started"
        );

        while *self.is_running.read().await {
            self.run_sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.stop_notify.notified() => break,
            }
        }

        tracing::info!("Health monitor stopped");
    }

    /// Stop the monitor loop
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        self.stop_notify.notify_one();
    }

    /// Check if the loop is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// When the last sweep finished
    pub async fn last_sweep(&self) -> Option<DateTime<Utc>> {
        *self.last_sweep.read().await
    }

    /// Probe every registered device once
    pub async fn run_sweep(&self) {
        let devices = self.registry.list(None).await;
        for device in devices {
            self.check_device(&device.id).await;
        }
        *self.last_sweep.write().await = Some(Utc::now());
    }

    /// Probe one device and apply the threshold rules
    pub async fn check_device(&self, id: &DeviceId) {
        let previous = match self.registry.get(id).await {
            Some(device) => device.status,
            None => return,
        };

        let metrics = match self.probe.query(id).await {
            Ok(metrics) => metrics,
            Err(e) => {
                tracing::warn!(device = %id, error = %e, "Health probe failed");
                let _ = self.registry.set_status(id, DeviceStatus::Error).await;
                let _ = self.events.send(HealthEvent::ProbeFailed {
                    id: id.clone(),
                    error: e.to_string(),
                });
                return;
            }
        };

        let battery = metrics.battery_level;
        let temperature = metrics.temperature_c;
        if self.registry.update_health(id, metrics).await.is_err() {
            return;
        }

        // Dead battery takes the device offline; recovery brings it back
        if battery <= 0.0 {
            if previous != DeviceStatus::Offline {
                let _ = self.registry.set_status(id, DeviceStatus::Offline).await;
                let _ = self.events.send(HealthEvent::WentOffline { id: id.clone() });
            }
            return;
        }
        if previous == DeviceStatus::Offline {
            let _ = self.registry.set_status(id, DeviceStatus::Available).await;
            let _ = self.events.send(HealthEvent::BackOnline { id: id.clone() });
        }

        // A good probe clears error state
        if previous == DeviceStatus::Error {
            let _ = self.registry.set_status(id, DeviceStatus::Available).await;
            let _ = self.events.send(HealthEvent::Recovered { id: id.clone() });
        }

        // Overheating parks the device until an operator clears it
        if temperature > self.config.overheat_threshold_c
            && previous != DeviceStatus::Maintenance
        {
            tracing::warn!(device = %id, temperature_c = temperature, "Device overheating");
            let _ = self.registry.set_status(id, DeviceStatus::Maintenance).await;
            let _ = self.events.send(HealthEvent::Overheating {
                id: id.clone(),
                temperature_c: temperature,
            });
            return;
        }

        // Low battery is an alert only; requests can still constrain on it
        if battery < self.config.low_battery_threshold {
            let _ = self.events.send(HealthEvent::LowBattery {
                id: id.clone(),
                level: battery,
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
