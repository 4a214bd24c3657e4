//! Configuration management for the device pool
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::allocation::SchedulerConfig;
use crate::health::HealthMonitorConfig;
use crate::registry::{Activity, DeviceConfig, DeviceId, DevicePlatform, Platform};
use crate::workflow::OrchestratorConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Device pool configuration
    pub pool: PoolConfig,

    /// Allocation scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Health monitor configuration
    pub health: HealthMonitorConfig,

    /// Workflow orchestrator configuration
    pub orchestrator: OrchestratorConfig,

    /// Simulation configuration
    pub simulation: SimulationConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Explicit device fleet (in addition to the simulated one)
    pub devices: Vec<DeviceConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Enable CORS for the API
    pub enable_cors: bool,

    /// Enable request logging
    pub enable_request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".parse().expect("static address"),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

/// Device pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum registered devices
    pub max_devices: usize,

    /// Number of simulated devices to seed on startup
    pub simulated_devices: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_devices: 32,
            simulated_devices: 4,
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for every simulated collaborator
    pub seed: u64,

    /// Fraction of health probes that fail (0.0 - 1.0)
    pub probe_failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            probe_failure_rate: 0.02,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted workflows and reports; in-memory when unset
    pub data_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pool: PoolConfig::default(),
            scheduler: SchedulerConfig::default(),
            health: HealthMonitorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            simulation: SimulationConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            devices: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("DROIDPOOL_BIND") {
            config.server.bind_address = addr
                .parse()
                .with_context(|| format!("Invalid DROIDPOOL_BIND address: {addr}"))?;
        }
        if let Some(max) = env_parse::<usize>("DROIDPOOL_MAX_DEVICES") {
            config.pool.max_devices = max;
        }
        if let Some(count) = env_parse::<usize>("DROIDPOOL_SIMULATED_DEVICES") {
            config.pool.simulated_devices = count;
        }
        if let Some(seed) = env_parse::<u64>("DROIDPOOL_SEED") {
            config.simulation.seed = seed;
        }
        if let Some(interval) = env_parse::<u64>("DROIDPOOL_HEALTH_INTERVAL") {
            config.health.interval_secs = interval;
        }
        if let Some(tick) = env_parse::<u64>("DROIDPOOL_SCHEDULER_TICK") {
            config.scheduler.tick_interval_secs = tick;
        }
        if let Ok(dir) = std::env::var("DROIDPOOL_DATA_DIR") {
            config.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(level) = std::env::var("DROIDPOOL_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, with env overrides applied last
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_devices == 0 {
            anyhow::bail!("pool.max_devices must be at least 1");
        }
        if self.pool.simulated_devices + self.devices.len() > self.pool.max_devices {
            anyhow::bail!(
                "fleet size {} exceeds pool.max_devices {}",
                self.pool.simulated_devices + self.devices.len(),
                self.pool.max_devices
            );
        }
        if !(0.0..=1.0).contains(&self.simulation.probe_failure_rate) {
            anyhow::bail!("simulation.probe_failure_rate must be within 0.0..=1.0");
        }
        if self.scheduler.tick_interval_secs == 0 {
            anyhow::bail!("scheduler.tick_interval_secs must be at least 1");
        }
        Ok(())
    }

    /// The full device fleet: explicit devices plus the simulated ones
    pub fn fleet(&self) -> Vec<DeviceConfig> {
        let mut fleet = self.devices.clone();
        fleet.extend(simulated_fleet(self.pool.simulated_devices));
        fleet
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

/// Generate a simulated device fleet
///
/// Devices alternate between android and ios, all support every platform
/// and activity, and every other device carries a tiktok + instagram
/// account assignment.
pub fn simulated_fleet(count: usize) -> Vec<DeviceConfig> {
    (0..count)
        .map(|i| {
            let id = format!("sim-{:02}", i + 1);
            let mut accounts = HashMap::new();
            if i % 2 == 0 {
                accounts.insert(Platform::Tiktok, format!("@pool_tt_{:02}", i + 1));
                accounts.insert(Platform::Instagram, format!("@pool_ig_{:02}", i + 1));
            }
            DeviceConfig {
                id: DeviceId::new(&id),
                hardware_id: format!("emu-{:04x}", 0x1000 + i),
                platform: if i % 2 == 0 {
                    DevicePlatform::Android
                } else {
                    DevicePlatform::Ios
                },
                supported_platforms: Platform::all(),
                capabilities: Activity::all(),
                accounts,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool.max_devices, 32);
        assert_eq!(config.health.interval_secs, 60);
    }

    #[test]
    fn test_validation_rejects_oversized_fleet() {
        let mut config = AppConfig::default();
        config.pool.max_devices = 2;
        config.pool.simulated_devices = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_failure_rate() {
        let mut config = AppConfig::default();
        config.simulation.probe_failure_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_simulated_fleet_shape() {
        let fleet = simulated_fleet(4);
        assert_eq!(fleet.len(), 4);

        // All ids unique
        let ids: std::collections::HashSet<_> = fleet.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids.len(), 4);

        // Every other device carries accounts
        assert!(!fleet[0].accounts.is_empty());
        assert!(fleet[1].accounts.is_empty());

        for device in &fleet {
            assert_eq!(device.supported_platforms.len(), 3);
            assert_eq!(device.capabilities.len(), 3);
        }
    }

    #[test]
    fn test_from_toml() {
        let toml_src = r#"
            [server]
            bind_address = "127.0.0.1:9000"

            [pool]
            max_devices = 8
            simulated_devices = 2

            [simulation]
            seed = 7

            [[devices]]
            id = "lab-phone-1"
            hardware_id = "R58M12ABC"
            platform = "android"
            supported_platforms = ["tiktok"]
            capabilities = ["watch", "post"]
        "#;

        let config: AppConfig = toml::from_str(toml_src).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.bind_address.port(), 9000);
        assert_eq!(config.pool.max_devices, 8);
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].id, DeviceId::new("lab-phone-1"));
        assert_eq!(config.fleet().len(), 3);
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let restored: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(restored.pool.max_devices, config.pool.max_devices);
        assert_eq!(restored.logging.level, config.logging.level);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_overrides() {
        std::env::set_var("DROIDPOOL_MAX_DEVICES", "12");
        std::env::set_var("DROIDPOOL_SEED", "99");
        std::env::set_var("DROIDPOOL_HEALTH_INTERVAL", "15");

        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.pool.max_devices, 12);
        assert_eq!(config.simulation.seed, 99);
        assert_eq!(config.health.interval_secs, 15);

        std::env::remove_var("DROIDPOOL_MAX_DEVICES");
        std::env::remove_var("DROIDPOOL_SEED");
        std::env::remove_var("DROIDPOOL_HEALTH_INTERVAL");
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_rejects_bad_bind() {
        std::env::set_var("DROIDPOOL_BIND", "not-an-address");
        let result = AppConfig::from_env();
        std::env::remove_var("DROIDPOOL_BIND");
        assert!(result.is_err());
    }
}
