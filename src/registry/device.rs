//! Device model for the pool
//!
//! Defines the canonical device record: identity, capability set, health
//! metrics, usage statistics, and the currently held session binding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::session::SessionId;

// ============================================================================
// Platform
// ============================================================================

/// Social platform a device account can operate on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
}

impl Platform {
    /// Get all platforms
    pub fn all() -> Vec<Self> {
        vec![Self::Tiktok, Self::Instagram, Self::Youtube]
    }

    /// Get platform ID as string
    pub fn id(&self) -> &'static str {
        match self {
            Self::Tiktok => "tiktok",
            Self::Instagram => "instagram",
            Self::Youtube => "youtube",
        }
    }

    /// Parse from string
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "tiktok" => Some(Self::Tiktok),
            "instagram" | "ig" => Some(Self::Instagram),
            "youtube" | "yt" => Some(Self::Youtube),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

// ============================================================================
// Activity
// ============================================================================

/// Automation activity a device can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    /// Watch content feeds
    Watch,
    /// Publish content
    Post,
    /// Like/comment/follow on existing content
    Engage,
}

impl Activity {
    /// Get all activities
    pub fn all() -> Vec<Self> {
        vec![Self::Watch, Self::Post, Self::Engage]
    }

    /// Get activity ID as string
    pub fn id(&self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Post => "post",
            Self::Engage => "engage",
        }
    }

    /// Parse from string
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "watch" => Some(Self::Watch),
            "post" => Some(Self::Post),
            "engage" | "engagement" => Some(Self::Engage),
            _ => None,
        }
    }

    /// Average session duration for this activity, in minutes
    ///
    /// Used by the wait estimator to compute remaining time on busy devices.
    pub fn average_duration_mins(&self) -> i64 {
        match self {
            Self::Watch => 30,
            Self::Post => 5,
            Self::Engage => 15,
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

// ============================================================================
// Device Identity
// ============================================================================

/// Unique device identifier within a pool
///
/// Ordered lexicographically; the allocation scheduler breaks score ties by
/// picking the lowest id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Host OS of a pooled device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePlatform {
    Android,
    Ios,
}

impl fmt::Display for DevicePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Android => write!(f, "android"),
            Self::Ios => write!(f, "ios"),
        }
    }
}

// ============================================================================
// Device Status
// ============================================================================

/// Lifecycle status of a pooled device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Idle and eligible for allocation
    Available,
    /// Holds an active session
    Busy,
    /// Unreachable (dead battery, disconnected)
    Offline,
    /// Excluded until manually cleared (e.g. overheated)
    Maintenance,
    /// Last health probe failed; excluded until the next successful probe
    Error,
}

impl DeviceStatus {
    /// Check if the device can receive a new allocation
    pub fn is_allocatable(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// Get status ID as string
    pub fn id(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Offline => "offline",
            Self::Maintenance => "maintenance",
            Self::Error => "error",
        }
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::Available
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

// ============================================================================
// Health Metrics
// ============================================================================

/// Point-in-time health reading for a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMetrics {
    /// Battery level, 0-100
    pub battery_level: f64,

    /// Case temperature in degrees Celsius
    pub temperature_c: f64,

    /// CPU utilisation, 0-100
    pub cpu_usage: f64,

    /// Memory utilisation, 0-100
    pub memory_usage: f64,

    /// When this reading was taken
    pub checked_at: DateTime<Utc>,
}

impl HealthMetrics {
    /// Create a fresh reading with the current timestamp
    pub fn new(battery_level: f64, temperature_c: f64, cpu_usage: f64, memory_usage: f64) -> Self {
        Self {
            battery_level: battery_level.clamp(0.0, 100.0),
            temperature_c,
            cpu_usage: cpu_usage.clamp(0.0, 100.0),
            memory_usage: memory_usage.clamp(0.0, 100.0),
            checked_at: Utc::now(),
        }
    }

    /// Combined CPU + memory load, 0-200
    pub fn combined_load(&self) -> f64 {
        self.cpu_usage + self.memory_usage
    }
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self::new(100.0, 25.0, 0.0, 0.0)
    }
}

// ============================================================================
// Device Statistics
// ============================================================================

/// Smoothing factor for the success-rate moving average
const SUCCESS_RATE_ALPHA: f64 = 0.1;

/// Cumulative usage statistics for a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStats {
    /// Total seconds spent watching content
    pub total_watch_secs: u64,

    /// Total posts published
    pub total_posts: u64,

    /// Total engagement actions performed
    pub total_engagements: u64,

    /// Exponentially averaged session success rate, 0-100
    pub success_rate: f64,

    /// When the device last finished a session
    pub last_active: Option<DateTime<Utc>>,
}

impl Default for DeviceStats {
    fn default() -> Self {
        Self {
            total_watch_secs: 0,
            total_posts: 0,
            total_engagements: 0,
            // New devices start with a neutral track record
            success_rate: 100.0,
            last_active: None,
        }
    }
}

impl DeviceStats {
    /// Fold a finished session into the statistics
    ///
    /// Success rate uses an exponential moving average so one bad session
    /// does not sink an otherwise reliable device.
    pub fn record_session(&mut self, delta: &StatsDelta, now: DateTime<Utc>) {
        self.total_watch_secs += delta.watch_secs;
        self.total_posts += delta.posts;
        self.total_engagements += delta.engagements;

        let observed = if delta.success { 100.0 } else { 0.0 };
        self.success_rate =
            (1.0 - SUCCESS_RATE_ALPHA) * self.success_rate + SUCCESS_RATE_ALPHA * observed;
        self.last_active = Some(now);
    }

    /// Hours since the device was last active, saturating at `cap`
    pub fn hours_since_last_use(&self, now: DateTime<Utc>, cap: f64) -> f64 {
        match self.last_active {
            Some(last) => {
                let hours = (now - last).num_seconds() as f64 / 3600.0;
                hours.clamp(0.0, cap)
            }
            // Never used counts as fully rested
            None => cap,
        }
    }
}

/// Per-session statistics delta applied on release
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsDelta {
    pub success: bool,
    pub watch_secs: u64,
    pub posts: u64,
    pub engagements: u64,
}

// ============================================================================
// Device
// ============================================================================

/// Configuration used to register a device into the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier (must be unique within the pool)
    pub id: DeviceId,

    /// Hardware identifier (serial number, emulator name)
    pub hardware_id: String,

    /// Host OS
    pub platform: DevicePlatform,

    /// Social platforms this device has apps installed for
    pub supported_platforms: Vec<Platform>,

    /// Activities this device is permitted to run
    pub capabilities: Vec<Activity>,

    /// Platform -> account handle assignments
    #[serde(default)]
    pub accounts: HashMap<Platform, String>,
}

/// A pooled device and its full mutable state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Device identifier
    pub id: DeviceId,

    /// Hardware identifier
    pub hardware_id: String,

    /// Host OS
    pub platform: DevicePlatform,

    /// Social platforms this device supports
    pub supported_platforms: Vec<Platform>,

    /// Permitted activities
    pub capabilities: Vec<Activity>,

    /// Platform -> account handle assignments
    pub accounts: HashMap<Platform, String>,

    /// Current lifecycle status
    pub status: DeviceStatus,

    /// Latest health reading
    pub health: HealthMetrics,

    /// Cumulative usage statistics
    pub stats: DeviceStats,

    /// Session currently held by this device, if any
    pub current_session: Option<SessionId>,

    /// Status to apply once the current session releases
    ///
    /// Health demotions (dead battery, overheat) on a busy device are
    /// deferred here so `busy` always implies a live session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_status: Option<DeviceStatus>,

    /// When the device was registered
    pub registered_at: DateTime<Utc>,
}

impl Device {
    /// Create a device from its registration config
    pub fn from_config(config: DeviceConfig) -> Self {
        Self {
            id: config.id,
            hardware_id: config.hardware_id,
            platform: config.platform,
            supported_platforms: config.supported_platforms,
            capabilities: config.capabilities,
            accounts: config.accounts,
            status: DeviceStatus::Available,
            health: HealthMetrics::default(),
            stats: DeviceStats::default(),
            current_session: None,
            pending_status: None,
            registered_at: Utc::now(),
        }
    }

    /// Check platform support
    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.supported_platforms.contains(&platform)
    }

    /// Check activity capability
    pub fn supports_activity(&self, activity: Activity) -> bool {
        self.capabilities.contains(&activity)
    }

    /// Check whether an account is assigned for a platform
    pub fn has_account_for(&self, platform: Platform) -> bool {
        self.accounts.contains_key(&platform)
    }

    /// Check the busy/session pairing invariant
    pub fn invariant_holds(&self) -> bool {
        (self.status == DeviceStatus::Busy) == self.current_session.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_config(id: &str) -> DeviceConfig {
        DeviceConfig {
            id: DeviceId::new(id),
            hardware_id: format!("hw-{id}"),
            platform: DevicePlatform::Android,
            supported_platforms: vec![Platform::Tiktok, Platform::Youtube],
            capabilities: vec![Activity::Watch, Activity::Post],
            accounts: HashMap::new(),
        }
    }

    #[test]
    fn test_platform_from_id() {
        assert_eq!(Platform::from_id("tiktok"), Some(Platform::Tiktok));
        assert_eq!(Platform::from_id("YouTube"), Some(Platform::Youtube));
        assert_eq!(Platform::from_id("ig"), Some(Platform::Instagram));
        assert_eq!(Platform::from_id("myspace"), None);
    }

    #[test]
    fn test_activity_average_durations() {
        assert_eq!(Activity::Watch.average_duration_mins(), 30);
        assert_eq!(Activity::Post.average_duration_mins(), 5);
        assert_eq!(Activity::Engage.average_duration_mins(), 15);
    }

    #[test]
    fn test_device_status_allocatable() {
        assert!(DeviceStatus::Available.is_allocatable());
        assert!(!DeviceStatus::Busy.is_allocatable());
        assert!(!DeviceStatus::Offline.is_allocatable());
        assert!(!DeviceStatus::Maintenance.is_allocatable());
        assert!(!DeviceStatus::Error.is_allocatable());
    }

    #[test]
    fn test_device_id_ordering() {
        let a = DeviceId::new("device-a");
        let b = DeviceId::new("device-b");
        assert!(a < b);
    }

    #[test]
    fn test_device_from_config() {
        let device = Device::from_config(sample_config("d1"));

        assert_eq!(device.status, DeviceStatus::Available);
        assert!(device.current_session.is_none());
        assert!(device.invariant_holds());
        assert!(device.supports_platform(Platform::Tiktok));
        assert!(!device.supports_platform(Platform::Instagram));
        assert!(device.supports_activity(Activity::Watch));
        assert!(!device.supports_activity(Activity::Engage));
    }

    #[test]
    fn test_stats_record_session_ema() {
        let mut stats = DeviceStats::default();
        let now = Utc::now();

        // One failure against a perfect record: 0.9 * 100 + 0.1 * 0 = 90
        stats.record_session(
            &StatsDelta {
                success: false,
                ..Default::default()
            },
            now,
        );
        assert!((stats.success_rate - 90.0).abs() < 1e-9);

        // A success pulls it back up: 0.9 * 90 + 0.1 * 100 = 91
        stats.record_session(
            &StatsDelta {
                success: true,
                watch_secs: 120,
                posts: 1,
                engagements: 3,
            },
            now,
        );
        assert!((stats.success_rate - 91.0).abs() < 1e-9);
        assert_eq!(stats.total_watch_secs, 120);
        assert_eq!(stats.total_posts, 1);
        assert_eq!(stats.total_engagements, 3);
        assert_eq!(stats.last_active, Some(now));
    }

    #[test]
    fn test_stats_hours_since_last_use() {
        let now = Utc::now();
        let mut stats = DeviceStats::default();

        // Never used saturates at the cap
        assert!((stats.hours_since_last_use(now, 24.0) - 24.0).abs() < 1e-9);

        stats.last_active = Some(now - Duration::hours(6));
        assert!((stats.hours_since_last_use(now, 24.0) - 6.0).abs() < 0.01);

        stats.last_active = Some(now - Duration::hours(48));
        assert!((stats.hours_since_last_use(now, 24.0) - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_health_metrics_clamping() {
        let metrics = HealthMetrics::new(150.0, 30.0, -5.0, 250.0);
        assert!((metrics.battery_level - 100.0).abs() < 1e-9);
        assert!((metrics.cpu_usage - 0.0).abs() < 1e-9);
        assert!((metrics.memory_usage - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_device_serde_round_trip() {
        let mut device = Device::from_config(sample_config("d1"));
        device.accounts.insert(Platform::Tiktok, "@pool_d1".to_string());
        device.stats.total_posts = 12;

        let json = serde_json::to_string(&device).unwrap();
        let restored: Device = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, device.id);
        assert_eq!(restored.status, device.status);
        assert_eq!(restored.stats.total_posts, 12);
        assert_eq!(restored.accounts.get(&Platform::Tiktok).unwrap(), "@pool_d1");
    }
}
