//! Coordination strategies
//!
//! A strategy is a named, read-only policy controlling how a workflow picks
//! devices, diversifies content, paces its actions, and how aggressively it
//! engages. Strategies are looked up by name from a registry seeded with
//! built-in presets.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::registry::{Device, Platform};

// ============================================================================
// Allocation Mode
// ============================================================================

/// How a strategy orders devices for a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMode {
    /// Cycle through the device list
    RoundRobin,
    /// Prefer devices with the lowest current cpu+memory load
    LoadBalanced,
    /// Prefer devices with a pre-existing account for the platform
    PlatformSpecialized,
    /// Shuffle
    Random,
}

impl Default for AllocationMode {
    fn default() -> Self {
        Self::RoundRobin
    }
}

// ============================================================================
// Content Strategy
// ============================================================================

/// Content diversity policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStrategy {
    /// Same content everywhere
    Consistent,
    /// Per-platform variations
    Varied,
    /// Chase whatever is trending per platform
    Trending,
}

impl Default for ContentStrategy {
    fn default() -> Self {
        Self::Varied
    }
}

// ============================================================================
// Timing Mode
// ============================================================================

/// Pacing policy for workflow actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Spread actions out with randomized gaps
    Staggered,
    /// Fire together
    Simultaneous,
    /// Concentrate on peak hours
    PeakHours,
    /// Concentrate off peak
    OffPeak,
}

impl Default for TimingMode {
    fn default() -> Self {
        Self::Staggered
    }
}

impl TimingMode {
    /// Sample the delay between consecutive posts
    ///
    /// Staggered: 30-90s. Off-peak: 2-7min. Everything else: 10-40s.
    pub fn sample_post_delay<R: Rng>(&self, rng: &mut R) -> Duration {
        let millis = match self {
            Self::Staggered => rng.gen_range(30_000..90_000),
            Self::OffPeak => rng.gen_range(120_000..420_000),
            Self::Simultaneous | Self::PeakHours => rng.gen_range(10_000..40_000),
        };
        Duration::from_millis(millis)
    }
}

// ============================================================================
// Engagement Level
// ============================================================================

/// Engagement aggressiveness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Moderate,
    High,
}

impl Default for EngagementLevel {
    fn default() -> Self {
        Self::Moderate
    }
}

impl EngagementLevel {
    /// Multiplier applied to engagement volume
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Low => 0.5,
            Self::Moderate => 1.0,
            Self::High => 2.0,
        }
    }
}

// ============================================================================
// Coordination Strategy
// ============================================================================

/// Named policy bundle for a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationStrategy {
    /// Strategy name
    pub name: String,

    /// Device ordering policy
    #[serde(default)]
    pub allocation: AllocationMode,

    /// Content diversity policy
    #[serde(default)]
    pub content: ContentStrategy,

    /// Pacing policy
    #[serde(default)]
    pub timing: TimingMode,

    /// Engagement aggressiveness
    #[serde(default)]
    pub aggressiveness: EngagementLevel,
}

impl CoordinationStrategy {
    /// A neutral default strategy
    pub fn default_strategy() -> Self {
        Self {
            name: "default".to_string(),
            allocation: AllocationMode::RoundRobin,
            content: ContentStrategy::Varied,
            timing: TimingMode::Staggered,
            aggressiveness: EngagementLevel::Moderate,
        }
    }

    /// Order devices for one phase of work
    ///
    /// The assignment is computed once per phase; `offset` advances the
    /// round-robin cursor between phases so load rotates over time.
    pub fn assign_devices<R: Rng>(
        &self,
        devices: &[Device],
        platform: Platform,
        offset: usize,
        rng: &mut R,
    ) -> Vec<Device> {
        if devices.is_empty() {
            return Vec::new();
        }
        let mut ordered: Vec<Device> = devices.to_vec();

        match self.allocation {
            AllocationMode::RoundRobin => {
                let len = ordered.len();
                ordered.rotate_left(offset % len);
            }
            AllocationMode::LoadBalanced => {
                ordered.sort_by(|a, b| {
                    a.health
                        .combined_load()
                        .partial_cmp(&b.health.combined_load())
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(a.id.cmp(&b.id))
                });
            }
            AllocationMode::PlatformSpecialized => {
                // Stable partition: account holders first, original order kept
                ordered.sort_by_key(|d| !d.has_account_for(platform));
            }
            AllocationMode::Random => {
                ordered.shuffle(rng);
            }
        }

        ordered
    }
}

// ============================================================================
// Strategy Registry
// ============================================================================

/// Named strategy lookup, seeded with the built-in presets
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: HashMap<String, CoordinationStrategy>,
}

impl StrategyRegistry {
    /// Create a registry with the built-in presets
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };

        registry.register(CoordinationStrategy {
            name: "conservative".to_string(),
            allocation: AllocationMode::RoundRobin,
            content: ContentStrategy::Consistent,
            timing: TimingMode::OffPeak,
            aggressiveness: EngagementLevel::Low,
        });
        registry.register(CoordinationStrategy {
            name: "balanced".to_string(),
            allocation: AllocationMode::LoadBalanced,
            content: ContentStrategy::Varied,
            timing: TimingMode::Staggered,
            aggressiveness: EngagementLevel::Moderate,
        });
        registry.register(CoordinationStrategy {
            name: "aggressive".to_string(),
            allocation: AllocationMode::PlatformSpecialized,
            content: ContentStrategy::Trending,
            timing: TimingMode::Simultaneous,
            aggressiveness: EngagementLevel::High,
        });

        registry
    }

    /// Register or replace a strategy
    pub fn register(&mut self, strategy: CoordinationStrategy) {
        self.strategies.insert(strategy.name.clone(), strategy);
    }

    /// Look up a strategy by name, falling back to the default policy
    pub fn get_or_default(&self, name: &str) -> CoordinationStrategy {
        self.strategies
            .get(name)
            .cloned()
            .unwrap_or_else(CoordinationStrategy::default_strategy)
    }

    /// Look up a strategy by name
    pub fn get(&self, name: &str) -> Option<&CoordinationStrategy> {
        self.strategies.get(name)
    }

    /// Names of all registered strategies
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Activity, DeviceConfig, DeviceId, DevicePlatform, HealthMetrics};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap as StdHashMap;

    fn device(id: &str, cpu: f64, memory: f64, account: bool) -> Device {
        let mut accounts = StdHashMap::new();
        if account {
            accounts.insert(Platform::Tiktok, format!("@{id}"));
        }
        let mut d = Device::from_config(DeviceConfig {
            id: DeviceId::new(id),
            hardware_id: format!("hw-{id}"),
            platform: DevicePlatform::Android,
            supported_platforms: vec![Platform::Tiktok],
            capabilities: vec![Activity::Watch],
            accounts,
        });
        d.health = HealthMetrics::new(80.0, 30.0, cpu, memory);
        d
    }

    #[test]
    fn test_round_robin_rotates_with_offset() {
        let strategy = CoordinationStrategy::default_strategy();
        let devices = vec![
            device("a", 0.0, 0.0, false),
            device("b", 0.0, 0.0, false),
            device("c", 0.0, 0.0, false),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let first = strategy.assign_devices(&devices, Platform::Tiktok, 0, &mut rng);
        let second = strategy.assign_devices(&devices, Platform::Tiktok, 1, &mut rng);

        assert_eq!(first[0].id, DeviceId::new("a"));
        assert_eq!(second[0].id, DeviceId::new("b"));
    }

    #[test]
    fn test_load_balanced_sorts_ascending() {
        let strategy = CoordinationStrategy {
            allocation: AllocationMode::LoadBalanced,
            ..CoordinationStrategy::default_strategy()
        };
        let devices = vec![
            device("hot", 80.0, 70.0, false),
            device("cool", 10.0, 15.0, false),
            device("warm", 40.0, 40.0, false),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let ordered = strategy.assign_devices(&devices, Platform::Tiktok, 0, &mut rng);
        assert_eq!(ordered[0].id, DeviceId::new("cool"));
        assert_eq!(ordered[1].id, DeviceId::new("warm"));
        assert_eq!(ordered[2].id, DeviceId::new("hot"));
    }

    #[test]
    fn test_platform_specialized_prefers_account_holders() {
        let strategy = CoordinationStrategy {
            allocation: AllocationMode::PlatformSpecialized,
            ..CoordinationStrategy::default_strategy()
        };
        let devices = vec![
            device("plain", 0.0, 0.0, false),
            device("holder", 0.0, 0.0, true),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let ordered = strategy.assign_devices(&devices, Platform::Tiktok, 0, &mut rng);
        assert_eq!(ordered[0].id, DeviceId::new("holder"));
    }

    #[test]
    fn test_random_is_seed_deterministic() {
        let strategy = CoordinationStrategy {
            allocation: AllocationMode::Random,
            ..CoordinationStrategy::default_strategy()
        };
        let devices: Vec<Device> = (0..6)
            .map(|i| device(&format!("d{i}"), 0.0, 0.0, false))
            .collect();

        let mut rng_a = ChaCha8Rng::seed_from_u64(99);
        let mut rng_b = ChaCha8Rng::seed_from_u64(99);
        let a = strategy.assign_devices(&devices, Platform::Tiktok, 0, &mut rng_a);
        let b = strategy.assign_devices(&devices, Platform::Tiktok, 0, &mut rng_b);

        let ids_a: Vec<_> = a.iter().map(|d| d.id.clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_post_delay_ranges() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..100 {
            let staggered = TimingMode::Staggered.sample_post_delay(&mut rng);
            assert!(staggered >= Duration::from_millis(30_000));
            assert!(staggered < Duration::from_millis(90_000));

            let off_peak = TimingMode::OffPeak.sample_post_delay(&mut rng);
            assert!(off_peak >= Duration::from_millis(120_000));
            assert!(off_peak < Duration::from_millis(420_000));

            let simultaneous = TimingMode::Simultaneous.sample_post_delay(&mut rng);
            assert!(simultaneous >= Duration::from_millis(10_000));
            assert!(simultaneous < Duration::from_millis(40_000));
        }
    }

    #[test]
    fn test_registry_builtins() {
        let registry = StrategyRegistry::with_builtins();

        assert_eq!(registry.names(), vec!["aggressive", "balanced", "conservative"]);
        assert_eq!(
            registry.get("aggressive").unwrap().allocation,
            AllocationMode::PlatformSpecialized
        );

        // Unknown names fall back to the default policy
        let fallback = registry.get_or_default("nonexistent");
        assert_eq!(fallback.allocation, AllocationMode::RoundRobin);
    }

    #[test]
    fn test_engagement_multipliers() {
        assert!(EngagementLevel::Low.multiplier() < EngagementLevel::Moderate.multiplier());
        assert!(EngagementLevel::Moderate.multiplier() < EngagementLevel::High.multiplier());
    }
}
