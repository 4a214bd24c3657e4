//! Device health probes
//!
//! The probe is the external collaborator that reads battery, temperature,
//! CPU and memory from a device. The default implementation simulates a
//! fleet with seeded, reproducible drift so tests and demos behave the same
//! on every run.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::registry::{DeviceId, HealthMetrics};

// ============================================================================
// Probe Contract
// ============================================================================

/// Errors a health probe can report
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// Device did not respond
    #[error("Device unreachable: {0}")]
    Unreachable(DeviceId),

    /// Probe timed out
    #[error("Health probe timed out for {0}")]
    Timeout(DeviceId),
}

/// External health-probe collaborator
#[async_trait]
pub trait DeviceHealthProbe: Send + Sync {
    /// Read current health metrics from a device
    async fn query(&self, device_id: &DeviceId) -> Result<HealthMetrics, ProbeError>;
}

// ============================================================================
// Simulated Probe
// ============================================================================

/// Per-device drift state for the simulated probe
#[derive(Debug, Clone)]
struct SimState {
    battery: f64,
    temperature: f64,
    cpu: f64,
    memory: f64,
    charging: bool,
}

/// Seeded simulated health probe
///
/// Batteries drain steadily and swap onto a charger when empty, so the pool
/// naturally exercises offline and recovery transitions. The same seed
/// always produces the same reading sequence.
pub struct SimulatedHealthProbe {
    seed: u64,
    failure_rate: f64,
    state: Mutex<HashMap<DeviceId, SimState>>,
    rng: Mutex<ChaCha8Rng>,
}

impl SimulatedHealthProbe {
    /// Create a probe with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            failure_rate: 0.0,
            state: Mutex::new(HashMap::new()),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    /// Fail a fraction of probes (0.0 - 1.0), for exercising error handling
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    // Initial state derived from the seed and the device id, so each
    // device starts at a distinct but reproducible point
    fn initial_state(&self, device_id: &DeviceId) -> SimState {
        let id_fold = device_id
            .as_str()
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ id_fold);

        SimState {
            battery: rng.gen_range(55.0..100.0),
            temperature: rng.gen_range(22.0..34.0),
            cpu: rng.gen_range(5.0..40.0),
            memory: rng.gen_range(20.0..60.0),
            charging: false,
        }
    }
}

#[async_trait]
impl DeviceHealthProbe for SimulatedHealthProbe {
    async fn query(&self, device_id: &DeviceId) -> Result<HealthMetrics, ProbeError> {
        let mut rng = self.rng.lock().await;

        if self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate) {
            return Err(ProbeError::Unreachable(device_id.clone()));
        }

        let mut state = self.state.lock().await;
        let sim = state
            .entry(device_id.clone())
            .or_insert_with(|| self.initial_state(device_id));

        if sim.charging {
            sim.battery = (sim.battery + rng.gen_range(8.0..15.0)).min(100.0);
            if sim.battery >= 80.0 {
                sim.charging = false;
            }
        } else {
            sim.battery = (sim.battery - rng.gen_range(0.5..3.0)).max(0.0);
            if sim.battery <= 0.0 {
                sim.charging = true;
            }
        }

        sim.temperature = (sim.temperature + rng.gen_range(-1.5..1.8)).clamp(18.0, 55.0);
        sim.cpu = (sim.cpu + rng.gen_range(-10.0..10.0)).clamp(0.0, 100.0);
        sim.memory = (sim.memory + rng.gen_range(-5.0..5.0)).clamp(5.0, 95.0);

        Ok(HealthMetrics::new(
            sim.battery,
            sim.temperature,
            sim.cpu,
            sim.memory,
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
