//! Device scoring and wait estimation
//!
//! Selection uses a deterministic weighted sum over health, track record,
//! rest time, account fit, and load headroom. The same inputs always yield
//! the same score; ties break toward the lowest device id.

use chrono::{DateTime, Utc};

use crate::registry::{Device, Platform};
use crate::session::Session;

/// Reject threshold for the wait estimate, in minutes
pub const MAX_WAIT_MINS: u64 = 30;

/// Hours of idle time after which a device counts as fully rested
const REST_CAP_HOURS: f64 = 24.0;

// ============================================================================
// Scoring
// ============================================================================

/// Composite suitability score for a device, in [0, 1]
///
/// Factor weights: battery 0.20, thermal headroom 0.15, success rate 0.25,
/// rest time 0.20, platform account assigned 0.10, load headroom 0.10.
pub fn score_device(device: &Device, platform: Platform, now: DateTime<Utc>) -> f64 {
    let battery = device.health.battery_level / 100.0;
    let thermal = ((50.0 - device.health.temperature_c) / 50.0).max(0.0);
    let reliability = device.stats.success_rate / 100.0;
    let rest = (device.stats.hours_since_last_use(now, REST_CAP_HOURS) / REST_CAP_HOURS).min(1.0);
    let account = if device.has_account_for(platform) { 1.0 } else { 0.0 };
    let headroom = ((100.0 - device.health.memory_usage - device.health.cpu_usage) / 200.0).max(0.0);

    0.20 * battery
        + 0.15 * thermal
        + 0.25 * reliability
        + 0.20 * rest
        + 0.10 * account
        + 0.10 * headroom
}

/// Pick the best-scoring candidate
///
/// Ties break toward the lexicographically smallest device id so the choice
/// is deterministic for identical inputs.
pub fn pick_best(
    candidates: &[Device],
    platform: Platform,
    now: DateTime<Utc>,
) -> Option<(&Device, f64)> {
    let mut best: Option<(&Device, f64)> = None;

    for device in candidates {
        let score = score_device(device, platform, now);
        best = match best {
            None => Some((device, score)),
            Some((current, current_score)) => {
                if score > current_score
                    || (score == current_score && device.id < current.id)
                {
                    Some((device, score))
                } else {
                    Some((current, current_score))
                }
            }
        };
    }

    best
}

// ============================================================================
// Wait Estimation
// ============================================================================

/// Shortest remaining time among the given in-flight sessions, in minutes
///
/// Remaining time per session is its expected duration (caller hint or the
/// per-activity average) minus elapsed time, clamped at zero. Returns `None`
/// when there are no sessions to wait on.
pub fn shortest_wait_mins(sessions: &[Session], now: DateTime<Utc>) -> Option<u64> {
    sessions
        .iter()
        .map(|s| s.remaining_secs(now))
        .min()
        .map(|secs| (secs as u64).div_ceil(60))
}

// ============================================================================
// Tests
// ============================================================================
