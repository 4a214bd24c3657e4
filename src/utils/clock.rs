//! Injectable clock for time-dependent code
//!
//! Phase execution waits on real durations in production; tests inject a
//! virtual clock whose sleeps advance instantly, so multi-minute workflows
//! run in milliseconds without changing the code under test.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Clock and sleep abstraction
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for a duration
    async fn sleep(&self, duration: Duration);
}

// ============================================================================
// System Clock
// ============================================================================

/// Wall-clock time and real sleeps
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// Virtual Clock
// ============================================================================

/// Fast-forwarding clock for tests
///
/// `sleep` advances the virtual time by the requested duration and yields
/// once so other tasks get a turn, then returns immediately.
#[derive(Debug)]
pub struct VirtualClock {
    now: Mutex<DateTime<Utc>>,
}

impl VirtualClock {
    /// Create a virtual clock starting at the current wall time
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }

    /// Create a virtual clock starting at a fixed instant
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Manually advance the clock
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero());
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
