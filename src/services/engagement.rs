//! Engagement collaborator
//!
//! Runs like/comment/follow activity on a device for a bounded window. Only
//! the contract is specified; the simulated implementation scales seeded
//! counts by duration and aggressiveness.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::ServiceError;
use crate::registry::{DeviceId, Platform};
use crate::workflow::EngagementLevel;

// ============================================================================
// Contract
// ============================================================================

/// Counts produced by one engagement window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngagementSummary {
    pub likes: u64,
    pub comments: u64,
    pub follows: u64,
}

impl EngagementSummary {
    /// Total engagement actions
    pub fn total(&self) -> u64 {
        self.likes + self.comments + self.follows
    }
}

/// External engagement backend
#[async_trait]
pub trait EngagementService: Send + Sync {
    /// Run engagement on a device for the given window
    async fn run_engagement(
        &self,
        platform: Platform,
        device_id: &DeviceId,
        duration_secs: u64,
        level: EngagementLevel,
    ) -> Result<EngagementSummary, ServiceError>;
}

// ============================================================================
// Simulated Implementation
// ============================================================================

/// Seeded simulated engagement backend
pub struct SimulatedEngagementService {
    rng: Mutex<ChaCha8Rng>,
}

impl SimulatedEngagementService {
    /// Create a simulated service with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl EngagementService for SimulatedEngagementService {
    async fn run_engagement(
        &self,
        platform: Platform,
        device_id: &DeviceId,
        duration_secs: u64,
        level: EngagementLevel,
    ) -> Result<EngagementSummary, ServiceError> {
        let mut rng = self.rng.lock().await;
        let mins = (duration_secs / 60).max(1) as f64;
        let scale = mins * level.multiplier();

        let summary = EngagementSummary {
            likes: (scale * rng.gen_range(2.0..6.0)) as u64,
            comments: (scale * rng.gen_range(0.2..1.0)) as u64,
            follows: (scale * rng.gen_range(0.1..0.5)) as u64,
        };

        tracing::debug!(
            platform = %platform,
            device = %device_id,
            duration_secs,
            total = summary.total(),
            "Engagement window finished"
        );
        Ok(summary)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_aggressiveness_scales_volume() {
        let low_service = SimulatedEngagementService::new(9);
        let high_service = SimulatedEngagementService::new(9);
        let id = DeviceId::new("d1");

        let low = low_service
            .run_engagement(Platform::Tiktok, &id, 600, EngagementLevel::Low)
            .await
            .unwrap();
        let high = high_service
            .run_engagement(Platform::Tiktok, &id, 600, EngagementLevel::High)
            .await
            .unwrap();

        // Same seed, same draws: the only difference is the multiplier
        assert!(high.total() > low.total());
    }

    #[tokio::test]
    async fn test_short_windows_still_engage() {
        let service = SimulatedEngagementService::new(2);
        let summary = service
            .run_engagement(
                Platform::Instagram,
                &DeviceId::new("d1"),
                30,
                EngagementLevel::Moderate,
            )
            .await
            .unwrap();
        assert!(summary.likes >= 2);
    }
}
