//! Content-watching collaborator
//!
//! The watching service drives feed consumption on an allocated device and
//! reports back what the session actually watched. The simulated
//! implementation produces seeded, duration-proportional numbers.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::ServiceError;
use crate::registry::{DeviceId, Platform};

// ============================================================================
// Contract
// ============================================================================

/// Statistics for one watching session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchSessionStats {
    /// Videos watched during the session
    pub videos_watched: u64,

    /// Total watch time in seconds
    pub total_watch_secs: u64,

    /// Likes/comments performed while watching
    pub engagements: u64,
}

/// External content-watching backend
#[async_trait]
pub trait ContentWatchingService: Send + Sync {
    /// Start a watching session on a device; returns the backend session id
    async fn start_session(
        &self,
        platform: Platform,
        profile: &str,
        device_id: &DeviceId,
        duration_mins: u64,
    ) -> Result<String, ServiceError>;

    /// Fetch the statistics of a session
    async fn get_session(&self, session_id: &str) -> Result<WatchSessionStats, ServiceError>;
}

// ============================================================================
// Simulated Implementation
// ============================================================================

struct SimSession {
    duration_mins: u64,
}

/// Seeded simulated watching backend
pub struct SimulatedWatchService {
    sessions: Mutex<HashMap<String, SimSession>>,
    rng: Mutex<ChaCha8Rng>,
}

impl SimulatedWatchService {
    /// Create a simulated service with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl ContentWatchingService for SimulatedWatchService {
    async fn start_session(
        &self,
        platform: Platform,
        profile: &str,
        device_id: &DeviceId,
        duration_mins: u64,
    ) -> Result<String, ServiceError> {
        let session_id = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), SimSession { duration_mins });

        tracing::debug!(
            session = %session_id,
            platform = %platform,
            profile = %profile,
            device = %device_id,
            duration_mins,
            "Watch session started"
        );
        Ok(session_id)
    }

    async fn get_session(&self, session_id: &str) -> Result<WatchSessionStats, ServiceError> {
        let sessions = self.sessions.lock().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| ServiceError::UnknownSession(session_id.to_string()))?;

        let mut rng = self.rng.lock().await;
        let mins = session.duration_mins.max(1);

        // Roughly 2-4 short videos per minute, most of the window spent
        // actually watching
        Ok(WatchSessionStats {
            videos_watched: mins * rng.gen_range(2..5),
            total_watch_secs: (mins * 60 * rng.gen_range(70..96)) / 100,
            engagements: mins * rng.gen_range(0..3),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let service = SimulatedWatchService::new(42);
        let id = service
            .start_session(Platform::Tiktok, "default", &DeviceId::new("d1"), 10)
            .await
            .unwrap();

        let stats = service.get_session(&id).await.unwrap();
        assert!(stats.videos_watched >= 20);
        assert!(stats.total_watch_secs <= 600);
        assert!(stats.total_watch_secs >= 420);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let service = SimulatedWatchService::new(42);
        let result = service.get_session("missing").await;
        assert!(matches!(result, Err(ServiceError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn test_seeded_determinism() {
        let a = SimulatedWatchService::new(7);
        let b = SimulatedWatchService::new(7);

        let id_a = a
            .start_session(Platform::Youtube, "p", &DeviceId::new("d"), 5)
            .await
            .unwrap();
        let id_b = b
            .start_session(Platform::Youtube, "p", &DeviceId::new("d"), 5)
            .await
            .unwrap();

        let stats_a = a.get_session(&id_a).await.unwrap();
        let stats_b = b.get_session(&id_b).await.unwrap();
        assert_eq!(stats_a.videos_watched, stats_b.videos_watched);
        assert_eq!(stats_a.total_watch_secs, stats_b.total_watch_secs);
    }
}
