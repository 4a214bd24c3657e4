//! Session tracking for device allocations
//!
//! A session is the live binding of one granted allocation request to one
//! device. The session manager tracks every session from grant to release
//! and rolls usage statistics back into the device registry. Release is
//! idempotent-guarded: releasing an unknown or already-released session is a
//! logged no-op, never a state corruption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crate::registry::{Activity, DeviceId, DeviceRegistry, Platform, StatsDelta};
use crate::workflow::WorkflowId;

// ============================================================================
// Session Identity
// ============================================================================

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh session id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Live binding of a device to an activity for a bounded window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier
    pub id: SessionId,

    /// Device running the session
    pub device_id: DeviceId,

    /// Target platform
    pub platform: Platform,

    /// Activity being performed
    pub activity: Activity,

    /// Workflow that owns this session, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,

    /// When the session was granted
    pub started_at: DateTime<Utc>,

    /// Expected duration in seconds (caller hint or activity average)
    pub expected_duration_secs: u64,
}

impl Session {
    /// Seconds elapsed since the session started
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    /// Estimated seconds remaining, clamped at zero
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expected_duration_secs as i64 - self.elapsed_secs(now)).max(0)
    }
}

// ============================================================================
// Session Outcome
// ============================================================================

/// Result reported when a session releases
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Whether the activity window completed successfully
    pub success: bool,

    /// Seconds of content watched
    pub watch_secs: u64,

    /// Posts published
    pub posts: u64,

    /// Engagement actions performed
    pub engagements: u64,
}

impl SessionOutcome {
    /// A bare successful outcome with no activity counters
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// A failed outcome
    pub fn failure() -> Self {
        Self::default()
    }
}

impl From<&SessionOutcome> for StatsDelta {
    fn from(outcome: &SessionOutcome) -> Self {
        Self {
            success: outcome.success,
            watch_secs: outcome.watch_secs,
            posts: outcome.posts,
            engagements: outcome.engagements,
        }
    }
}

// ============================================================================
// Session Manager
// ============================================================================

/// Tracks the lifetime of every allocation from grant to release
pub struct SessionManager {
    registry: Arc<DeviceRegistry>,
    sessions: RwLock<HashMap<SessionId, Session>>,
    release_notify: Arc<Notify>,
}

impl SessionManager {
    /// Create a new session manager over a registry
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            sessions: RwLock::new(HashMap::new()),
            release_notify: Arc::new(Notify::new()),
        }
    }

    /// Notifier fired once per successful release
    ///
    /// The allocation scheduler listens on this to re-run its queue.
    pub fn release_notify(&self) -> Arc<Notify> {
        self.release_notify.clone()
    }

    /// Open a session on a device and mark it busy
    ///
    /// The busy mark and the session record are created together; if the
    /// device refuses the grant the record is rolled back.
    pub async fn begin(
        &self,
        device_id: DeviceId,
        platform: Platform,
        activity: Activity,
        workflow_id: Option<WorkflowId>,
        expected_duration_secs: Option<u64>,
    ) -> Result<Session, crate::registry::RegistryError> {
        let session = Session {
            id: SessionId::generate(),
            device_id: device_id.clone(),
            platform,
            activity,
            workflow_id,
            started_at: Utc::now(),
            expected_duration_secs: expected_duration_secs
                .unwrap_or(activity.average_duration_mins() as u64 * 60),
        };

        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());

        if let Err(e) = self.registry.mark_busy(&device_id, session.id).await {
            self.sessions.write().await.remove(&session.id);
            return Err(e);
        }

        tracing::debug!(
            session = %session.id,
            device = %device_id,
            platform = %platform,
            activity = %activity,
            "Session opened"
        );
        Ok(session)
    }

    /// Release a session and fold its outcome into the device statistics
    ///
    /// Returns `false` for an unknown or already-released session id; the
    /// call is then a no-op and nothing is double-counted.
    pub async fn release(&self, session_id: SessionId, outcome: &SessionOutcome) -> bool {
        let session = match self.sessions.write().await.remove(&session_id) {
            Some(session) => session,
            None => {
                tracing::warn!(session = %session_id, "Release of unknown or already-released session ignored");
                return false;
            }
        };

        let delta = StatsDelta::from(outcome);
        if let Err(e) = self.registry.mark_available(&session.device_id, &delta).await {
            // Device was removed mid-session; the stats have nowhere to go
            tracing::warn!(
                session = %session_id,
                device = %session.device_id,
                error = %e,
                "Session released for a device no longer in the pool"
            );
        }

        tracing::debug!(
            session = %session_id,
            device = %session.device_id,
            success = outcome.success,
            "Session released"
        );
        self.release_notify.notify_waiters();
        true
    }

    /// Force-release every session held by a workflow
    ///
    /// Used when a workflow is stopped so its devices never leak. Returns
    /// the number of sessions released.
    pub async fn force_release_workflow(&self, workflow_id: WorkflowId) -> usize {
        let held: Vec<SessionId> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.workflow_id == Some(workflow_id))
            .map(|s| s.id)
            .collect();

        let mut released = 0;
        for id in held {
            if self.release(id, &SessionOutcome::failure()).await {
                released += 1;
            }
        }
        if released > 0 {
            tracing::info!(workflow = %workflow_id, count = released, "Force-released workflow sessions");
        }
        released
    }

    /// Get a session snapshot
    pub async fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Number of active sessions
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Snapshots of all active sessions
    pub async fn active_sessions(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DeviceConfig, DevicePlatform, DeviceStatus};
    use std::collections::HashMap as StdHashMap;

    fn sample_config(id: &str) -> DeviceConfig {
        DeviceConfig {
            id: DeviceId::new(id),
            hardware_id: format!("hw-{id}"),
            platform: DevicePlatform::Android,
            supported_platforms: vec![Platform::Tiktok],
            capabilities: vec![Activity::Watch],
            accounts: StdHashMap::new(),
        }
    }

    async fn setup() -> (Arc<DeviceRegistry>, SessionManager) {
        let registry = Arc::new(DeviceRegistry::new(10));
        registry.add(sample_config("d1")).await.unwrap();
        let sessions = SessionManager::new(registry.clone());
        (registry, sessions)
    }

    #[tokio::test]
    async fn test_begin_marks_device_busy() {
        let (registry, sessions) = setup().await;

        let session = sessions
            .begin(DeviceId::new("d1"), Platform::Tiktok, Activity::Watch, None, None)
            .await
            .unwrap();

        let device = registry.get(&DeviceId::new("d1")).await.unwrap();
        assert_eq!(device.status, DeviceStatus::Busy);
        assert_eq!(device.current_session, Some(session.id));
        assert_eq!(sessions.active_count().await, 1);
        // Watch activity defaults to its 30-minute average
        assert_eq!(session.expected_duration_secs, 1800);
    }

    #[tokio::test]
    async fn test_begin_rolls_back_on_busy_device() {
        let (_registry, sessions) = setup().await;

        sessions
            .begin(DeviceId::new("d1"), Platform::Tiktok, Activity::Watch, None, None)
            .await
            .unwrap();
        let second = sessions
            .begin(DeviceId::new("d1"), Platform::Tiktok, Activity::Watch, None, None)
            .await;

        assert!(second.is_err());
        assert_eq!(sessions.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_release_folds_stats() {
        let (registry, sessions) = setup().await;

        let session = sessions
            .begin(DeviceId::new("d1"), Platform::Tiktok, Activity::Watch, None, None)
            .await
            .unwrap();

        let outcome = SessionOutcome {
            success: true,
            watch_secs: 300,
            posts: 0,
            engagements: 4,
        };
        assert!(sessions.release(session.id, &outcome).await);

        let device = registry.get(&DeviceId::new("d1")).await.unwrap();
        assert_eq!(device.status, DeviceStatus::Available);
        assert_eq!(device.stats.total_watch_secs, 300);
        assert_eq!(device.stats.total_engagements, 4);
        assert!(device.invariant_holds());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (registry, sessions) = setup().await;

        let session = sessions
            .begin(DeviceId::new("d1"), Platform::Tiktok, Activity::Watch, None, None)
            .await
            .unwrap();

        let outcome = SessionOutcome {
            success: true,
            watch_secs: 100,
            ..Default::default()
        };
        assert!(sessions.release(session.id, &outcome).await);
        assert!(!sessions.release(session.id, &outcome).await);

        // The second release did not double-count
        let device = registry.get(&DeviceId::new("d1")).await.unwrap();
        assert_eq!(device.stats.total_watch_secs, 100);
    }

    #[tokio::test]
    async fn test_force_release_workflow() {
        let (registry, sessions) = setup().await;
        registry.add(sample_config("d2")).await.unwrap();

        let wf = WorkflowId::generate();
        sessions
            .begin(DeviceId::new("d1"), Platform::Tiktok, Activity::Watch, Some(wf), None)
            .await
            .unwrap();
        sessions
            .begin(DeviceId::new("d2"), Platform::Tiktok, Activity::Watch, Some(wf), None)
            .await
            .unwrap();

        let released = sessions.force_release_workflow(wf).await;
        assert_eq!(released, 2);
        assert_eq!(sessions.active_count().await, 0);

        for id in ["d1", "d2"] {
            let device = registry.get(&DeviceId::new(id)).await.unwrap();
            assert_eq!(device.status, DeviceStatus::Available);
        }
    }

    #[tokio::test]
    async fn test_session_remaining() {
        let now = Utc::now();
        let session = Session {
            id: SessionId::generate(),
            device_id: DeviceId::new("d1"),
            platform: Platform::Tiktok,
            activity: Activity::Post,
            workflow_id: None,
            started_at: now - chrono::Duration::seconds(120),
            expected_duration_secs: 300,
        };

        assert_eq!(session.elapsed_secs(now), 120);
        assert_eq!(session.remaining_secs(now), 180);

        let long_past = now + chrono::Duration::seconds(600);
        assert_eq!(session.remaining_secs(long_past), 0);
    }
}
