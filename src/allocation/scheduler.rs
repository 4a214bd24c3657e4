//! Allocation scheduler
//!
//! Arbitrates concurrent demand for the device pool. Pending requests sit in
//! a priority queue; a scheduling pass runs on every submission, on every
//! release, and on a bounded polling tick. Each pass visits requests in
//! (priority, submission time) order and either grants a device, leaves the
//! request queued, or rejects it with a wait estimate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify, RwLock};

use super::error::{AllocationError, AllocationResult};
use super::request::{AllocationRequest, Grant};
use super::scoring::{pick_best, shortest_wait_mins, MAX_WAIT_MINS};
use crate::registry::DeviceRegistry;
use crate::session::{Session, SessionId, SessionManager, SessionOutcome};
use crate::workflow::WorkflowId;

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Configuration for the allocation scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Polling tick interval in seconds
    ///
    /// Bounds how long an expired or newly satisfiable request can sit
    /// unnoticed when no release happens.
    pub tick_interval_secs: u64,

    /// Default queue wait bound for requests that do not set their own
    pub default_queue_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            default_queue_timeout_secs: MAX_WAIT_MINS * 60,
        }
    }
}

// ============================================================================
// Pending Request
// ============================================================================

struct PendingRequest {
    request: AllocationRequest,
    workflow_id: Option<WorkflowId>,
    submitted_at: DateTime<Utc>,
    responder: oneshot::Sender<AllocationResult<Grant>>,
}

// ============================================================================
// Allocation Scheduler
// ============================================================================

/// Priority-queue scheduler binding requests to pool devices
pub struct AllocationScheduler {
    registry: Arc<DeviceRegistry>,
    sessions: Arc<SessionManager>,
    queue: Mutex<Vec<PendingRequest>>,
    submit_notify: Notify,
    config: SchedulerConfig,
    is_running: RwLock<bool>,
}

impl AllocationScheduler {
    /// Create a new scheduler
    pub fn new(
        registry: Arc<DeviceRegistry>,
        sessions: Arc<SessionManager>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            sessions,
            queue: Mutex::new(Vec::new()),
            submit_notify: Notify::new(),
            config,
            is_running: RwLock::new(false),
        }
    }

    /// Create with default config
    pub fn with_defaults(registry: Arc<DeviceRegistry>, sessions: Arc<SessionManager>) -> Self {
        Self::new(registry, sessions, SchedulerConfig::default())
    }

    /// Request a device from the pool
    ///
    /// Suspends until a device is granted, the request is rejected, or its
    /// queue wait bound elapses. Dropping the returned future abandons the
    /// request; the next scheduling pass discards it.
    pub async fn allocate(&self, request: AllocationRequest) -> AllocationResult<Grant> {
        self.allocate_for(request, None).await
    }

    /// Request a device on behalf of a workflow
    pub async fn allocate_for(
        &self,
        request: AllocationRequest,
        workflow_id: Option<WorkflowId>,
    ) -> AllocationResult<Grant> {
        let receiver = self.submit(request, workflow_id).await?;
        self.submit_notify.notify_one();
        receiver.await.map_err(|_| AllocationError::SchedulerClosed)?
    }

    /// Release a granted session and re-run the queue
    ///
    /// Returns `false` for an unknown or already-released session id.
    pub async fn release(&self, session_id: SessionId, outcome: &SessionOutcome) -> bool {
        let released = self.sessions.release(session_id, outcome).await;
        if released {
            self.run_scheduling_pass().await;
        }
        released
    }

    /// Number of requests currently queued
    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Run the scheduler loop until stopped
    ///
    /// Passes run on submissions, on releases (including releases performed
    /// directly through the session manager), and on the polling tick.
    pub async fn start(&self) {
        *self.is_running.write().await = true;
        let release_notify = self.sessions.release_notify();
        let tick = std::time::Duration::from_secs(self.config.tick_interval_secs);

        tracing::info!(
            tick_secs = self.config.tick_interval_secs,
            "Allocation scheduler started"
        );

        while *self.is_running.read().await {
            tokio::select! {
                _ = self.submit_notify.notified() => {}
                _ = release_notify.notified() => {}
                _ = tokio::time::sleep(tick) => {}
            }
            self.run_scheduling_pass().await;
        }

        // Drain the queue so suspended callers do not hang forever
        let mut queue = self.queue.lock().await;
        for pending in queue.drain(..) {
            let _ = pending.responder.send(Err(AllocationError::SchedulerClosed));
        }
        tracing::info!("Allocation scheduler stopped");
    }

    /// Stop the scheduler loop
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
        self.submit_notify.notify_one();
    }

    /// Check if the loop is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Run one scheduling pass over the pending queue
    ///
    /// Public so callers that drive the scheduler without the background
    /// loop (tests, single-shot tools) can advance it deterministically.
    pub async fn run_scheduling_pass(&self) {
        let mut queue = self.queue.lock().await;

        // Abandoned requests (caller dropped the future) are discarded
        queue.retain(|p| !p.responder.is_closed());

        // Priority order, FIFO within a priority level
        queue.sort_by(|a, b| {
            b.request
                .priority
                .cmp(&a.request.priority)
                .then(a.submitted_at.cmp(&b.submitted_at))
        });

        let now = Utc::now();
        let mut still_queued = Vec::new();

        for pending in queue.drain(..) {
            match self.try_place(&pending).await {
                Some(grant) => {
                    tracing::info!(
                        session = %grant.session.id,
                        device = %grant.session.device_id,
                        platform = %pending.request.platform,
                        score = grant.score,
                        "Allocation granted"
                    );
                    let _ = pending.responder.send(Ok(grant));
                }
                None => {
                    let estimate = self.estimate_wait_mins(&pending.request, now).await;
                    let timeout = Duration::seconds(
                        pending
                            .request
                            .queue_timeout_secs
                            .unwrap_or(self.config.default_queue_timeout_secs)
                            as i64,
                    );
                    let expired = now - pending.submitted_at >= timeout;
                    let hopeless = match estimate {
                        Some(mins) => mins > MAX_WAIT_MINS,
                        None => true,
                    };

                    if hopeless || expired {
                        tracing::warn!(
                            platform = %pending.request.platform,
                            activity = %pending.request.activity,
                            estimate_mins = ?estimate,
                            expired,
                            "Allocation rejected"
                        );
                        let _ = pending.responder.send(Err(
                            AllocationError::NoDeviceAvailable {
                                estimated_wait_mins: estimate,
                            },
                        ));
                    } else {
                        still_queued.push(pending);
                    }
                }
            }
        }

        *queue = still_queued;
    }

    // Internal: validate and enqueue a request
    async fn submit(
        &self,
        request: AllocationRequest,
        workflow_id: Option<WorkflowId>,
    ) -> AllocationResult<oneshot::Receiver<AllocationResult<Grant>>> {
        // Requests no device could ever serve are rejected synchronously,
        // never queued
        if !self
            .registry
            .any_device_covers(request.platform, request.activity)
            .await
        {
            return Err(AllocationError::invalid_request(
                request.platform,
                request.activity,
            ));
        }

        let (responder, receiver) = oneshot::channel();
        self.queue.lock().await.push(PendingRequest {
            request,
            workflow_id,
            submitted_at: Utc::now(),
            responder,
        });
        Ok(receiver)
    }

    // Internal: attempt to bind the best available device to a request
    async fn try_place(&self, pending: &PendingRequest) -> Option<Grant> {
        let mut candidates = self
            .registry
            .find_candidates(
                pending.request.platform,
                pending.request.activity,
                &pending.request.constraints,
            )
            .await;

        let now = Utc::now();
        while !candidates.is_empty() {
            let (best, score) = pick_best(&candidates, pending.request.platform, now)?;
            let device_id = best.id.clone();

            match self
                .sessions
                .begin(
                    device_id.clone(),
                    pending.request.platform,
                    pending.request.activity,
                    pending.workflow_id,
                    pending.request.duration_hint_secs,
                )
                .await
            {
                Ok(session) => {
                    return Some(Grant {
                        session,
                        score,
                        submitted_at: pending.submitted_at,
                    });
                }
                Err(_) => {
                    // Lost a race for this device; try the next best
                    candidates.retain(|d| d.id != device_id);
                }
            }
        }

        None
    }

    // Internal: estimate minutes until a covering busy device frees up
    async fn estimate_wait_mins(
        &self,
        request: &AllocationRequest,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let busy = self
            .registry
            .busy_devices_covering(request.platform, request.activity)
            .await;

        let mut in_flight: Vec<Session> = Vec::with_capacity(busy.len());
        for device in busy {
            if let Some(session_id) = device.current_session {
                if let Some(session) = self.sessions.get(session_id).await {
                    in_flight.push(session);
                }
            }
        }

        shortest_wait_mins(&in_flight, now)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        Activity, AllocationConstraints, DeviceConfig, DeviceId, DevicePlatform, DeviceStatus,
        HealthMetrics, Platform,
    };
    use crate::allocation::request::RequestPriority;
    use std::collections::HashMap;

    fn config(id: &str, platforms: Vec<Platform>) -> DeviceConfig {
        DeviceConfig {
            id: DeviceId::new(id),
            hardware_id: format!("hw-{id}"),
            platform: DevicePlatform::Android,
            supported_platforms: platforms,
            capabilities: vec![Activity::Watch, Activity::Post, Activity::Engage],
            accounts: HashMap::new(),
        }
    }

    async fn setup(devices: &[&str]) -> (Arc<DeviceRegistry>, Arc<SessionManager>, Arc<AllocationScheduler>) {
        let registry = Arc::new(DeviceRegistry::new(16));
        for id in devices {
            registry.add(config(id, vec![Platform::Tiktok, Platform::Youtube])).await.unwrap();
        }
        let sessions = Arc::new(SessionManager::new(registry.clone()));
        let scheduler = Arc::new(AllocationScheduler::with_defaults(
            registry.clone(),
            sessions.clone(),
        ));
        (registry, sessions, scheduler)
    }

    #[tokio::test]
    async fn test_grant_on_pass() {
        let (registry, _sessions, scheduler) = setup(&["d1"]).await;

        let rx = scheduler
            .submit(AllocationRequest::new(Platform::Tiktok, Activity::Watch), None)
            .await
            .unwrap();
        scheduler.run_scheduling_pass().await;

        let grant = rx.await.unwrap().unwrap();
        assert_eq!(grant.session.device_id, DeviceId::new("d1"));

        let device = registry.get(&DeviceId::new("d1")).await.unwrap();
        assert_eq!(device.status, DeviceStatus::Busy);
        assert!(device.invariant_holds());
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_synchronously() {
        let (_registry, _sessions, scheduler) = setup(&["d1"]).await;

        // No device supports instagram
        let result = scheduler
            .submit(AllocationRequest::new(Platform::Instagram, Activity::Watch), None)
            .await;
        assert!(matches!(result, Err(AllocationError::InvalidRequest { .. })));
        assert_eq!(scheduler.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_high_priority_granted_first() {
        let (_registry, _sessions, scheduler) = setup(&["d1"]).await;

        // Low submitted before high, both pending in the same tick
        let low_rx = scheduler
            .submit(
                AllocationRequest::new(Platform::Tiktok, Activity::Watch)
                    .with_priority(RequestPriority::Low),
                None,
            )
            .await
            .unwrap();
        let high_rx = scheduler
            .submit(
                AllocationRequest::new(Platform::Tiktok, Activity::Watch)
                    .with_priority(RequestPriority::High),
                None,
            )
            .await
            .unwrap();

        scheduler.run_scheduling_pass().await;

        let high_grant = high_rx.await.unwrap().unwrap();
        assert_eq!(high_grant.session.device_id, DeviceId::new("d1"));

        // Low is still waiting; after release it gets the device
        assert_eq!(scheduler.queue_len().await, 1);
        assert!(
            scheduler
                .release(high_grant.session.id, &SessionOutcome::success())
                .await
        );
        let low_grant = low_rx.await.unwrap().unwrap();
        assert_eq!(low_grant.session.device_id, DeviceId::new("d1"));
    }

    #[tokio::test]
    async fn test_wait_estimate_rejects_with_zero_timeout() {
        let (_registry, sessions, scheduler) = setup(&["d1"]).await;

        // Occupy the only device with a watch session (30 min expected)
        sessions
            .begin(DeviceId::new("d1"), Platform::Youtube, Activity::Watch, None, None)
            .await
            .unwrap();

        let rx = scheduler
            .submit(
                AllocationRequest::new(Platform::Youtube, Activity::Watch)
                    .with_queue_timeout_secs(0),
                None,
            )
            .await
            .unwrap();
        scheduler.run_scheduling_pass().await;

        match rx.await.unwrap() {
            Err(AllocationError::NoDeviceAvailable { estimated_wait_mins }) => {
                let mins = estimated_wait_mins.unwrap();
                assert!(mins <= MAX_WAIT_MINS, "estimate {mins} should be within bound");
            }
            other => panic!("Expected NoDeviceAvailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_long_running_session_rejects_immediately() {
        let (_registry, sessions, scheduler) = setup(&["d1"]).await;

        // Three-hour session: estimate is far over the 30-minute threshold
        sessions
            .begin(
                DeviceId::new("d1"),
                Platform::Tiktok,
                Activity::Watch,
                None,
                Some(3 * 3600),
            )
            .await
            .unwrap();

        let rx = scheduler
            .submit(AllocationRequest::new(Platform::Tiktok, Activity::Watch), None)
            .await
            .unwrap();
        scheduler.run_scheduling_pass().await;

        match rx.await.unwrap() {
            Err(AllocationError::NoDeviceAvailable { estimated_wait_mins }) => {
                assert!(estimated_wait_mins.unwrap() > MAX_WAIT_MINS);
            }
            other => panic!("Expected NoDeviceAvailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_stays_queued_within_bound() {
        let (_registry, sessions, scheduler) = setup(&["d1"]).await;

        // Short post session on the only device
        let held = sessions
            .begin(DeviceId::new("d1"), Platform::Tiktok, Activity::Post, None, None)
            .await
            .unwrap();

        let rx = scheduler
            .submit(AllocationRequest::new(Platform::Tiktok, Activity::Watch), None)
            .await
            .unwrap();
        scheduler.run_scheduling_pass().await;

        // Estimate ~5 min: within bound, so it stays queued
        assert_eq!(scheduler.queue_len().await, 1);

        scheduler.release(held.id, &SessionOutcome::success()).await;
        let grant = rx.await.unwrap().unwrap();
        assert_eq!(grant.session.device_id, DeviceId::new("d1"));
    }

    #[tokio::test]
    async fn test_constraints_respected() {
        let (registry, _sessions, scheduler) = setup(&["d1", "d2"]).await;

        registry
            .update_health(&DeviceId::new("d1"), HealthMetrics::new(15.0, 25.0, 5.0, 10.0))
            .await
            .unwrap();

        let rx = scheduler
            .submit(
                AllocationRequest::new(Platform::Tiktok, Activity::Watch).with_constraints(
                    AllocationConstraints {
                        min_battery: Some(50.0),
                        ..Default::default()
                    },
                ),
                None,
            )
            .await
            .unwrap();
        scheduler.run_scheduling_pass().await;

        let grant = rx.await.unwrap().unwrap();
        assert_eq!(grant.session.device_id, DeviceId::new("d2"));
    }

    #[tokio::test]
    async fn test_specific_device_constraint() {
        let (_registry, _sessions, scheduler) = setup(&["d1", "d2"]).await;

        let rx = scheduler
            .submit(
                AllocationRequest::new(Platform::Tiktok, Activity::Watch).with_constraints(
                    AllocationConstraints {
                        device_id: Some(DeviceId::new("d2")),
                        ..Default::default()
                    },
                ),
                None,
            )
            .await
            .unwrap();
        scheduler.run_scheduling_pass().await;

        let grant = rx.await.unwrap().unwrap();
        assert_eq!(grant.session.device_id, DeviceId::new("d2"));
    }

    #[tokio::test]
    async fn test_abandoned_request_discarded() {
        let (_registry, sessions, scheduler) = setup(&["d1"]).await;

        // Occupy the device so the request queues
        sessions
            .begin(DeviceId::new("d1"), Platform::Tiktok, Activity::Post, None, None)
            .await
            .unwrap();

        let rx = scheduler
            .submit(AllocationRequest::new(Platform::Tiktok, Activity::Watch), None)
            .await
            .unwrap();
        scheduler.run_scheduling_pass().await;
        assert_eq!(scheduler.queue_len().await, 1);

        // Caller walks away
        drop(rx);
        scheduler.run_scheduling_pass().await;
        assert_eq!(scheduler.queue_len().await, 0);
    }
}
