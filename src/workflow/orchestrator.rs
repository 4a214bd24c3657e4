//! Multi-device workflow orchestration
//!
//! Drives workflows through their phase lists on dedicated tasks: watch
//! phases allocate devices through the scheduler, post phases pace account
//! posts by the strategy's timing mode, engage phases delegate to the
//! engagement backend, analyze phases persist report snapshots. Control is a
//! per-workflow signal channel: pause halts between phases, stop cancels
//! in-flight waits and force-releases every session the workflow holds.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};

use super::error::{WorkflowError, WorkflowResult};
use super::model::{
    PhaseKind, ScheduleWindow, Workflow, WorkflowConfig, WorkflowId, WorkflowPhase,
    WorkflowReport, WorkflowStatus,
};
use super::strategy::{CoordinationStrategy, StrategyRegistry, TimingMode};
use crate::allocation::{AllocationRequest, AllocationScheduler, Grant};
use crate::registry::{
    Activity, AllocationConstraints, Device, DeviceId, DeviceRegistry, Platform,
};
use crate::services::{Collaborators, PostContent};
use crate::session::{SessionId, SessionManager, SessionOutcome};
use crate::utils::Clock;

// ============================================================================
// Orchestrator Configuration
// ============================================================================

/// Configuration for the workflow orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pause between consecutive phases, in seconds
    pub inter_phase_pause_secs: u64,

    /// Seed for timing jitter and device shuffling
    pub seed: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inter_phase_pause_secs: 30,
            seed: 0,
        }
    }
}

// ============================================================================
// Control Signals & Events
// ============================================================================

/// Control signal delivered to a running workflow task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowSignal {
    Run,
    Pause,
    Stop,
}

/// Events emitted as workflows progress
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    Started { id: WorkflowId },
    PhaseStarted { id: WorkflowId, index: usize, kind: PhaseKind },
    PhaseCompleted { id: WorkflowId, index: usize },
    Completed { id: WorkflowId },
    Failed { id: WorkflowId, error: String },
    Paused { id: WorkflowId },
    Resumed { id: WorkflowId },
    Stopped { id: WorkflowId },
}

// ============================================================================
// Facade Inputs/Outputs
// ============================================================================

/// Input for the one-shot content-watching operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRunConfig {
    /// Platforms to watch on
    pub platforms: Vec<Platform>,

    /// Watch window in minutes
    pub duration_mins: u64,

    /// Feed profile passed to the watching backend
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Devices to use; empty means every watch-capable device
    #[serde(default)]
    pub device_ids: Vec<DeviceId>,

    /// Strategy name
    #[serde(default = "default_strategy_name")]
    pub strategy: String,
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_strategy_name() -> String {
    "balanced".to_string()
}

/// Result of launching a content-watching run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRunLaunch {
    pub workflow_id: WorkflowId,
    pub session_ids: Vec<SessionId>,
}

/// Input for the coordinated posting operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingRunConfig {
    /// Platforms to post on
    pub platforms: Vec<Platform>,

    /// Media asset reference
    pub media_url: String,

    /// Caption text
    pub caption: String,

    /// Hashtags without the leading '#'
    #[serde(default)]
    pub tags: Vec<String>,

    /// Strategy name (controls inter-post pacing)
    #[serde(default = "default_strategy_name")]
    pub strategy: String,
}

/// One post attempt in a coordinated run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostOutcome {
    pub platform: Platform,
    pub account: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Internal State
// ============================================================================

struct WorkflowEntry {
    workflow: Workflow,
    control: Option<watch::Sender<WorkflowSignal>>,
}

/// Per-phase counters folded into workflow statistics
#[derive(Debug, Default, Clone, Copy)]
struct PhaseTotals {
    watch_secs: u64,
    posts: u64,
    engagements: u64,
}

enum PhaseEnd {
    Completed(PhaseTotals),
    Stopped,
}

// ============================================================================
// Workflow Orchestrator
// ============================================================================

/// Executes workflows over the device pool
///
/// Cheap to clone: the workflow table and collaborators sit behind shared
/// handles, so per-workflow tasks carry their own clone.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    registry: Arc<DeviceRegistry>,
    scheduler: Arc<AllocationScheduler>,
    sessions: Arc<SessionManager>,
    collaborators: Collaborators,
    strategies: StrategyRegistry,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    workflows: Arc<RwLock<HashMap<WorkflowId, WorkflowEntry>>>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        registry: Arc<DeviceRegistry>,
        scheduler: Arc<AllocationScheduler>,
        sessions: Arc<SessionManager>,
        collaborators: Collaborators,
        strategies: StrategyRegistry,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            registry,
            scheduler,
            sessions,
            collaborators,
            strategies,
            clock,
            config,
            workflows: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Subscribe to workflow events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Load persisted workflow definitions
    ///
    /// Workflows that were running or paused when the process died come
    /// back as scheduled; their sessions were lost with the process.
    pub async fn load_persisted(&self) -> WorkflowResult<usize> {
        let stored = self.collaborators.configs.load().await?;
        let count = stored.len();

        let mut workflows = self.workflows.write().await;
        for mut workflow in stored {
            if matches!(
                workflow.status,
                WorkflowStatus::Running | WorkflowStatus::Paused
            ) {
                workflow.status = WorkflowStatus::Scheduled;
            }
            workflows.insert(
                workflow.id,
                WorkflowEntry {
                    workflow,
                    control: None,
                },
            );
        }

        if count > 0 {
            tracing::info!(count, "Loaded persisted workflows");
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Create a workflow; returns its id
    pub async fn create_workflow(&self, config: WorkflowConfig) -> WorkflowResult<WorkflowId> {
        if config.name.trim().is_empty() {
            return Err(WorkflowError::InvalidConfig("name is empty".to_string()));
        }
        if config.phases.is_empty() {
            return Err(WorkflowError::InvalidConfig("no phases".to_string()));
        }
        if config.platforms.is_empty() {
            return Err(WorkflowError::InvalidConfig("no platforms".to_string()));
        }
        if config.device_ids.is_empty() {
            return Err(WorkflowError::InvalidConfig("no devices".to_string()));
        }
        for id in &config.device_ids {
            if self.registry.get(id).await.is_none() {
                return Err(WorkflowError::InvalidConfig(format!(
                    "unknown device: {id}"
                )));
            }
        }
        if self.strategies.get(&config.strategy).is_none() {
            tracing::warn!(strategy = %config.strategy, "Unknown strategy, using default policy");
        }

        let workflow = Workflow::from_config(config);
        let id = workflow.id;
        self.collaborators.configs.save(&workflow).await?;
        self.workflows.write().await.insert(
            id,
            WorkflowEntry {
                workflow,
                control: None,
            },
        );

        tracing::info!(workflow = %id, "Workflow created");
        Ok(id)
    }

    /// Start a scheduled workflow on its own task
    pub async fn start_workflow(&self, id: WorkflowId) -> WorkflowResult<()> {
        let receiver = {
            let mut workflows = self.workflows.write().await;
            let entry = workflows
                .get_mut(&id)
                .ok_or(WorkflowError::NotFound(id))?;

            if entry.workflow.status != WorkflowStatus::Scheduled {
                return Err(WorkflowError::InvalidTransition {
                    id,
                    status: entry.workflow.status,
                    action: "start",
                });
            }

            let (sender, receiver) = watch::channel(WorkflowSignal::Run);
            entry.workflow.status = WorkflowStatus::Running;
            entry.workflow.stats.next_run = None;
            entry.workflow.updated_at = self.clock.now();
            entry.control = Some(sender);
            receiver
        };

        self.persist(id).await;
        let _ = self.events.send(WorkflowEvent::Started { id });
        tracing::info!(workflow = %id, "Workflow started");

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run_workflow(id, receiver).await;
        });
        Ok(())
    }

    /// Pause a running workflow between phases
    ///
    /// The phase in flight is not interrupted; progression halts before
    /// the next phase.
    pub async fn pause_workflow(&self, id: WorkflowId) -> bool {
        let mut workflows = self.workflows.write().await;
        let Some(entry) = workflows.get_mut(&id) else {
            return false;
        };
        if entry.workflow.status != WorkflowStatus::Running {
            return false;
        }
        if let Some(control) = &entry.control {
            let _ = control.send(WorkflowSignal::Pause);
        }
        entry.workflow.status = WorkflowStatus::Paused;
        entry.workflow.updated_at = self.clock.now();
        drop(workflows);

        let _ = self.events.send(WorkflowEvent::Paused { id });
        tracing::info!(workflow = %id, "Workflow paused");
        true
    }

    /// Resume a paused workflow
    pub async fn resume_workflow(&self, id: WorkflowId) -> bool {
        let mut workflows = self.workflows.write().await;
        let Some(entry) = workflows.get_mut(&id) else {
            return false;
        };
        if entry.workflow.status != WorkflowStatus::Paused {
            return false;
        }
        if let Some(control) = &entry.control {
            let _ = control.send(WorkflowSignal::Run);
        }
        entry.workflow.status = WorkflowStatus::Running;
        entry.workflow.updated_at = self.clock.now();
        drop(workflows);

        let _ = self.events.send(WorkflowEvent::Resumed { id });
        tracing::info!(workflow = %id, "Workflow resumed");
        true
    }

    /// Stop a workflow
    ///
    /// Cancels pending phase waits and force-releases every session the
    /// workflow holds, so no device leaks.
    pub async fn stop_workflow(&self, id: WorkflowId) -> bool {
        let had_task = {
            let mut workflows = self.workflows.write().await;
            let Some(entry) = workflows.get_mut(&id) else {
                return false;
            };
            if entry.workflow.status.is_terminal() {
                return false;
            }
            match &entry.control {
                Some(control) => {
                    let _ = control.send(WorkflowSignal::Stop);
                    true
                }
                None => {
                    // Never started; archive it directly
                    entry.workflow.status = WorkflowStatus::Completed;
                    entry.workflow.updated_at = self.clock.now();
                    false
                }
            }
        };

        if !had_task {
            self.persist(id).await;
            let _ = self.events.send(WorkflowEvent::Stopped { id });
        }
        // A running task observes the signal, releases its sessions and
        // finalizes the record; releasing here as well is a no-op guard
        self.sessions.force_release_workflow(id).await;
        tracing::info!(workflow = %id, "Workflow stop requested");
        true
    }

    /// Get a workflow snapshot
    pub async fn get_workflow(&self, id: WorkflowId) -> Option<Workflow> {
        self.workflows
            .read()
            .await
            .get(&id)
            .map(|e| e.workflow.clone())
    }

    /// List all workflows, oldest first
    pub async fn list_workflows(&self) -> Vec<Workflow> {
        let mut list: Vec<Workflow> = self
            .workflows
            .read()
            .await
            .values()
            .map(|e| e.workflow.clone())
            .collect();
        list.sort_by_key(|w| w.created_at);
        list
    }

    /// Flip eligible completed repeat-daily workflows back to scheduled
    ///
    /// Returns the ids that were rescheduled.
    pub async fn refresh_schedules(&self) -> Vec<WorkflowId> {
        let now = self.clock.now();
        let mut flipped = Vec::new();
        {
            let mut workflows = self.workflows.write().await;
            for entry in workflows.values_mut() {
                if entry.workflow.maybe_reschedule(now) {
                    flipped.push(entry.workflow.id);
                }
            }
        }
        for id in &flipped {
            self.persist(*id).await;
            tracing::info!(workflow = %id, "Workflow rescheduled for next daily run");
        }
        flipped
    }

    /// Start scheduled workflows whose run time has arrived
    pub async fn start_due_workflows(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<WorkflowId> = self
            .workflows
            .read()
            .await
            .values()
            .filter(|e| {
                e.workflow.status == WorkflowStatus::Scheduled
                    && e.control.is_none()
                    && e.workflow
                        .stats
                        .next_run
                        .unwrap_or(e.workflow.schedule.start)
                        <= now
            })
            .map(|e| e.workflow.id)
            .collect();

        let mut started = 0;
        for id in due {
            match self.start_workflow(id).await {
                Ok(()) => started += 1,
                Err(e) => tracing::warn!(workflow = %id, error = %e, "Failed to start due workflow"),
            }
        }
        started
    }

    // ------------------------------------------------------------------
    // One-shot facade operations
    // ------------------------------------------------------------------

    /// Launch a one-shot content-watching run and return its session ids
    pub async fn start_content_watching(
        &self,
        config: WatchRunConfig,
    ) -> WorkflowResult<WatchRunLaunch> {
        if config.platforms.is_empty() {
            return Err(WorkflowError::InvalidConfig("no platforms".to_string()));
        }

        let device_ids = if config.device_ids.is_empty() {
            self.registry
                .list(None)
                .await
                .into_iter()
                .filter(|d| d.supports_activity(Activity::Watch))
                .map(|d| d.id)
                .collect()
        } else {
            config.device_ids.clone()
        };
        if device_ids.is_empty() {
            return Err(WorkflowError::InvalidConfig(
                "no watch-capable devices".to_string(),
            ));
        }

        let duration_secs = config.duration_mins * 60;
        let workflow_id = self
            .create_workflow(WorkflowConfig {
                name: format!("content-watching {}min", config.duration_mins),
                device_ids,
                platforms: config.platforms.clone(),
                schedule: ScheduleWindow::immediate(),
                phases: vec![WorkflowPhase::new(PhaseKind::Watch, duration_secs)
                    .with_param("profile", config.profile.clone())],
                strategy: config.strategy.clone(),
            })
            .await?;

        // Mark running: this operation allocates inline and finishes on a
        // background task instead of the usual phase driver
        {
            let mut workflows = self.workflows.write().await;
            if let Some(entry) = workflows.get_mut(&workflow_id) {
                entry.workflow.status = WorkflowStatus::Running;
                entry.workflow.updated_at = self.clock.now();
            }
        }

        let workflow = self
            .get_workflow(workflow_id)
            .await
            .ok_or(WorkflowError::NotFound(workflow_id))?;
        let strategy = self.strategies.get_or_default(&workflow.strategy);
        let mut rng = self.run_rng(workflow_id);

        let pairs = self
            .pair_devices(&workflow, &strategy, 0, &mut rng)
            .await;
        if pairs.is_empty() {
            let error = WorkflowError::InvalidConfig(
                "no device covers the requested platforms".to_string(),
            );
            self.fail_workflow(workflow_id, &error).await;
            return Err(error);
        }
        let held = match self
            .allocate_watch_sessions(workflow_id, 0, &pairs, duration_secs, &config.profile)
            .await
        {
            Ok(held) => held,
            Err(e) => {
                self.fail_workflow(workflow_id, &e).await;
                return Err(e);
            }
        };
        let session_ids: Vec<SessionId> = held.iter().map(|(g, _)| g.session.id).collect();

        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator
                .clock
                .sleep(std::time::Duration::from_secs(duration_secs))
                .await;
            let totals = orchestrator.collect_watch_sessions(held).await;
            orchestrator.fold_totals(workflow_id, totals).await;
            orchestrator.complete_workflow(workflow_id).await;
        });

        Ok(WatchRunLaunch {
            workflow_id,
            session_ids,
        })
    }

    /// Post one piece of content across platforms, pacing per the strategy
    pub async fn coordinate_posting(
        &self,
        config: PostingRunConfig,
    ) -> WorkflowResult<Vec<PostOutcome>> {
        if config.platforms.is_empty() {
            return Err(WorkflowError::InvalidConfig("no platforms".to_string()));
        }

        let strategy = self.strategies.get_or_default(&config.strategy);
        let content = PostContent {
            media_url: config.media_url.clone(),
            caption: config.caption.clone(),
            tags: config.tags.clone(),
        };
        let devices = self.registry.list(None).await;
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        let mut results = Vec::new();
        for platform in &config.platforms {
            let accounts = accounts_for_platform(&devices, *platform);
            if accounts.is_empty() {
                tracing::warn!(platform = %platform, "No accounts assigned, skipping platform");
                continue;
            }
            let round = self
                .post_round(*platform, &accounts, &content, strategy.timing, &mut rng, None)
                .await?;
            // No signal was passed, so every slot is populated
            results.extend(round.into_iter().flatten());
        }

        Ok(results)
    }

    // ------------------------------------------------------------------
    // Workflow task
    // ------------------------------------------------------------------

    async fn run_workflow(&self, id: WorkflowId, mut signal: watch::Receiver<WorkflowSignal>) {
        let Some(workflow) = self.get_workflow(id).await else {
            return;
        };
        let strategy = self.strategies.get_or_default(&workflow.strategy);
        let mut rng = self.run_rng(id);
        let inter_phase = std::time::Duration::from_secs(self.config.inter_phase_pause_secs);

        for (index, phase) in workflow.phases.iter().enumerate() {
            if self.wait_while_paused(&mut signal).await {
                self.finish_stopped(id).await;
                return;
            }

            // Back-to-back phase bursts are throttled
            if index > 0 && self.sleep_or_stop(inter_phase, &mut signal).await {
                self.finish_stopped(id).await;
                return;
            }

            let _ = self.events.send(WorkflowEvent::PhaseStarted {
                id,
                index,
                kind: phase.kind,
            });
            tracing::info!(workflow = %id, phase = %phase.kind, index, "Phase started");

            match self
                .execute_phase(&workflow, &strategy, index, phase, &mut signal, &mut rng)
                .await
            {
                Ok(PhaseEnd::Stopped) => {
                    self.finish_stopped(id).await;
                    return;
                }
                Ok(PhaseEnd::Completed(totals)) => {
                    self.fold_totals(id, totals).await;
                    let _ = self.events.send(WorkflowEvent::PhaseCompleted { id, index });
                }
                Err(e) => {
                    self.fail_workflow(id, &e).await;
                    return;
                }
            }
        }

        self.complete_workflow(id).await;
    }

    async fn execute_phase(
        &self,
        workflow: &Workflow,
        strategy: &CoordinationStrategy,
        index: usize,
        phase: &WorkflowPhase,
        signal: &mut watch::Receiver<WorkflowSignal>,
        rng: &mut ChaCha8Rng,
    ) -> WorkflowResult<PhaseEnd> {
        let duration = std::time::Duration::from_secs(phase.duration_secs);

        match phase.kind {
            PhaseKind::Wait => {
                if self.sleep_or_stop(duration, signal).await {
                    return Ok(PhaseEnd::Stopped);
                }
                Ok(PhaseEnd::Completed(PhaseTotals::default()))
            }

            PhaseKind::Watch => {
                let profile = phase.param_str("profile").unwrap_or("default").to_string();
                let pairs = self.pair_devices(workflow, strategy, index, rng).await;
                if pairs.is_empty() {
                    return Err(WorkflowError::PhaseExecutionFailed {
                        index,
                        kind: phase.kind,
                        reason: "no devices cover the target platforms".to_string(),
                    });
                }

                // Allocation is itself a cancellable wait: a stop request
                // abandons pending queue entries, and any sessions already
                // granted are swept up by the stop path
                let allocation = async {
                    if phase.parallel {
                        self.allocate_watch_sessions(
                            workflow.id,
                            index,
                            &pairs,
                            phase.duration_secs,
                            &profile,
                        )
                        .await
                    } else {
                        // Sequential issue order; still one session per pair
                        let mut held = Vec::with_capacity(pairs.len());
                        for pair in &pairs {
                            held.extend(
                                self.allocate_watch_sessions(
                                    workflow.id,
                                    index,
                                    std::slice::from_ref(pair),
                                    phase.duration_secs,
                                    &profile,
                                )
                                .await?,
                            );
                        }
                        Ok(held)
                    }
                };
                let held = tokio::select! {
                    result = allocation => result?,
                    _ = wait_for_stop(signal) => return Ok(PhaseEnd::Stopped),
                };

                if self.sleep_or_stop(duration, signal).await {
                    // Stopped mid-watch: release everything as failed
                    for (grant, _) in held {
                        self.scheduler
                            .release(grant.session.id, &SessionOutcome::failure())
                            .await;
                    }
                    return Ok(PhaseEnd::Stopped);
                }

                Ok(PhaseEnd::Completed(self.collect_watch_sessions(held).await))
            }

            PhaseKind::Post => {
                let content = PostContent {
                    media_url: phase
                        .param_str("media_url")
                        .unwrap_or("s3://droidpool/default.mp4")
                        .to_string(),
                    caption: phase.param_str("caption").unwrap_or("").to_string(),
                    tags: phase
                        .param_str("tags")
                        .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
                        .unwrap_or_default(),
                };

                let devices = self.workflow_devices(workflow).await;
                let mut totals = PhaseTotals::default();
                for platform in &workflow.platforms {
                    let ordered = strategy.assign_devices(&devices, *platform, index, rng);
                    let accounts = accounts_for_platform(&ordered, *platform);
                    if accounts.is_empty() {
                        tracing::warn!(
                            workflow = %workflow.id,
                            platform = %platform,
                            "No accounts assigned, skipping platform"
                        );
                        continue;
                    }

                    let round = self
                        .post_round(
                            *platform,
                            &accounts,
                            &content,
                            strategy.timing,
                            rng,
                            Some(&mut *signal),
                        )
                        .await?;
                    match round_or_stopped(round) {
                        Some(outcomes) => {
                            totals.posts += outcomes.iter().filter(|o| o.success).count() as u64;
                        }
                        None => return Ok(PhaseEnd::Stopped),
                    }
                }

                Ok(PhaseEnd::Completed(totals))
            }

            PhaseKind::Engage => {
                let devices = self.workflow_devices(workflow).await;
                let mut totals = PhaseTotals::default();

                for (device, platform) in pair_round_robin(&devices, &workflow.platforms, Activity::Engage)
                {
                    let summary = self
                        .collaborators
                        .engagement
                        .run_engagement(
                            platform,
                            &device.id,
                            phase.duration_secs,
                            strategy.aggressiveness,
                        )
                        .await
                        .map_err(|e| WorkflowError::CollaboratorUnavailable(e.to_string()))?;
                    totals.engagements += summary.total();
                }

                if self.sleep_or_stop(duration, signal).await {
                    return Ok(PhaseEnd::Stopped);
                }
                Ok(PhaseEnd::Completed(totals))
            }

            PhaseKind::Analyze => {
                // Re-snapshot so the report sees stats from earlier phases
                let snapshot = self
                    .get_workflow(workflow.id)
                    .await
                    .unwrap_or_else(|| workflow.clone());
                let report = WorkflowReport::from_workflow(&snapshot, self.clock.now());
                self.collaborators.reports.save_report(&report).await?;
                tracing::info!(workflow = %workflow.id, "Report snapshot persisted");
                Ok(PhaseEnd::Completed(PhaseTotals::default()))
            }
        }
    }

    // ------------------------------------------------------------------
    // Phase helpers
    // ------------------------------------------------------------------

    // Snapshot the workflow's devices that still exist in the registry
    async fn workflow_devices(&self, workflow: &Workflow) -> Vec<Device> {
        let mut devices = Vec::with_capacity(workflow.device_ids.len());
        for id in &workflow.device_ids {
            if let Some(device) = self.registry.get(id).await {
                devices.push(device);
            }
        }
        devices
    }

    // Compute the (device, platform) pairs for a watch phase. The strategy
    // orders the devices once; each then takes the next platform it
    // actually supports.
    async fn pair_devices(
        &self,
        workflow: &Workflow,
        strategy: &CoordinationStrategy,
        offset: usize,
        rng: &mut ChaCha8Rng,
    ) -> Vec<(Device, Platform)> {
        let devices = self.workflow_devices(workflow).await;
        let lead_platform = workflow.platforms.first().copied();
        let ordered = match lead_platform {
            Some(platform) => strategy.assign_devices(&devices, platform, offset, rng),
            None => devices,
        };
        pair_round_robin(&ordered, &workflow.platforms, Activity::Watch)
    }

    // Allocate one device session per (device, platform) pair and start
    // the backend watch session on each
    async fn allocate_watch_sessions(
        &self,
        workflow_id: WorkflowId,
        index: usize,
        pairs: &[(Device, Platform)],
        duration_secs: u64,
        profile: &str,
    ) -> WorkflowResult<Vec<(Grant, String)>> {
        let allocations = pairs.iter().map(|(device, platform)| {
            let request = AllocationRequest::new(*platform, Activity::Watch)
                .with_duration_secs(duration_secs)
                .with_constraints(AllocationConstraints {
                    device_id: Some(device.id.clone()),
                    ..Default::default()
                });
            self.scheduler.allocate_for(request, Some(workflow_id))
        });

        let grants: Vec<Grant> = futures::future::try_join_all(allocations)
            .await
            .map_err(|e| WorkflowError::PhaseExecutionFailed {
                index,
                kind: PhaseKind::Watch,
                reason: e.to_string(),
            })?;

        let mut held = Vec::with_capacity(grants.len());
        for grant in grants {
            let backend_id = self
                .collaborators
                .watching
                .start_session(
                    grant.session.platform,
                    profile,
                    &grant.session.device_id,
                    (duration_secs / 60).max(1),
                )
                .await
                .map_err(|e| WorkflowError::CollaboratorUnavailable(e.to_string()))?;
            held.push((grant, backend_id));
        }
        Ok(held)
    }

    // Pull backend stats for each held session and release the devices
    async fn collect_watch_sessions(&self, held: Vec<(Grant, String)>) -> PhaseTotals {
        let mut totals = PhaseTotals::default();

        for (grant, backend_id) in held {
            let outcome = match self.collaborators.watching.get_session(&backend_id).await {
                Ok(stats) => {
                    totals.watch_secs += stats.total_watch_secs;
                    totals.engagements += stats.engagements;
                    SessionOutcome {
                        success: true,
                        watch_secs: stats.total_watch_secs,
                        posts: 0,
                        engagements: stats.engagements,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        session = %grant.session.id,
                        error = %e,
                        "Watch stats unavailable, releasing as failed"
                    );
                    SessionOutcome::failure()
                }
            };
            self.scheduler.release(grant.session.id, &outcome).await;
        }

        totals
    }

    // Post once per account with inter-post pacing. Returns None in the
    // outcome list position if stopped mid-round (flagged via sentinel).
    async fn post_round(
        &self,
        platform: Platform,
        accounts: &[String],
        content: &PostContent,
        timing: TimingMode,
        rng: &mut ChaCha8Rng,
        mut signal: Option<&mut watch::Receiver<WorkflowSignal>>,
    ) -> WorkflowResult<Vec<Option<PostOutcome>>> {
        let mut outcomes = Vec::with_capacity(accounts.len());

        for (i, account) in accounts.iter().enumerate() {
            if i > 0 {
                let delay = timing.sample_post_delay(rng);
                match signal.as_deref_mut() {
                    Some(signal) => {
                        if self.sleep_or_stop(delay, signal).await {
                            outcomes.push(None);
                            return Ok(outcomes);
                        }
                    }
                    None => self.clock.sleep(delay).await,
                }
            }

            let receipt = self
                .collaborators
                .posting
                .post_content(platform, account, content)
                .await
                .map_err(|e| WorkflowError::CollaboratorUnavailable(e.to_string()))?;

            if !receipt.success {
                tracing::warn!(
                    platform = %platform,
                    account = %account,
                    error = ?receipt.error,
                    "Post rejected by platform"
                );
            }
            outcomes.push(Some(PostOutcome {
                platform,
                account: account.clone(),
                success: receipt.success,
                post_url: receipt.post_url,
                error: receipt.error,
            }));
        }

        Ok(outcomes)
    }

    // ------------------------------------------------------------------
    // Control-flow helpers
    // ------------------------------------------------------------------

    // Block while paused; returns true if stop was requested
    async fn wait_while_paused(&self, signal: &mut watch::Receiver<WorkflowSignal>) -> bool {
        loop {
            match *signal.borrow() {
                WorkflowSignal::Run => return false,
                WorkflowSignal::Stop => return true,
                WorkflowSignal::Pause => {}
            }
            if signal.changed().await.is_err() {
                return true;
            }
        }
    }

    // Sleep for a duration; returns true if stop arrived first
    async fn sleep_or_stop(
        &self,
        duration: std::time::Duration,
        signal: &mut watch::Receiver<WorkflowSignal>,
    ) -> bool {
        tokio::select! {
            _ = self.clock.sleep(duration) => false,
            _ = wait_for_stop(signal) => true,
        }
    }

    fn run_rng(&self, id: WorkflowId) -> ChaCha8Rng {
        let fold = id
            .to_string()
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        ChaCha8Rng::seed_from_u64(self.config.seed ^ fold)
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    async fn fold_totals(&self, id: WorkflowId, totals: PhaseTotals) {
        let mut workflows = self.workflows.write().await;
        if let Some(entry) = workflows.get_mut(&id) {
            entry
                .workflow
                .stats
                .fold(totals.watch_secs, totals.posts, totals.engagements);
            entry.workflow.updated_at = self.clock.now();
        }
    }

    async fn complete_workflow(&self, id: WorkflowId) {
        let now = self.clock.now();
        {
            let mut workflows = self.workflows.write().await;
            if let Some(entry) = workflows.get_mut(&id) {
                entry.workflow.stats.runs += 1;
                entry.workflow.stats.successes += 1;
                entry.workflow.stats.last_run = Some(now);
                entry.workflow.status = WorkflowStatus::Completed;
                entry.workflow.updated_at = now;
                if entry.workflow.schedule.repeat_daily {
                    entry.workflow.stats.next_run =
                        Some(entry.workflow.schedule.next_occurrence_after(now));
                }
                entry.control = None;
            }
        }
        self.persist(id).await;
        let _ = self.events.send(WorkflowEvent::Completed { id });
        tracing::info!(workflow = %id, "Workflow completed");
    }

    async fn fail_workflow(&self, id: WorkflowId, error: &WorkflowError) {
        // Prior phases' statistics are retained; nothing rolls back
        let now = self.clock.now();
        {
            let mut workflows = self.workflows.write().await;
            if let Some(entry) = workflows.get_mut(&id) {
                entry.workflow.status = WorkflowStatus::Failed;
                entry.workflow.error = Some(error.to_string());
                entry.workflow.stats.runs += 1;
                entry.workflow.stats.last_run = Some(now);
                entry.workflow.updated_at = now;
                entry.control = None;
            }
        }
        self.sessions.force_release_workflow(id).await;
        self.persist(id).await;
        let _ = self.events.send(WorkflowEvent::Failed {
            id,
            error: error.to_string(),
        });
        tracing::error!(workflow = %id, error = %error, "Workflow failed");
    }

    async fn finish_stopped(&self, id: WorkflowId) {
        self.sessions.force_release_workflow(id).await;
        {
            let mut workflows = self.workflows.write().await;
            if let Some(entry) = workflows.get_mut(&id) {
                entry.workflow.status = WorkflowStatus::Completed;
                entry.workflow.updated_at = self.clock.now();
                entry.control = None;
            }
        }
        self.persist(id).await;
        let _ = self.events.send(WorkflowEvent::Stopped { id });
        tracing::info!(workflow = %id, "Workflow stopped");
    }

    async fn persist(&self, id: WorkflowId) {
        let snapshot = self.get_workflow(id).await;
        if let Some(workflow) = snapshot {
            if let Err(e) = self.collaborators.configs.save(&workflow).await {
                tracing::warn!(workflow = %id, error = %e, "Failed to persist workflow");
            }
        }
    }
}

// ============================================================================
// Free helpers
// ============================================================================

// Accounts assigned to the given platform, in device order, deduplicated
fn accounts_for_platform(devices: &[Device], platform: Platform) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    devices
        .iter()
        .filter_map(|d| d.accounts.get(&platform).cloned())
        .filter(|account| seen.insert(account.clone()))
        .collect()
}

// Pair each capable device with the next platform it supports, cycling
// through the platform list
fn pair_round_robin(
    devices: &[Device],
    platforms: &[Platform],
    activity: Activity,
) -> Vec<(Device, Platform)> {
    if platforms.is_empty() {
        return Vec::new();
    }
    let mut pairs = Vec::new();
    for (i, device) in devices.iter().enumerate() {
        if !device.supports_activity(activity) {
            continue;
        }
        let supported = (0..platforms.len())
            .map(|k| platforms[(i + k) % platforms.len()])
            .find(|p| device.supports_platform(*p));
        if let Some(platform) = supported {
            pairs.push((device.clone(), platform));
        }
    }
    pairs
}

async fn wait_for_stop(signal: &mut watch::Receiver<WorkflowSignal>) {
    loop {
        if *signal.borrow() == WorkflowSignal::Stop {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

fn round_or_stopped(round: Vec<Option<PostOutcome>>) -> Option<Vec<PostOutcome>> {
    if round.iter().any(|o| o.is_none()) {
        None
    } else {
        Some(round.into_iter().flatten().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DeviceConfig, DevicePlatform, DeviceStatus, HealthMetrics};
    use chrono::Utc;
    use crate::services::{
        MemoryWorkflowStore, ServiceError, SimulatedEngagementService, SimulatedWatchService,
        WorkflowConfigStore,
    };
    use crate::utils::VirtualClock;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::time::Duration as StdDuration;

    fn device_config(id: &str, platforms: Vec<Platform>, account_on: Option<Platform>) -> DeviceConfig {
        let mut accounts = StdHashMap::new();
        if let Some(platform) = account_on {
            accounts.insert(platform, format!("@{id}"));
        }
        DeviceConfig {
            id: DeviceId::new(id),
            hardware_id: format!("hw-{id}"),
            platform: DevicePlatform::Android,
            supported_platforms: platforms,
            capabilities: vec![Activity::Watch, Activity::Post, Activity::Engage],
            accounts,
        }
    }

    struct Pool {
        registry: Arc<DeviceRegistry>,
        sessions: Arc<SessionManager>,
        scheduler: Arc<AllocationScheduler>,
        store: Arc<MemoryWorkflowStore>,
        orchestrator: Arc<WorkflowOrchestrator>,
    }

    async fn build_pool(collaborators: Option<Collaborators>) -> Pool {
        let registry = Arc::new(DeviceRegistry::new(16));
        for id in ["d1", "d2"] {
            registry
                .add(device_config(
                    id,
                    vec![Platform::Tiktok, Platform::Youtube],
                    Some(Platform::Tiktok),
                ))
                .await
                .unwrap();
        }
        let sessions = Arc::new(SessionManager::new(registry.clone()));
        let scheduler = Arc::new(AllocationScheduler::with_defaults(
            registry.clone(),
            sessions.clone(),
        ));
        let store = Arc::new(MemoryWorkflowStore::new());
        let collaborators = collaborators.unwrap_or_else(|| Collaborators {
            watching: Arc::new(SimulatedWatchService::new(42)),
            posting: Arc::new(crate::services::SimulatedPostingService::new(42)),
            engagement: Arc::new(SimulatedEngagementService::new(42)),
            reports: store.clone(),
            configs: store.clone(),
        });

        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            registry.clone(),
            scheduler.clone(),
            sessions.clone(),
            collaborators,
            StrategyRegistry::with_builtins(),
            Arc::new(VirtualClock::new()),
            OrchestratorConfig {
                inter_phase_pause_secs: 30,
                seed: 42,
            },
        ));

        // Background scheduler loop so allocations resolve
        let loop_scheduler = scheduler.clone();
        tokio::spawn(async move { loop_scheduler.start().await });

        Pool {
            registry,
            sessions,
            scheduler,
            store,
            orchestrator,
        }
    }

    async fn wait_for_status(pool: &Pool, id: WorkflowId, status: WorkflowStatus) -> Workflow {
        for _ in 0..400 {
            if let Some(workflow) = pool.orchestrator.get_workflow(id).await {
                if workflow.status == status {
                    return workflow;
                }
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("workflow {id} never reached {status}");
    }

    fn watch_workflow_config(repeat_daily: bool) -> WorkflowConfig {
        WorkflowConfig {
            name: "watch run".to_string(),
            device_ids: vec![DeviceId::new("d1"), DeviceId::new("d2")],
            platforms: vec![Platform::Tiktok],
            schedule: ScheduleWindow {
                start: Utc::now(),
                end: None,
                repeat_daily,
            },
            phases: vec![
                WorkflowPhase::new(PhaseKind::Watch, 600),
                WorkflowPhase::new(PhaseKind::Analyze, 0),
            ],
            strategy: "balanced".to_string(),
        }
    }

    #[tokio::test]
    async fn test_watch_workflow_completes_and_reports() {
        let pool = build_pool(None).await;

        let id = pool
            .orchestrator
            .create_workflow(watch_workflow_config(false))
            .await
            .unwrap();
        pool.orchestrator.start_workflow(id).await.unwrap();

        let workflow = wait_for_status(&pool, id, WorkflowStatus::Completed).await;
        assert_eq!(workflow.stats.runs, 1);
        assert_eq!(workflow.stats.successes, 1);
        assert!(workflow.stats.total_watch_secs > 0);
        assert!(workflow.stats.last_run.is_some());

        // The analyze phase wrote a report
        assert_eq!(pool.store.reports().await.len(), 1);

        // All devices came back and the invariant held
        assert_eq!(pool.sessions.active_count().await, 0);
        for device in pool.registry.list(None).await {
            assert_eq!(device.status, DeviceStatus::Available);
            assert!(device.invariant_holds());
            assert!(device.stats.last_active.is_some());
        }
    }

    #[tokio::test]
    async fn test_create_workflow_validation() {
        let pool = build_pool(None).await;

        let mut config = watch_workflow_config(false);
        config.device_ids = vec![DeviceId::new("ghost")];
        let result = pool.orchestrator.create_workflow(config).await;
        assert!(matches!(result, Err(WorkflowError::InvalidConfig(_))));

        let mut config = watch_workflow_config(false);
        config.phases.clear();
        let result = pool.orchestrator.create_workflow(config).await;
        assert!(matches!(result, Err(WorkflowError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_requires_scheduled() {
        let pool = build_pool(None).await;

        let id = pool
            .orchestrator
            .create_workflow(watch_workflow_config(false))
            .await
            .unwrap();
        pool.orchestrator.start_workflow(id).await.unwrap();
        wait_for_status(&pool, id, WorkflowStatus::Completed).await;

        let again = pool.orchestrator.start_workflow(id).await;
        assert!(matches!(
            again,
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_post_workflow_counts_posts() {
        let pool = build_pool(None).await;

        let id = pool
            .orchestrator
            .create_workflow(WorkflowConfig {
                name: "posting".to_string(),
                device_ids: vec![DeviceId::new("d1"), DeviceId::new("d2")],
                platforms: vec![Platform::Tiktok],
                schedule: ScheduleWindow::immediate(),
                phases: vec![WorkflowPhase::new(PhaseKind::Post, 60)
                    .with_param("caption", "fresh drop")
                    .with_param("tags", "fyp, viral")],
                strategy: "balanced".to_string(),
            })
            .await
            .unwrap();
        pool.orchestrator.start_workflow(id).await.unwrap();

        let workflow = wait_for_status(&pool, id, WorkflowStatus::Completed).await;
        // Both devices carry a tiktok account
        assert_eq!(workflow.stats.total_posts, 2);
    }

    #[tokio::test]
    async fn test_engage_workflow_folds_engagements() {
        let pool = build_pool(None).await;

        let id = pool
            .orchestrator
            .create_workflow(WorkflowConfig {
                name: "engage".to_string(),
                device_ids: vec![DeviceId::new("d1")],
                platforms: vec![Platform::Tiktok],
                schedule: ScheduleWindow::immediate(),
                phases: vec![WorkflowPhase::new(PhaseKind::Engage, 300)],
                strategy: "aggressive".to_string(),
            })
            .await
            .unwrap();
        pool.orchestrator.start_workflow(id).await.unwrap();

        let workflow = wait_for_status(&pool, id, WorkflowStatus::Completed).await;
        assert!(workflow.stats.total_engagements > 0);
    }

    /// Posting backend that is unreachable
    struct DownPostingService;

    #[async_trait]
    impl crate::services::PostingService for DownPostingService {
        async fn post_content(
            &self,
            _platform: Platform,
            _account_id: &str,
            _content: &PostContent,
        ) -> Result<crate::services::PostReceipt, ServiceError> {
            Err(ServiceError::Unavailable("posting backend down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_collaborator_failure_fails_workflow_keeps_stats() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let collaborators = Collaborators {
            watching: Arc::new(SimulatedWatchService::new(42)),
            posting: Arc::new(DownPostingService),
            engagement: Arc::new(SimulatedEngagementService::new(42)),
            reports: store.clone(),
            configs: store.clone(),
        };
        let pool = build_pool(Some(collaborators)).await;

        let id = pool
            .orchestrator
            .create_workflow(WorkflowConfig {
                name: "watch then post".to_string(),
                device_ids: vec![DeviceId::new("d1")],
                platforms: vec![Platform::Tiktok],
                schedule: ScheduleWindow::immediate(),
                phases: vec![
                    WorkflowPhase::new(PhaseKind::Watch, 300),
                    WorkflowPhase::new(PhaseKind::Post, 60),
                ],
                strategy: "balanced".to_string(),
            })
            .await
            .unwrap();
        pool.orchestrator.start_workflow(id).await.unwrap();

        let workflow = wait_for_status(&pool, id, WorkflowStatus::Failed).await;
        assert!(workflow.error.as_ref().unwrap().contains("unavailable"));
        // The watch phase's statistics survived the failure
        assert!(workflow.stats.total_watch_secs > 0);
        assert_eq!(workflow.stats.successes, 0);
        // No leaked sessions
        assert_eq!(pool.sessions.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_stop_releases_sessions() {
        let pool = build_pool(None).await;

        // Swap in a wall-clock so the wait phase genuinely blocks
        let registry = pool.registry.clone();
        let sessions = pool.sessions.clone();
        let scheduler = pool.scheduler.clone();
        let store = Arc::new(MemoryWorkflowStore::new());
        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            registry,
            scheduler,
            sessions.clone(),
            Collaborators {
                watching: Arc::new(SimulatedWatchService::new(1)),
                posting: Arc::new(crate::services::SimulatedPostingService::new(1)),
                engagement: Arc::new(SimulatedEngagementService::new(1)),
                reports: store.clone(),
                configs: store,
            },
            StrategyRegistry::with_builtins(),
            Arc::new(crate::utils::SystemClock),
            OrchestratorConfig::default(),
        ));

        let id = orchestrator
            .create_workflow(WorkflowConfig {
                name: "long wait".to_string(),
                device_ids: vec![DeviceId::new("d1")],
                platforms: vec![Platform::Tiktok],
                schedule: ScheduleWindow::immediate(),
                phases: vec![WorkflowPhase::new(PhaseKind::Wait, 3600)],
                strategy: "balanced".to_string(),
            })
            .await
            .unwrap();
        orchestrator.start_workflow(id).await.unwrap();

        // Give the task a moment to enter its wait, then stop it
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert!(orchestrator.stop_workflow(id).await);

        for _ in 0..100 {
            let workflow = orchestrator.get_workflow(id).await.unwrap();
            if workflow.status == WorkflowStatus::Completed {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!("stopped workflow never finalized");
    }

    #[tokio::test]
    async fn test_pause_resume_between_phases() {
        let pool = build_pool(None).await;

        let id = pool
            .orchestrator
            .create_workflow(watch_workflow_config(false))
            .await
            .unwrap();
        pool.orchestrator.start_workflow(id).await.unwrap();

        // Pause immediately; resume must be accepted afterwards
        assert!(pool.orchestrator.pause_workflow(id).await);
        let workflow = pool.orchestrator.get_workflow(id).await.unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Paused);

        // Pausing a paused workflow is refused
        assert!(!pool.orchestrator.pause_workflow(id).await);

        assert!(pool.orchestrator.resume_workflow(id).await);
        wait_for_status(&pool, id, WorkflowStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_repeat_daily_recompletes_to_scheduled() {
        let pool = build_pool(None).await;

        let id = pool
            .orchestrator
            .create_workflow(WorkflowConfig {
                schedule: ScheduleWindow {
                    start: Utc::now() - chrono::Duration::days(2),
                    end: None,
                    repeat_daily: true,
                },
                ..watch_workflow_config(true)
            })
            .await
            .unwrap();
        pool.orchestrator.start_workflow(id).await.unwrap();
        let workflow = wait_for_status(&pool, id, WorkflowStatus::Completed).await;
        assert!(workflow.stats.next_run.is_some());

        // Pretend a day has passed since the run finished
        {
            let mut workflows = pool.orchestrator.workflows.write().await;
            let entry = workflows.get_mut(&id).unwrap();
            entry.workflow.stats.last_run =
                Some(Utc::now() - chrono::Duration::days(1) - chrono::Duration::hours(1));
        }

        let flipped = pool.orchestrator.refresh_schedules().await;
        assert_eq!(flipped, vec![id]);

        let workflow = pool.orchestrator.get_workflow(id).await.unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Scheduled);
        assert!(workflow.stats.next_run.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_start_content_watching_returns_sessions() {
        let pool = build_pool(None).await;

        let launch = pool
            .orchestrator
            .start_content_watching(WatchRunConfig {
                platforms: vec![Platform::Tiktok],
                duration_mins: 10,
                profile: "fyp".to_string(),
                device_ids: Vec::new(),
                strategy: "balanced".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(launch.session_ids.len(), 2);
        let workflow = wait_for_status(&pool, launch.workflow_id, WorkflowStatus::Completed).await;
        assert!(workflow.stats.total_watch_secs > 0);
        assert_eq!(pool.sessions.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_coordinate_posting_returns_results() {
        let pool = build_pool(None).await;

        let results = pool
            .orchestrator
            .coordinate_posting(PostingRunConfig {
                platforms: vec![Platform::Tiktok, Platform::Youtube],
                media_url: "s3://droidpool/clip.mp4".to_string(),
                caption: "check this out".to_string(),
                tags: vec!["fyp".to_string()],
                strategy: "balanced".to_string(),
            })
            .await
            .unwrap();

        // Only tiktok has accounts assigned (both devices)
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert!(results.iter().all(|r| r.platform == Platform::Tiktok));
    }

    #[tokio::test]
    async fn test_load_persisted_resets_running() {
        let pool = build_pool(None).await;

        let mut workflow = Workflow::from_config(watch_workflow_config(false));
        workflow.status = WorkflowStatus::Running;
        pool.store.save(&workflow).await.unwrap();

        let loaded = pool.orchestrator.load_persisted().await.unwrap();
        assert!(loaded >= 1);
        let restored = pool.orchestrator.get_workflow(workflow.id).await.unwrap();
        assert_eq!(restored.status, WorkflowStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_pair_round_robin_respects_support() {
        let mut ios_only = Device::from_config(device_config(
            "ios",
            vec![Platform::Instagram],
            None,
        ));
        ios_only.health = HealthMetrics::default();
        let android = Device::from_config(device_config(
            "android",
            vec![Platform::Tiktok, Platform::Youtube],
            None,
        ));

        let pairs = pair_round_robin(
            &[android, ios_only],
            &[Platform::Tiktok, Platform::Youtube],
            Activity::Watch,
        );

        // The instagram-only device cannot serve either platform
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.id, DeviceId::new("android"));
    }
}
