//! Pool server implementation
//!
//! Wires the registry, health monitor, allocation scheduler, and workflow
//! orchestrator together, exposes the REST API, and runs the background
//! loops (scheduling, health sweeps, daily re-scheduling).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::allocation::AllocationScheduler;
use crate::config::AppConfig;
use crate::health::{HealthMonitor, SimulatedHealthProbe};
use crate::registry::DeviceRegistry;
use crate::services::{Collaborators, FileWorkflowStore};
use crate::session::SessionManager;
use crate::utils::SystemClock;
use crate::workflow::{StrategyRegistry, WorkflowOrchestrator};

use super::api::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Device registry
    pub registry: Arc<DeviceRegistry>,

    /// Session manager
    pub sessions: Arc<SessionManager>,

    /// Allocation scheduler
    pub scheduler: Arc<AllocationScheduler>,

    /// Health monitor
    pub monitor: Arc<HealthMonitor>,

    /// Workflow orchestrator
    pub orchestrator: Arc<WorkflowOrchestrator>,

    /// Server start time
    pub start_time: Instant,

    /// Configuration
    pub config: AppConfig,
}

// ============================================================================
// Pool Server
// ============================================================================

/// Main pool server
pub struct PoolServer {
    config: AppConfig,
    state: AppState,
}

impl PoolServer {
    /// Create a new pool server
    pub fn new(config: AppConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;

        let registry = Arc::new(DeviceRegistry::new(config.pool.max_devices));
        let sessions = Arc::new(SessionManager::new(registry.clone()));
        let scheduler = Arc::new(AllocationScheduler::new(
            registry.clone(),
            sessions.clone(),
            config.scheduler.clone(),
        ));

        let probe = Arc::new(
            SimulatedHealthProbe::new(config.simulation.seed)
                .with_failure_rate(config.simulation.probe_failure_rate),
        );
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            probe,
            config.health.clone(),
        ));

        let collaborators = match &config.storage.data_dir {
            Some(dir) => {
                let store = Arc::new(
                    FileWorkflowStore::new(dir)
                        .map_err(|e| ServerError::InitError(e.to_string()))?,
                );
                Collaborators::simulated_with_store(config.simulation.seed, store)
            }
            None => Collaborators::simulated(config.simulation.seed),
        };

        let orchestrator = Arc::new(WorkflowOrchestrator::new(
            registry.clone(),
            scheduler.clone(),
            sessions.clone(),
            collaborators,
            StrategyRegistry::with_builtins(),
            Arc::new(SystemClock),
            config.orchestrator.clone(),
        ));

        let state = AppState {
            registry,
            sessions,
            scheduler,
            monitor,
            orchestrator,
            start_time: Instant::now(),
            config: config.clone(),
        };

        Ok(Self { config, state })
    }

    /// Get the application state
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Seed the device fleet and load persisted workflows
    pub async fn init(&self) -> Result<(), ServerError> {
        for device in self.config.fleet() {
            let id = device.id.clone();
            if let Err(e) = self.state.registry.add(device).await {
                tracing::warn!(device = %id, error = %e, "Skipping device from config");
            }
        }

        self.state
            .orchestrator
            .load_persisted()
            .await
            .map_err(|e| ServerError::InitError(e.to_string()))?;

        tracing::info!(
            devices = self.state.registry.len().await,
            "Pool initialized"
        );
        Ok(())
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.server.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.server.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server
    pub async fn start(&self) -> Result<(), ServerError> {
        self.init().await?;
        let router = self.build_router();
        let addr = self.config.server.bind_address;

        tracing::info!("Starting pool server on {}", addr);
        self.start_background_tasks();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        Ok(())
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        self.init().await?;
        let router = self.build_router();
        let addr = self.config.server.bind_address;

        tracing::info!("Starting pool server on {} (with graceful shutdown)", addr);
        self.start_background_tasks();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        self.state.scheduler.stop().await;
        self.state.monitor.stop().await;
        tracing::info!("Pool server shutdown complete");
        Ok(())
    }

    /// Start background tasks
    fn start_background_tasks(&self) {
        // Allocation scheduling loop
        let scheduler = self.state.scheduler.clone();
        tokio::spawn(async move {
            scheduler.start().await;
        });

        // Health sweep loop
        let monitor = self.state.monitor.clone();
        tokio::spawn(async move {
            monitor.start().await;
        });

        // Daily re-scheduling sweep (checks twice a minute)
        let orchestrator = self.state.orchestrator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                orchestrator.refresh_schedules().await;
                orchestrator.start_due_workflows().await;
            }
        });

        tracing::info!("Background tasks started");
    }

    /// Get server info
    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.config.server.bind_address,
            max_devices: self.config.pool.max_devices,
            health_interval_secs: self.config.health.interval_secs,
            cors_enabled: self.config.server.enable_cors,
            request_logging_enabled: self.config.server.enable_request_logging,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub max_devices: usize,
    pub health_interval_secs: u64,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Pool Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Max Devices: {}\n\
             Health Interval: {}s\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.max_devices,
            self.health_interval_secs,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled {
                "enabled"
            } else {
                "disabled"
            }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone)]
pub enum ServerError {
    /// Configuration error
    ConfigError(String),

    /// Initialization error
    InitError(String),

    /// Failed to bind to address
    BindError(String),

    /// Server error
    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::InitError(msg) => write!(f, "Initialization error: {}", msg),
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

// ============================================================================
// Tests
// ============================================================================
