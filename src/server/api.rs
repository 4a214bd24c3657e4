//! REST API handlers for the pool server
//!
//! This module defines the API routes and handlers exposed to the dashboard
//! layer: device inventory, pool statistics, and workflow control.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::{Device, DeviceConfig, DeviceId, DeviceStatus, PoolStatistics};
use crate::workflow::{
    PostingRunConfig, WatchRunConfig, Workflow, WorkflowConfig, WorkflowId,
};

use super::server::AppState;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Simple error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Pool statistics response
#[derive(Debug, Serialize, Deserialize)]
pub struct PoolStatsResponse {
    pub pool: PoolStatistics,
    pub active_sessions: usize,
    pub queued_requests: usize,
    pub uptime_secs: u64,
}

/// Device list response
#[derive(Debug, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
    pub stats: PoolStatistics,
}

/// Workflow list response
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowsResponse {
    pub workflows: Vec<Workflow>,
}

/// Maintenance toggle request
#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    pub enabled: bool,
}

/// Workflow creation response
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowCreated {
    pub workflow_id: WorkflowId,
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/api/health", get(health_check))
        // Pool endpoints
        .route("/api/pool/stats", get(pool_stats))
        // Device endpoints
        .route("/api/devices", get(list_devices).post(add_device))
        .route("/api/devices/{id}", get(get_device).delete(remove_device))
        .route("/api/devices/{id}/maintenance", post(set_maintenance))
        // Workflow endpoints
        .route("/api/workflows", get(list_workflows).post(create_workflow))
        .route("/api/workflows/{id}", get(get_workflow))
        .route("/api/workflows/{id}/start", post(start_workflow))
        .route("/api/workflows/{id}/pause", post(pause_workflow))
        .route("/api/workflows/{id}/resume", post(resume_workflow))
        .route("/api/workflows/{id}/stop", post(stop_workflow))
        // One-shot operations
        .route("/api/watch", post(start_watch_run))
        .route("/api/posts", post(coordinate_posting))
        .with_state(state)
}

// ============================================================================
// Health Handlers
// ============================================================================

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
    }))
}

// ============================================================================
// Pool Handlers
// ============================================================================

/// Aggregate pool statistics
async fn pool_stats(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.registry.pool_statistics().await;
    let active_sessions = state.sessions.active_count().await;
    let queued_requests = state.scheduler.queue_len().await;

    Json(ApiResponse::success(PoolStatsResponse {
        pool,
        active_sessions,
        queued_requests,
        uptime_secs: state.start_time.elapsed().as_secs(),
    }))
}

// ============================================================================
// Device Handlers
// ============================================================================

/// List all devices
async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    let devices = state.registry.list(None).await;
    let stats = state.registry.pool_statistics().await;

    Json(ApiResponse::success(DevicesResponse { devices, stats }))
}

/// Get a specific device
async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.registry.get(&DeviceId::new(&id)).await {
        Some(device) => (StatusCode::OK, Json(ApiResponse::success(device))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Device not found: {id}"))),
        )
            .into_response(),
    }
}

/// Register a new device
async fn add_device(
    State(state): State<AppState>,
    Json(config): Json<DeviceConfig>,
) -> axum::response::Response {
    let id = config.id.clone();
    match state.registry.add(config).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(format!("Device {id} registered"))),
        )
            .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

/// Remove a device from the pool
async fn remove_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.registry.remove(&DeviceId::new(&id)).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ApiResponse::success(format!("Device {id} removed"))),
        )
            .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

/// Toggle maintenance mode for a device
async fn set_maintenance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<MaintenanceRequest>,
) -> axum::response::Response {
    let device_id = DeviceId::new(&id);
    let target = if request.enabled {
        DeviceStatus::Maintenance
    } else {
        DeviceStatus::Available
    };

    match state.registry.set_status(&device_id, target).await {
        Ok(_) => (
            StatusCode::OK,
            Json(ApiResponse::success(format!(
                "Maintenance mode {} for {id}",
                if request.enabled { "enabled" } else { "disabled" }
            ))),
        )
            .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

// ============================================================================
// Workflow Handlers
// ============================================================================

fn parse_workflow_id(id: &str) -> Result<WorkflowId, axum::response::Response> {
    Uuid::parse_str(id).map(WorkflowId::from).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!("Invalid workflow id: {id}"))),
        )
            .into_response()
    })
}

/// List all workflows
async fn list_workflows(State(state): State<AppState>) -> impl IntoResponse {
    let workflows = state.orchestrator.list_workflows().await;
    Json(ApiResponse::success(WorkflowsResponse { workflows }))
}

/// Create a workflow
async fn create_workflow(
    State(state): State<AppState>,
    Json(config): Json<WorkflowConfig>,
) -> axum::response::Response {
    match state.orchestrator.create_workflow(config).await {
        Ok(workflow_id) => (
            StatusCode::OK,
            Json(ApiResponse::success(WorkflowCreated { workflow_id })),
        )
            .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

/// Get a specific workflow
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let workflow_id = match parse_workflow_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.orchestrator.get_workflow(workflow_id).await {
        Some(workflow) => (StatusCode::OK, Json(ApiResponse::success(workflow))).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Workflow not found: {id}"))),
        )
            .into_response(),
    }
}

/// Start a scheduled workflow
async fn start_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let workflow_id = match parse_workflow_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.orchestrator.start_workflow(workflow_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(format!("Workflow {id} started"))),
        )
            .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

/// Pause a running workflow
async fn pause_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    control_response(&id, |wf| {
        let state = state.clone();
        async move { state.orchestrator.pause_workflow(wf).await }
    })
    .await
}

/// Resume a paused workflow
async fn resume_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    control_response(&id, |wf| {
        let state = state.clone();
        async move { state.orchestrator.resume_workflow(wf).await }
    })
    .await
}

/// Stop a workflow and release its sessions
async fn stop_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    control_response(&id, |wf| {
        let state = state.clone();
        async move { state.orchestrator.stop_workflow(wf).await }
    })
    .await
}

// Shared shape for the pause/resume/stop boolean operations
async fn control_response<F, Fut>(id: &str, op: F) -> axum::response::Response
where
    F: FnOnce(WorkflowId) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let workflow_id = match parse_workflow_id(id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    if op(workflow_id).await {
        (StatusCode::OK, Json(ApiResponse::success(true))).into_response()
    } else {
        (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(format!(
                "Workflow {id} is not in a state that permits this operation"
            ))),
        )
            .into_response()
    }
}

// ============================================================================
// One-shot Operation Handlers
// ============================================================================

/// Launch a content-watching run
async fn start_watch_run(
    State(state): State<AppState>,
    Json(config): Json<WatchRunConfig>,
) -> axum::response::Response {
    match state.orchestrator.start_content_watching(config).await {
        Ok(launch) => (StatusCode::OK, Json(ApiResponse::success(launch))).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

/// Run a coordinated posting round
async fn coordinate_posting(
    State(state): State<AppState>,
    Json(config): Json<PostingRunConfig>,
) -> axum::response::Response {
    match state.orchestrator.coordinate_posting(config).await {
        Ok(results) => (StatusCode::OK, Json(ApiResponse::success(results))).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert!(response.data.is_some());
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_response() {
        let response = ErrorResponse::new("test error");
        assert!(!response.success);
        assert_eq!(response.error, "test error");
    }

    #[test]
    fn test_parse_workflow_id() {
        assert!(parse_workflow_id("not-a-uuid").is_err());
        assert!(parse_workflow_id("0b486168-9bbb-4d97-bd76-0125b27b0f13").is_ok());
    }

    #[test]
    fn test_api_response_round_trip() {
        let response = ApiResponse::success(HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 12,
        });
        let json = serde_json::to_string(&response).unwrap();
        let parsed: ApiResponse<HealthResponse> = serde_json::from_str(&json).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.unwrap().uptime_secs, 12);
    }
}
