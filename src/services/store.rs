//! Workflow persistence stores
//!
//! Workflow definitions survive restarts through the config store; analyze
//! phases and failures write report snapshots through the report store. The
//! file-backed implementation keeps one pretty-printed JSON document per
//! workflow, plus timestamped report files.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::workflow::{Workflow, WorkflowId, WorkflowReport};

// ============================================================================
// Store Errors
// ============================================================================

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error
    #[error("Store IO error during '{operation}': {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

// ============================================================================
// Contracts
// ============================================================================

/// Persists workflow report snapshots
#[async_trait]
pub trait WorkflowReportStore: Send + Sync {
    /// Save a report snapshot
    async fn save_report(&self, report: &WorkflowReport) -> Result<(), StoreError>;
}

/// Persists workflow definitions across restarts
#[async_trait]
pub trait WorkflowConfigStore: Send + Sync {
    /// Load every persisted workflow
    async fn load(&self) -> Result<Vec<Workflow>, StoreError>;

    /// Save (create or replace) a workflow
    async fn save(&self, workflow: &Workflow) -> Result<(), StoreError>;

    /// Delete a workflow
    async fn delete(&self, id: WorkflowId) -> Result<(), StoreError>;
}

// ============================================================================
// File Store
// ============================================================================

/// File-backed store: one JSON document per workflow, timestamped reports
pub struct FileWorkflowStore {
    workflows_dir: PathBuf,
    reports_dir: PathBuf,
}

impl FileWorkflowStore {
    /// Create a store rooted at `dir`, creating the layout if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = dir.as_ref();
        let workflows_dir = root.join("workflows");
        let reports_dir = root.join("reports");
        std::fs::create_dir_all(&workflows_dir)
            .map_err(|e| StoreError::io("create_workflows_dir", e))?;
        std::fs::create_dir_all(&reports_dir)
            .map_err(|e| StoreError::io("create_reports_dir", e))?;
        Ok(Self {
            workflows_dir,
            reports_dir,
        })
    }

    fn workflow_path(&self, id: WorkflowId) -> PathBuf {
        self.workflows_dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl WorkflowConfigStore for FileWorkflowStore {
    async fn load(&self) -> Result<Vec<Workflow>, StoreError> {
        let mut workflows = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.workflows_dir)
            .await
            .map_err(|e| StoreError::io("read_workflows_dir", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io("read_workflows_dir", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::io("read_workflow", e))?;
            match Workflow::from_json(&json) {
                Ok(workflow) => workflows.push(workflow),
                Err(e) => {
                    // One corrupt file must not take the whole pool down
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable workflow file");
                }
            }
        }

        Ok(workflows)
    }

    async fn save(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let json = workflow.to_json()?;
        tokio::fs::write(self.workflow_path(workflow.id), json)
            .await
            .map_err(|e| StoreError::io("write_workflow", e))
    }

    async fn delete(&self, id: WorkflowId) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.workflow_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io("delete_workflow", e)),
        }
    }
}

#[async_trait]
impl WorkflowReportStore for FileWorkflowStore {
    async fn save_report(&self, report: &WorkflowReport) -> Result<(), StoreError> {
        let filename = format!(
            "{}-{}.json",
            report.workflow_id,
            report.generated_at.format("%Y%m%dT%H%M%S")
        );
        let json = serde_json::to_string_pretty(report)?;
        tokio::fs::write(self.reports_dir.join(filename), json)
            .await
            .map_err(|e| StoreError::io("write_report", e))
    }
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory store for tests and ephemeral pools
#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: Mutex<HashMap<WorkflowId, Workflow>>,
    reports: Mutex<Vec<WorkflowReport>>,
}

impl MemoryWorkflowStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports saved so far
    pub async fn reports(&self) -> Vec<WorkflowReport> {
        self.reports.lock().await.clone()
    }

    /// Number of stored workflows
    pub async fn workflow_count(&self) -> usize {
        self.workflows.lock().await.len()
    }
}

#[async_trait]
impl WorkflowConfigStore for MemoryWorkflowStore {
    async fn load(&self) -> Result<Vec<Workflow>, StoreError> {
        Ok(self.workflows.lock().await.values().cloned().collect())
    }

    async fn save(&self, workflow: &Workflow) -> Result<(), StoreError> {
        self.workflows
            .lock()
            .await
            .insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn delete(&self, id: WorkflowId) -> Result<(), StoreError> {
        self.workflows.lock().await.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl WorkflowReportStore for MemoryWorkflowStore {
    async fn save_report(&self, report: &WorkflowReport) -> Result<(), StoreError> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DeviceId, Platform};
    use crate::workflow::{PhaseKind, ScheduleWindow, WorkflowConfig, WorkflowPhase, WorkflowStatus};
    use chrono::Utc;

    fn sample_workflow() -> Workflow {
        Workflow::from_config(WorkflowConfig {
            name: "store test".to_string(),
            device_ids: vec![DeviceId::new("d1")],
            platforms: vec![Platform::Tiktok],
            schedule: ScheduleWindow::immediate(),
            phases: vec![WorkflowPhase::new(PhaseKind::Watch, 60)],
            strategy: "balanced".to_string(),
        })
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWorkflowStore::new(dir.path()).unwrap();

        let mut workflow = sample_workflow();
        workflow.status = WorkflowStatus::Completed;
        workflow.stats.fold(900, 3, 12);
        store.save(&workflow).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        let restored = &loaded[0];
        assert_eq!(restored.id, workflow.id);
        assert_eq!(restored.status, WorkflowStatus::Completed);
        assert_eq!(restored.stats.total_watch_secs, 900);
        assert_eq!(restored.stats.total_posts, 3);
        assert_eq!(restored.device_ids, workflow.device_ids);
    }

    #[tokio::test]
    async fn test_file_store_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWorkflowStore::new(dir.path()).unwrap();

        let workflow = sample_workflow();
        store.save(&workflow).await.unwrap();
        store.delete(workflow.id).await.unwrap();
        assert!(store.load().await.unwrap().is_empty());

        // Deleting again is fine
        store.delete(workflow.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWorkflowStore::new(dir.path()).unwrap();

        store.save(&sample_workflow()).await.unwrap();
        tokio::fs::write(dir.path().join("workflows/broken.json"), "{not json")
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_reports() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWorkflowStore::new(dir.path()).unwrap();

        let workflow = sample_workflow();
        let report = WorkflowReport::from_workflow(&workflow, Utc::now());
        store.save_report(&report).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path().join("reports")).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        assert!(entry
            .file_name()
            .to_string_lossy()
            .starts_with(&workflow.id.to_string()));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryWorkflowStore::new();
        let workflow = sample_workflow();

        store.save(&workflow).await.unwrap();
        assert_eq!(store.workflow_count().await, 1);
        assert_eq!(store.load().await.unwrap().len(), 1);

        store
            .save_report(&WorkflowReport::from_workflow(&workflow, Utc::now()))
            .await
            .unwrap();
        assert_eq!(store.reports().await.len(), 1);

        store.delete(workflow.id).await.unwrap();
        assert_eq!(store.workflow_count().await, 0);
    }
}
