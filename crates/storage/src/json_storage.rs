//! JSON file snapshot store.
//!
//! Writes the whole snapshot as one pretty-printed document. The write goes
//! to a sibling temp file first and is renamed into place, so a crash never
//! leaves a half-written snapshot behind.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use crate::snapshot::QueueSnapshot;
use super::{Result, SnapshotStore};

/// File-based JSON snapshot store.
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    /// Store snapshots at `path`. Parent directories are created on save.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), tasks = snapshot.tasks.len(), "Saved queue snapshot");
        Ok(())
    }

    async fn load(&self) -> Result<Option<QueueSnapshot>> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: QueueSnapshot = serde_json::from_str(&json)?;
        snapshot.check_version()?;
        Ok(Some(snapshot))
    }
}

/// In-memory snapshot store, for tests and embedding.
#[derive(Default)]
pub struct MemorySnapshotStore {
    latest: Mutex<Option<QueueSnapshot>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &QueueSnapshot) -> Result<()> {
        *self.latest.lock().await = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<QueueSnapshot>> {
        let latest = self.latest.lock().await.clone();
        if let Some(snapshot) = &latest {
            snapshot.check_version()?;
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;
    use orchestra_core::{
        BranchCondition, ErrorCategory, NewTask, Priority, RiskLevel, Task, TaskError, TaskStatus,
        TaskTemplate,
    };
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("state").join("queue.json"));

        let task = Task::from_new(NewTask::new("index repo", "noop"), 3);
        let snapshot = QueueSnapshot::new(vec![task.clone()]);
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].id, task.id);
        assert_eq!(loaded.tasks[0].description, "index repo");
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("queue.json"));
        let now = chrono::Utc::now();

        let mut parent = Task::from_new(NewTask::new("parent", "noop"), 3);
        parent.sequence = 0;

        let mut retrying = Task::from_new(
            NewTask::new("retrying", "echo")
                .with_params(json!({"path": "src", "depth": [1, 2]}))
                .with_priority(Priority::Critical)
                .with_risk(RiskLevel::High)
                .with_confidence(0.75)
                .with_max_attempts(5)
                .depends_on(parent.id)
                .with_branch(BranchCondition::ResultEquals(json!("ok")), TaskTemplate::new("follow up", "noop"))
                .with_branch(BranchCondition::Failure, TaskTemplate::new("cleanup", "noop")),
            3,
        );
        retrying.sequence = 1;
        retrying.status = TaskStatus::Failed;
        retrying.attempt_count = 2;
        retrying.result = Some(json!({"partial": true}));
        retrying.error = Some(TaskError::new(ErrorCategory::ActionError, "connection reset"));
        retrying.retry_at = Some(now);
        retrying.parent_id = Some(parent.id);
        retrying.execution_time_ms = Some(42);
        retrying.started_at = Some(now);
        retrying.completed_at = Some(now);

        let mut completed = Task::from_new(NewTask::new("completed", "noop"), 3);
        completed.sequence = 2;
        completed.status = TaskStatus::Completed;
        completed.attempt_count = 1;
        completed.result = Some(json!("ok"));
        completed.branches_fired = true;
        completed.completed_at = Some(now);

        let mut failed = Task::from_new(NewTask::new("failed", "fail").with_priority(Priority::Low), 3);
        failed.sequence = 3;
        failed.status = TaskStatus::Failed;
        failed.attempt_count = 3;
        failed.error = Some(TaskError::new(ErrorCategory::ActionPanicked, "index out of bounds"));
        failed.branches_fired = true;
        failed.recovered = true;

        let snapshot = QueueSnapshot::new(vec![failed, completed, retrying, parent]);
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        let order: Vec<u64> = loaded.tasks.iter().map(|t| t.sequence).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("missing.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_corrupt_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonSnapshotStore::new(&path);
        assert!(matches!(store.load().await, Err(StorageError::Json(_))));
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().await.unwrap().is_none());
        store.save(&QueueSnapshot::new(vec![])).await.unwrap();
        assert!(store.load().await.unwrap().is_some());
    }
}
