//! Line-delimited JSON outcome log with size-based rotation.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use orchestra_core::OutcomeRecord;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use super::{OutcomeSink, Result};

/// Default size at which the active log file is rotated.
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default number of rotated files kept next to the active one.
pub const DEFAULT_MAX_FILES: usize = 5;

struct LogState {
    file: Option<File>,
    size: u64,
}

/// Appends one JSON object per line to `path`.
///
/// When the next record would push the file past `max_bytes`, the file is
/// renamed to `path.1` (shifting older ones up to `path.{max_files}`) and a
/// fresh file is started.
pub struct JsonlOutcomeLog {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    state: Mutex<LogState>,
}

impl JsonlOutcomeLog {
    /// Log to `path` with default rotation limits.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_bytes: DEFAULT_MAX_BYTES,
            max_files: DEFAULT_MAX_FILES,
            state: Mutex::new(LogState { file: None, size: 0 }),
        }
    }

    /// Set the rotation threshold.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }

    /// Set how many rotated files to keep.
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Location of the active log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotated_path(&self, n: usize) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "outcomes.jsonl".into());
        name.push(format!(".{}", n));
        self.path.with_file_name(name)
    }

    async fn open(&self, state: &mut LogState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        state.size = file.metadata().await?.len();
        state.file = Some(file);
        Ok(())
    }

    async fn rotate(&self, state: &mut LogState) -> Result<()> {
        if let Some(mut file) = state.file.take() {
            file.flush().await?;
        }

        if self.max_files == 0 {
            remove_if_exists(&self.path).await?;
        } else {
            remove_if_exists(&self.rotated_path(self.max_files)).await?;
            for n in (1..self.max_files).rev() {
                rename_if_exists(&self.rotated_path(n), &self.rotated_path(n + 1)).await?;
            }
            rename_if_exists(&self.path, &self.rotated_path(1)).await?;
        }

        tracing::debug!(path = %self.path.display(), "Rotated outcome log");
        self.open(state).await
    }
}

#[async_trait]
impl OutcomeSink for JsonlOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut state = self.state.lock().await;
        if state.file.is_none() {
            self.open(&mut state).await?;
        }
        if state.size > 0 && state.size + line.len() as u64 > self.max_bytes {
            self.rotate(&mut state).await?;
        }

        let file = state
            .file
            .as_mut()
            .ok_or_else(|| crate::StorageError::Other("outcome log not open".to_string()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        state.size += line.len() as u64;
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn rename_if_exists(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Collects records in memory.
#[derive(Default)]
pub struct MemoryOutcomeLog {
    records: Mutex<Vec<OutcomeRecord>>,
}

impl MemoryOutcomeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub async fn records(&self) -> Vec<OutcomeRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl OutcomeSink for MemoryOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::{NewTask, Task, TaskStatus, DEFAULT_CONFIDENCE_THRESHOLD};

    fn record(description: &str) -> OutcomeRecord {
        let mut task = Task::from_new(NewTask::new(description, "noop").with_confidence(0.83), 3);
        task.status = TaskStatus::Completed;
        OutcomeRecord::from_task(&task, DEFAULT_CONFIDENCE_THRESHOLD)
    }

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlOutcomeLog::new(dir.path().join("outcomes.jsonl"));

        log.append(&record("a")).await.unwrap();
        log.append(&record("b")).await.unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["description"], "a");
        assert_eq!(parsed["calibration_bucket"], "[0.8-0.9)");
        assert_eq!(parsed["predicted_success"], true);
        assert_eq!(parsed["actual_success"], true);
    }

    #[tokio::test]
    async fn test_rotates_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.jsonl");
        let log = JsonlOutcomeLog::new(&path).with_max_bytes(64).with_max_files(2);

        for i in 0..4 {
            log.append(&record(&format!("task-{}", i))).await.unwrap();
        }

        // Every record is longer than 64 bytes, so each one lands in its own file.
        assert!(path.exists());
        assert!(log.rotated_path(1).exists());
        assert!(log.rotated_path(2).exists());
        assert!(!log.rotated_path(3).exists());

        let newest = std::fs::read_to_string(&path).unwrap();
        assert!(newest.contains("task-3"));
        let previous = std::fs::read_to_string(log.rotated_path(1)).unwrap();
        assert!(previous.contains("task-2"));
    }

    #[tokio::test]
    async fn test_reopens_existing_file_in_append_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.jsonl");

        JsonlOutcomeLog::new(&path).append(&record("first")).await.unwrap();
        JsonlOutcomeLog::new(&path).append(&record("second")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_memory_log_collects() {
        let log = MemoryOutcomeLog::new();
        log.append(&record("x")).await.unwrap();
        assert_eq!(log.records().await.len(), 1);
    }
}
