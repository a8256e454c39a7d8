//! Versioned dump of the task table.

use orchestra_core::{Task, TaskId, Time};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use crate::trait_::{Result, StorageError};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Point-in-time copy of every task, for recovery and inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Format version
    pub version: u32,
    /// When the snapshot was taken
    pub timestamp: Time,
    /// All tasks, in creation order
    pub tasks: Vec<Task>,
}

impl QueueSnapshot {
    /// Wrap a task list in a snapshot stamped now.
    pub fn new(mut tasks: Vec<Task>) -> Self {
        tasks.sort_by_key(|t| t.sequence);
        Self {
            version: SNAPSHOT_VERSION,
            timestamp: chrono::Utc::now(),
            tasks,
        }
    }

    /// Reject documents written by a newer format.
    pub fn check_version(&self) -> Result<()> {
        if self.version > SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }

    /// Drop terminal tasks that finished before `cutoff`.
    ///
    /// Tasks still named as a dependency of a non-terminal task are kept.
    /// Returns the number of tasks removed.
    pub fn prune_terminal_before(&mut self, cutoff: Time) -> usize {
        let referenced: HashSet<TaskId> = self
            .tasks
            .iter()
            .filter(|t| !t.is_terminal())
            .flat_map(|t| t.dependencies.iter().copied())
            .collect();

        let before = self.tasks.len();
        self.tasks.retain(|t| {
            let finished = t.completed_at.unwrap_or(t.updated_at);
            !t.is_terminal() || finished >= cutoff || referenced.contains(&t.id)
        });
        before - self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use orchestra_core::{NewTask, TaskStatus};

    fn task(status: TaskStatus, sequence: u64) -> Task {
        let mut task = Task::from_new(NewTask::new(format!("t{}", sequence), "noop"), 3);
        task.status = status;
        task.sequence = sequence;
        task
    }

    #[test]
    fn test_new_orders_by_sequence() {
        let snap = QueueSnapshot::new(vec![task(TaskStatus::Pending, 2), task(TaskStatus::Pending, 1)]);
        assert_eq!(snap.tasks[0].sequence, 1);
        assert_eq!(snap.version, SNAPSHOT_VERSION);
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut snap = QueueSnapshot::new(vec![]);
        snap.version = SNAPSHOT_VERSION + 1;
        assert!(matches!(snap.check_version(), Err(StorageError::UnsupportedVersion { .. })));
    }

    #[test]
    fn test_prune_keeps_referenced_and_live_tasks() {
        let old = chrono::Utc::now() - Duration::hours(2);

        let mut done = task(TaskStatus::Completed, 1);
        done.completed_at = Some(old);
        let mut needed = task(TaskStatus::Completed, 2);
        needed.completed_at = Some(old);
        let mut waiting = task(TaskStatus::Pending, 3);
        waiting.dependencies.push(needed.id);
        let fresh = {
            let mut t = task(TaskStatus::Failed, 4);
            t.completed_at = Some(chrono::Utc::now());
            t
        };

        let mut snap = QueueSnapshot::new(vec![done, needed.clone(), waiting, fresh]);
        let removed = snap.prune_terminal_before(chrono::Utc::now() - Duration::hours(1));

        assert_eq!(removed, 1);
        assert_eq!(snap.tasks.len(), 3);
        assert!(snap.tasks.iter().any(|t| t.id == needed.id));
    }
}
