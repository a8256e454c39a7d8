//! In-memory task table.

use orchestra_core::{ErrorCategory, NewTask, Priority, Task, TaskError, TaskId, TaskStatus};
use orchestra_storage::QueueSnapshot;
use std::collections::{BTreeMap, HashMap};

/// Tasks keyed by id, remembered in creation order.
///
/// Tasks are never removed during a session.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
    next_sequence: u64,
}

impl TaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot.
    ///
    /// Tasks caught mid-run are reset to pending and flagged `recovered`,
    /// unless the interrupted run was their last attempt: those fail for
    /// good. A retry that was waiting on its backoff becomes pending right
    /// away.
    pub fn from_snapshot(snapshot: QueueSnapshot) -> Self {
        let mut store = Self::new();
        for mut task in snapshot.tasks {
            if task.status == TaskStatus::InProgress {
                let now = chrono::Utc::now();
                task.recovered = true;
                task.updated_at = now;
                if task.attempt_count >= task.max_attempts {
                    tracing::warn!(
                        task_id = %task.id,
                        attempts = task.attempt_count,
                        "Recovered interrupted task with no attempts left, marking failed"
                    );
                    task.status = TaskStatus::Failed;
                    task.error = Some(TaskError::new(
                        ErrorCategory::ActionError,
                        "interrupted on its final attempt",
                    ));
                    task.completed_at = Some(now);
                } else {
                    tracing::warn!(task_id = %task.id, "Recovered interrupted task, resetting to pending");
                    task.status = TaskStatus::Pending;
                    task.started_at = None;
                }
            } else if task.is_retry_pending() {
                task.status = TaskStatus::Pending;
                task.retry_at = None;
                task.updated_at = chrono::Utc::now();
            }
            store.insert_task(task);
        }
        store
    }

    /// Create a task from a request and return its id.
    pub fn insert(&mut self, new: NewTask, default_max_attempts: u32) -> TaskId {
        let task = Task::from_new(new, default_max_attempts);
        let id = task.id;
        self.push(task, true);
        id
    }

    /// Insert an existing task, keeping its sequence number.
    pub fn insert_task(&mut self, task: Task) {
        self.push(task, false);
    }

    fn push(&mut self, mut task: Task, assign_sequence: bool) {
        if assign_sequence {
            task.sequence = self.next_sequence;
        }
        self.next_sequence = self.next_sequence.max(task.sequence + 1);

        let id = task.id;
        if self.tasks.insert(id, task).is_none() {
            self.order.push(id);
        }
    }

    /// Get a task by id.
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Get a mutable task by id.
    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Whether the id is known.
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tasks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> + '_ {
        self.order.iter().filter_map(move |id| self.tasks.get(id))
    }

    /// Number of tasks that have not reached a terminal state.
    pub fn non_terminal_count(&self) -> usize {
        self.iter().filter(|t| !t.is_terminal()).count()
    }

    /// Count per status; every status is present.
    pub fn count_by_status(&self) -> BTreeMap<TaskStatus, usize> {
        let mut counts: BTreeMap<TaskStatus, usize> =
            TaskStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for task in self.iter() {
            *counts.entry(task.status).or_default() += 1;
        }
        counts
    }

    /// Pending tasks per priority; every priority is present.
    pub fn pending_by_priority(&self) -> BTreeMap<Priority, usize> {
        let mut backlog: BTreeMap<Priority, usize> =
            Priority::ALL.iter().map(|p| (*p, 0)).collect();
        for task in self.iter().filter(|t| t.status == TaskStatus::Pending) {
            *backlog.entry(task.priority).or_default() += 1;
        }
        backlog
    }

    /// Snapshot of every task.
    pub fn to_snapshot(&self) -> QueueSnapshot {
        QueueSnapshot::new(self.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_increasing_sequence() {
        let mut store = TaskStore::new();
        let a = store.insert(NewTask::new("a", "noop"), 3);
        let b = store.insert(NewTask::new("b", "noop"), 3);
        assert!(store.get(&a).unwrap().sequence < store.get(&b).unwrap().sequence);
        let order: Vec<TaskId> = store.iter().map(|t| t.id).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn test_counts_and_backlog() {
        let mut store = TaskStore::new();
        store.insert(NewTask::new("a", "noop").with_priority(Priority::High), 3);
        store.insert(NewTask::new("b", "noop").with_priority(Priority::High), 3);
        let c = store.insert(NewTask::new("c", "noop").with_priority(Priority::Low), 3);
        store.get_mut(&c).unwrap().status = TaskStatus::Completed;

        let counts = store.count_by_status();
        assert_eq!(counts[&TaskStatus::Pending], 2);
        assert_eq!(counts[&TaskStatus::Completed], 1);
        assert_eq!(counts[&TaskStatus::Failed], 0);

        let backlog = store.pending_by_priority();
        assert_eq!(backlog[&Priority::High], 2);
        assert_eq!(backlog[&Priority::Low], 0);
        assert_eq!(store.non_terminal_count(), 2);
    }

    #[test]
    fn test_from_snapshot_normalizes_in_flight_tasks() {
        let mut store = TaskStore::new();
        let running = store.insert(NewTask::new("running", "noop"), 3);
        let waiting = store.insert(NewTask::new("retrying", "noop"), 3);
        let done = store.insert(NewTask::new("done", "noop"), 3);
        store.get_mut(&running).unwrap().status = TaskStatus::InProgress;
        {
            let task = store.get_mut(&waiting).unwrap();
            task.status = TaskStatus::Failed;
            task.attempt_count = 1;
            task.retry_at = Some(chrono::Utc::now());
        }
        store.get_mut(&done).unwrap().status = TaskStatus::Completed;

        let restored = TaskStore::from_snapshot(store.to_snapshot());

        let task = restored.get(&running).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.recovered);

        let task = restored.get(&waiting).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempt_count, 1);
        assert!(task.retry_at.is_none());

        assert_eq!(restored.get(&done).unwrap().status, TaskStatus::Completed);
        assert!(!restored.get(&done).unwrap().recovered);
    }

    #[test]
    fn test_from_snapshot_fails_interrupted_final_attempt() {
        let mut store = TaskStore::new();
        let last = store.insert(NewTask::new("last", "fail").with_max_attempts(3), 3);
        {
            let task = store.get_mut(&last).unwrap();
            task.status = TaskStatus::InProgress;
            task.attempt_count = 3;
        }

        let restored = TaskStore::from_snapshot(store.to_snapshot());
        let task = restored.get(&last).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.is_terminal());
        assert!(task.recovered);
        assert_eq!(task.attempt_count, 3);
        assert_eq!(task.error.as_ref().unwrap().category, ErrorCategory::ActionError);
        assert!(!task.branches_fired);
        assert_eq!(restored.non_terminal_count(), 0);
    }

    #[test]
    fn test_from_snapshot_changes_only_in_flight_tasks() {
        let mut store = TaskStore::new();
        let parent = store.insert(NewTask::new("parent", "noop"), 3);
        let running = store.insert(NewTask::new("running", "echo"), 3);
        let failed = store.insert(NewTask::new("failed", "fail"), 3);
        store.insert(NewTask::new("waiting", "noop").depends_on(parent).with_priority(Priority::Low), 3);
        store.get_mut(&parent).unwrap().status = TaskStatus::Completed;
        store.get_mut(&running).unwrap().status = TaskStatus::InProgress;
        store.get_mut(&running).unwrap().attempt_count = 1;
        store.get_mut(&failed).unwrap().status = TaskStatus::Failed;

        let snapshot = store.to_snapshot();
        let restored = TaskStore::from_snapshot(snapshot.clone());

        assert_eq!(restored.len(), snapshot.tasks.len());
        for before in &snapshot.tasks {
            let after = restored.get(&before.id).unwrap();
            if before.id == running {
                assert_eq!(after.status, TaskStatus::Pending);
                assert!(after.recovered);
            } else {
                assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn test_restored_store_continues_sequence() {
        let mut store = TaskStore::new();
        store.insert(NewTask::new("a", "noop"), 3);
        store.insert(NewTask::new("b", "noop"), 3);

        let mut restored = TaskStore::from_snapshot(store.to_snapshot());
        let c = restored.insert(NewTask::new("c", "noop"), 3);
        assert_eq!(restored.get(&c).unwrap().sequence, 2);
    }
}
