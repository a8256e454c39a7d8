//! Task selection strategies.

use orchestra_core::{Task, TaskId, TaskStatus};
use std::collections::HashSet;
use crate::dependency::DependencyResolver;
use crate::store::TaskStore;

/// Strategy for selecting the next task to execute.
///
/// Called with the engine lock held, against live state.
pub trait TaskSelector: Send + Sync {
    /// Pick the next task to dispatch, if any is eligible.
    fn select_next(&self, store: &TaskStore, executing: &HashSet<TaskId>) -> Option<TaskId>;
}

/// Default selector: lowest priority rank first, then oldest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrioritySelector {
    resolver: DependencyResolver,
}

impl PrioritySelector {
    /// Create a new priority selector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every eligible task, in dispatch order.
    pub fn ready_tasks(&self, store: &TaskStore, executing: &HashSet<TaskId>) -> Vec<TaskId> {
        let mut ready: Vec<&Task> = self.candidates(store, executing).collect();
        ready.sort_by_key(|t| sort_key(t));
        ready.into_iter().map(|t| t.id).collect()
    }

    fn candidates<'a>(
        &'a self,
        store: &'a TaskStore,
        executing: &'a HashSet<TaskId>,
    ) -> impl Iterator<Item = &'a Task> + 'a {
        store.iter().filter(move |t| {
            t.status == TaskStatus::Pending
                && !executing.contains(&t.id)
                && self.resolver.is_eligible(t, store)
        })
    }
}

fn sort_key(task: &Task) -> (u8, orchestra_core::Time, u64) {
    (task.priority.rank(), task.created_at, task.sequence)
}

impl TaskSelector for PrioritySelector {
    fn select_next(&self, store: &TaskStore, executing: &HashSet<TaskId>) -> Option<TaskId> {
        self.candidates(store, executing)
            .min_by_key(|t| sort_key(t))
            .map(|t| t.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::{NewTask, Priority};

    #[test]
    fn test_lowest_rank_wins() {
        let mut store = TaskStore::new();
        store.insert(NewTask::new("a", "noop").with_priority(Priority::High), 3);
        let b = store.insert(NewTask::new("b", "noop").with_priority(Priority::Critical), 3);
        store.insert(NewTask::new("c", "noop").with_priority(Priority::Low), 3);

        let selected = PrioritySelector::new().select_next(&store, &HashSet::new());
        assert_eq!(selected, Some(b));
    }

    #[test]
    fn test_ties_break_fifo() {
        let mut store = TaskStore::new();
        let first = store.insert(NewTask::new("first", "noop"), 3);
        let second = store.insert(NewTask::new("second", "noop"), 3);

        let selector = PrioritySelector::new();
        assert_eq!(selector.ready_tasks(&store, &HashSet::new()), vec![first, second]);
    }

    #[test]
    fn test_skips_executing_and_blocked() {
        let mut store = TaskStore::new();
        let a = store.insert(NewTask::new("a", "noop").with_priority(Priority::Critical), 3);
        store.insert(NewTask::new("b", "noop").with_priority(Priority::Critical).depends_on(a), 3);
        let c = store.insert(NewTask::new("c", "noop").with_priority(Priority::Background), 3);

        let executing: HashSet<TaskId> = [a].into_iter().collect();
        assert_eq!(PrioritySelector::new().select_next(&store, &executing), Some(c));
    }

    #[test]
    fn test_nothing_pending() {
        let mut store = TaskStore::new();
        let a = store.insert(NewTask::new("a", "noop"), 3);
        store.get_mut(&a).unwrap().status = TaskStatus::Completed;
        assert_eq!(PrioritySelector::new().select_next(&store, &HashSet::new()), None);
    }
}
