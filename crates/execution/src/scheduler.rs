//! Concurrency budget for running actions.

use std::num::NonZeroUsize;

/// Budget for task execution.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// Max concurrent tasks
    pub max_concurrent: NonZeroUsize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_concurrent: NonZeroUsize::MIN,
        }
    }
}

impl Budget {
    /// Budget allowing `max` concurrent tasks (at least one).
    pub fn new(max: usize) -> Self {
        Self {
            max_concurrent: NonZeroUsize::new(max).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Set max concurrent tasks.
    pub fn with_max_concurrent(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrent = max;
        self
    }
}

/// Tracks how many actions are running against the budget.
#[derive(Debug)]
pub struct ResourceScheduler {
    budget: Budget,
    active_tasks: usize,
}

impl ResourceScheduler {
    /// Create a new scheduler.
    pub fn new(budget: Budget) -> Self {
        Self {
            budget,
            active_tasks: 0,
        }
    }

    /// Check if we can start a new task.
    pub fn can_start(&self) -> bool {
        self.active_tasks < self.budget.max_concurrent.get()
    }

    /// Register a task start.
    pub fn task_started(&mut self) {
        self.active_tasks += 1;
    }

    /// Register a task completion.
    pub fn task_completed(&mut self) {
        self.active_tasks = self.active_tasks.saturating_sub(1);
    }

    /// Number of running tasks.
    pub fn active(&self) -> usize {
        self.active_tasks
    }

    /// Free slots.
    pub fn available(&self) -> usize {
        self.budget.max_concurrent.get().saturating_sub(self.active_tasks)
    }
}

impl Default for ResourceScheduler {
    fn default() -> Self {
        Self::new(Budget::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_enforced() {
        let mut scheduler = ResourceScheduler::new(Budget::new(2));
        assert!(scheduler.can_start());
        scheduler.task_started();
        scheduler.task_started();
        assert!(!scheduler.can_start());
        assert_eq!(scheduler.available(), 0);

        scheduler.task_completed();
        assert!(scheduler.can_start());
        assert_eq!(scheduler.active(), 1);
    }

    #[test]
    fn test_zero_budget_clamps_to_one() {
        let scheduler = ResourceScheduler::new(Budget::new(0));
        assert_eq!(scheduler.available(), 1);
    }

    #[test]
    fn test_completion_never_underflows() {
        let mut scheduler = ResourceScheduler::default();
        scheduler.task_completed();
        assert_eq!(scheduler.active(), 0);
    }
}
