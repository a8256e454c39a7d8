//! Conditional branch expansion.

use orchestra_core::{NewTask, Task};

/// Turns a terminal task's matching branches into child task requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchExpander;

impl BranchExpander {
    /// Create a new expander.
    pub fn new() -> Self {
        Self
    }

    /// Evaluate the branches of a task that just reached a terminal state.
    ///
    /// Every matching branch fires, in declaration order. Branches are
    /// evaluated at most once per task: a second call returns nothing.
    pub fn expand(&self, task: &mut Task) -> Vec<NewTask> {
        if task.branches_fired || !task.is_terminal() {
            return Vec::new();
        }
        task.branches_fired = true;

        let children: Vec<NewTask> = task
            .conditional_branches
            .iter()
            .filter(|b| b.condition.matches(task.status, task.result.as_ref()))
            .map(|b| b.template.instantiate(task))
            .collect();

        if !children.is_empty() {
            tracing::debug!(task_id = %task.id, count = children.len(), "Branches fired");
        }
        children
    }
}
