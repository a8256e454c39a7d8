//! Dependency resolution for tasks.

use orchestra_core::{Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use crate::store::TaskStore;

/// Result of dependency resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// All dependencies completed, ready to execute
    Ready,
    /// Waiting on these tasks (unfinished or unknown)
    Blocked(Vec<TaskId>),
    /// These dependencies ended without completing and never will
    Failed(Vec<TaskId>),
}

/// What happens to a task whose dependency failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedDependencyPolicy {
    /// The dependent stays pending forever
    #[default]
    Block,
    /// The dependent is skipped, and so are its own dependents
    Skip,
}

/// Resolves task dependencies against live store state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Create a new resolver.
    pub fn new() -> Self {
        Self
    }

    /// Check whether a task's dependencies are satisfied.
    ///
    /// An unknown id counts as unmet. Terminally failed and skipped
    /// dependencies are reported separately so a policy can act on them.
    pub fn check(&self, task: &Task, store: &TaskStore) -> Resolution {
        let mut blocked = Vec::new();
        let mut failed = Vec::new();

        for dep_id in &task.dependencies {
            match store.get(dep_id) {
                Some(dep) if dep.status == TaskStatus::Completed => {}
                Some(dep) if dep.is_terminal() => failed.push(*dep_id),
                // Unknown, pending, running or waiting on a retry
                _ => blocked.push(*dep_id),
            }
        }

        if !failed.is_empty() {
            Resolution::Failed(failed)
        } else if !blocked.is_empty() {
            Resolution::Blocked(blocked)
        } else {
            Resolution::Ready
        }
    }

    /// Whether every dependency has completed.
    pub fn is_eligible(&self, task: &Task, store: &TaskStore) -> bool {
        self.check(task, store) == Resolution::Ready
    }
}

/// A dependency graph over a set of tasks.
pub struct DependencyGraph {
    /// task -> [dependencies]
    graph: HashMap<TaskId, Vec<TaskId>>,
    /// task -> [dependents]
    reverse: HashMap<TaskId, Vec<TaskId>>,
    /// All task ids, in creation order
    nodes: Vec<TaskId>,
}

impl DependencyGraph {
    /// Build a graph. Edges to ids outside the set are ignored.
    pub fn build<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut tasks: Vec<&Task> = tasks.into_iter().collect();
        tasks.sort_by_key(|t| t.sequence);

        let known: HashSet<TaskId> = tasks.iter().map(|t| t.id).collect();
        let mut graph: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        let mut reverse: HashMap<TaskId, Vec<TaskId>> = HashMap::new();

        for task in &tasks {
            for dep in task.dependencies.iter().filter(|d| known.contains(d)) {
                graph.entry(task.id).or_default().push(*dep);
                reverse.entry(*dep).or_default().push(task.id);
            }
        }

        Self {
            graph,
            reverse,
            nodes: tasks.iter().map(|t| t.id).collect(),
        }
    }

    /// Task ids with dependencies before dependents.
    ///
    /// On a cycle, returns `Err` with every id that could not be ordered
    /// (the cycle members and anything downstream of them).
    pub fn topological_order(&self) -> Result<Vec<TaskId>, Vec<TaskId>> {
        let mut in_degree: HashMap<TaskId, usize> = self
            .nodes
            .iter()
            .map(|id| (*id, self.graph.get(id).map(Vec::len).unwrap_or(0)))
            .collect();

        let mut ready: VecDeque<TaskId> = self
            .nodes
            .iter()
            .filter(|id| in_degree[*id] == 0)
            .copied()
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            sorted.push(id);
            if let Some(dependents) = self.reverse.get(&id) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if sorted.len() == self.nodes.len() {
            Ok(sorted)
        } else {
            let placed: HashSet<TaskId> = sorted.into_iter().collect();
            Err(self.nodes.iter().filter(|id| !placed.contains(id)).copied().collect())
        }
    }

    /// Direct dependents of a task.
    pub fn dependents(&self, id: &TaskId) -> &[TaskId] {
        self.reverse.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}
