//! Point-in-time status report.

use orchestra_core::{Priority, TaskId, TaskStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Synchronous view of the queue, for dashboards and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Task count per status; every status is present
    pub counts: BTreeMap<TaskStatus, usize>,
    /// Ids currently running
    pub executing: Vec<TaskId>,
    /// Pending tasks per priority; every priority is present
    pub backlog: BTreeMap<Priority, usize>,
    /// Tasks not yet terminal
    pub remaining: usize,
    /// Failed tasks waiting on a retry timer
    pub retries_scheduled: usize,
}

impl StatusReport {
    /// Count for one status.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Total number of tasks.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tasks: {} ({} remaining)", self.total(), self.remaining)?;
        for (status, count) in &self.counts {
            writeln!(f, "  {:<12} {}", status.as_str(), count)?;
        }
        writeln!(f, "Backlog:")?;
        for (priority, count) in &self.backlog {
            writeln!(f, "  {:<12} {}", priority.as_str(), count)?;
        }
        if !self.executing.is_empty() {
            writeln!(f, "Executing: {}", self.executing.len())?;
        }
        if self.retries_scheduled > 0 {
            writeln!(f, "Retries scheduled: {}", self.retries_scheduled)?;
        }
        Ok(())
    }
}
