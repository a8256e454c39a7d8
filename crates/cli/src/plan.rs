//! Plan files: a list of tasks keyed by local names.
//!
//! ```json
//! {
//!   "tasks": [
//!     { "name": "fetch", "action": "command", "params": { "program": "git", "args": ["pull"] } },
//!     { "name": "test", "action": "command", "depends_on": ["fetch"], "priority": "HIGH",
//!       "branches": [{ "condition": { "kind": "failure" },
//!                      "template": { "description": "notify", "action_name": "echo" } }] }
//!   ]
//! }
//! ```

use anyhow::{anyhow, bail, Context, Result};
use orchestra_core::{
    ConditionalBranch, NewTask, Priority, RiskLevel, TaskId, DEFAULT_MAX_ATTEMPTS,
};
use orchestra_execution::{DependencyGraph, ExecutionEngine, TaskStore};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// A set of tasks to submit together.
#[derive(Debug, Deserialize)]
pub struct Plan {
    /// Task entries
    pub tasks: Vec<PlanTask>,
}

/// One task in a plan.
#[derive(Debug, Deserialize)]
pub struct PlanTask {
    /// Local name, referenced by `depends_on`
    pub name: String,
    /// Description; the name when absent
    #[serde(default)]
    pub description: Option<String>,
    /// Registered action name
    pub action: String,
    /// Action parameters
    #[serde(default)]
    pub params: Value,
    /// Scheduling priority
    #[serde(default)]
    pub priority: Priority,
    /// Risk classification
    #[serde(default)]
    pub risk_level: RiskLevel,
    /// Confidence in [0, 1]
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Attempt budget override
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Names of tasks that must complete first
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Outcome-triggered follow-ups
    #[serde(default)]
    pub branches: Vec<ConditionalBranch>,
}

impl PlanTask {
    fn to_new_task(&self, dependencies: Vec<TaskId>) -> NewTask {
        let mut new = NewTask::new(
            self.description.clone().unwrap_or_else(|| self.name.clone()),
            self.action.clone(),
        )
        .with_params(self.params.clone())
        .with_priority(self.priority)
        .with_risk(self.risk_level);

        if let Some(confidence) = self.confidence {
            new = new.with_confidence(confidence);
        }
        if let Some(max_attempts) = self.max_attempts {
            new = new.with_max_attempts(max_attempts);
        }
        new.dependencies = dependencies;
        new.conditional_branches = self.branches.clone();
        new
    }
}

impl Plan {
    /// Read a plan from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid plan {}", path.display()))
    }

    /// Entries with dependencies before dependents.
    ///
    /// Fails on duplicate names, unknown references and cycles.
    pub fn order(&self) -> Result<Vec<&PlanTask>> {
        let mut store = TaskStore::new();
        let mut ids: HashMap<&str, TaskId> = HashMap::new();
        let mut entries: HashMap<TaskId, &PlanTask> = HashMap::new();

        for entry in &self.tasks {
            let id = store.insert(NewTask::new(&entry.name, &entry.action), DEFAULT_MAX_ATTEMPTS);
            if ids.insert(entry.name.as_str(), id).is_some() {
                bail!("duplicate task name '{}'", entry.name);
            }
            entries.insert(id, entry);
        }

        for entry in &self.tasks {
            let deps = entry
                .depends_on
                .iter()
                .map(|dep| {
                    ids.get(dep.as_str())
                        .copied()
                        .ok_or_else(|| anyhow!("task '{}' depends on unknown task '{}'", entry.name, dep))
                })
                .collect::<Result<Vec<_>>>()?;
            if let Some(task) = ids.get(entry.name.as_str()).and_then(|id| store.get_mut(id)) {
                task.dependencies = deps;
            }
        }

        match DependencyGraph::build(store.iter()).topological_order() {
            Ok(order) => Ok(order.iter().filter_map(|id| entries.get(id).copied()).collect()),
            Err(stuck) => {
                let names: Vec<&str> = stuck
                    .iter()
                    .filter_map(|id| entries.get(id).map(|e| e.name.as_str()))
                    .collect();
                bail!("dependency cycle among: {}", names.join(", "))
            }
        }
    }

    /// Add every task to the engine; returns the id assigned to each name.
    pub fn submit(&self, engine: &ExecutionEngine) -> Result<HashMap<String, TaskId>> {
        let mut submitted: HashMap<String, TaskId> = HashMap::new();

        for entry in self.order()? {
            let deps = entry
                .depends_on
                .iter()
                .filter_map(|dep| submitted.get(dep).copied())
                .collect();
            let id = engine
                .add_task(entry.to_new_task(deps))
                .with_context(|| format!("rejected task '{}'", entry.name))?;
            tracing::debug!(name = %entry.name, task_id = %id, "Submitted plan task");
            submitted.insert(entry.name.clone(), id);
        }

        Ok(submitted)
    }
}
