//! Task model - the core unit of work in Orchestra.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::id::TaskId;
use crate::Time;

/// Default number of attempts a task gets before it fails permanently.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Error returned when parsing one of the task enums from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseError {
    /// What was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

/// A task represents a unit of work that can be executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Informational description
    pub description: String,

    /// Registry key of the action to run
    pub action_name: String,

    /// Parameters handed to the action
    #[serde(default)]
    pub action_params: Value,

    /// Scheduling priority
    pub priority: Priority,

    /// Risk classification
    pub risk_level: RiskLevel,

    /// Caller-supplied confidence in [0, 1]
    pub confidence_score: f64,

    /// Tasks that must complete before this one is eligible
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    /// Outcome-triggered follow-up rules
    #[serde(default)]
    pub conditional_branches: Vec<ConditionalBranch>,

    /// Current status
    pub status: TaskStatus,

    /// Number of dispatches started so far
    pub attempt_count: u32,

    /// Upper bound on dispatches
    pub max_attempts: u32,

    /// Value returned by the last successful run
    #[serde(default)]
    pub result: Option<Value>,

    /// Last failure, if any
    #[serde(default)]
    pub error: Option<TaskError>,

    /// Creation order within a store, used as a FIFO tie-break
    #[serde(default)]
    pub sequence: u64,

    /// Task whose branch spawned this one
    #[serde(default)]
    pub parent_id: Option<TaskId>,

    /// Whether the conditional branches have been evaluated
    #[serde(default)]
    pub branches_fired: bool,

    /// When a scheduled retry flips the task back to pending
    #[serde(default)]
    pub retry_at: Option<Time>,

    /// Set when the task was reset from an interrupted run on load
    #[serde(default)]
    pub recovered: bool,

    /// Duration of the last run
    #[serde(default)]
    pub execution_time_ms: Option<u64>,

    /// Creation timestamp
    pub created_at: Time,

    /// Last update timestamp
    pub updated_at: Time,

    /// Start of the last run
    #[serde(default)]
    pub started_at: Option<Time>,

    /// End of the last run
    #[serde(default)]
    pub completed_at: Option<Time>,
}

impl Task {
    /// Build a fresh pending task from a creation request.
    pub fn from_new(new: NewTask, default_max_attempts: u32) -> Self {
        let now = chrono::Utc::now();
        let mut dependencies: Vec<TaskId> = Vec::with_capacity(new.dependencies.len());
        for dep in new.dependencies {
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        Self {
            id: TaskId::new(),
            description: new.description,
            action_name: new.action_name,
            action_params: new.action_params,
            priority: new.priority,
            risk_level: new.risk_level,
            confidence_score: new.confidence_score,
            dependencies,
            conditional_branches: new.conditional_branches,
            status: TaskStatus::Pending,
            attempt_count: 0,
            max_attempts: new.max_attempts.unwrap_or(default_max_attempts).max(1),
            result: None,
            error: None,
            sequence: 0,
            parent_id: new.parent_id,
            branches_fired: false,
            retry_at: None,
            recovered: false,
            execution_time_ms: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Whether the task has reached a final state.
    ///
    /// A failed task with a retry scheduled is not terminal yet.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Completed | TaskStatus::Skipped => true,
            TaskStatus::Failed => self.retry_at.is_none(),
            TaskStatus::Pending | TaskStatus::InProgress => false,
        }
    }

    /// Whether a deferred retry is waiting to flip this task back to pending.
    pub fn is_retry_pending(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_at.is_some()
    }

    /// Move to `next`, enforcing the state machine.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = chrono::Utc::now();
        Ok(())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from} to {to}")]
pub struct InvalidTransition {
    /// Status before the attempted change
    pub from: TaskStatus,
    /// Requested status
    pub to: TaskStatus,
}

/// Request to create a task.
///
/// Built by the controlling agent (or a branch template) and turned into a
/// [`Task`] by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    /// Informational description
    pub description: String,

    /// Registry key of the action to run
    pub action_name: String,

    /// Parameters handed to the action
    #[serde(default)]
    pub action_params: Value,

    /// Scheduling priority
    #[serde(default)]
    pub priority: Priority,

    /// Risk classification
    #[serde(default)]
    pub risk_level: RiskLevel,

    /// Caller-supplied confidence in [0, 1]
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,

    /// Tasks that must complete first
    #[serde(default)]
    pub dependencies: Vec<TaskId>,

    /// Outcome-triggered follow-up rules
    #[serde(default)]
    pub conditional_branches: Vec<ConditionalBranch>,

    /// Override for the engine's default attempt budget
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Task whose branch produced this request
    #[serde(default)]
    pub parent_id: Option<TaskId>,
}

fn default_confidence() -> f64 {
    0.5
}

impl NewTask {
    /// Create a request with default priority, risk and confidence.
    pub fn new(description: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            action_name: action_name.into(),
            action_params: Value::Null,
            priority: Priority::default(),
            risk_level: RiskLevel::default(),
            confidence_score: default_confidence(),
            dependencies: Vec::new(),
            conditional_branches: Vec::new(),
            max_attempts: None,
            parent_id: None,
        }
    }

    /// Set action parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.action_params = params;
        self
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set risk level.
    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    /// Set confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence;
        self
    }

    /// Add a dependency.
    pub fn depends_on(mut self, id: TaskId) -> Self {
        self.dependencies.push(id);
        self
    }

    /// Add a conditional branch.
    pub fn with_branch(mut self, condition: BranchCondition, template: TaskTemplate) -> Self {
        self.conditional_branches.push(ConditionalBranch { condition, template });
        self
    }

    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Five-level priority. Lower rank runs sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Rank 1
    Critical = 1,
    /// Rank 2
    High = 2,
    /// Rank 3
    #[default]
    Medium = 3,
    /// Rank 4
    Low = 4,
    /// Rank 5
    Background = 5,
}

impl Priority {
    /// All priorities, most urgent first.
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Background,
    ];

    /// Numeric rank (1 = most urgent).
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
            Priority::Background => "BACKGROUND",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" | "1" => Ok(Priority::Critical),
            "HIGH" | "2" => Ok(Priority::High),
            "MEDIUM" | "3" => Ok(Priority::Medium),
            "LOW" | "4" => Ok(Priority::Low),
            "BACKGROUND" | "5" => Ok(Priority::Background),
            _ => Err(ParseError { kind: "priority", value: s.to_string() }),
        }
    }
}

/// Risk classification of a task or action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Safe to run unattended
    #[default]
    Low,
    /// Needs some care
    Medium,
    /// Replaced by a no-op in dry-run mode
    High,
}

impl RiskLevel {
    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            _ => Err(ParseError { kind: "risk level", value: s.to_string() }),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting for dispatch
    Pending,
    /// Currently executing
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Will never run
    Skipped,
}

impl TaskStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Skipped,
    ];

    /// Whether the state machine allows `self -> next`.
    ///
    /// `Failed -> Pending` is the bounded retry edge; callers must check the
    /// attempt budget. `InProgress -> Pending` is only used by snapshot
    /// recovery and is not listed here.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::Pending, TaskStatus::Skipped)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
                | (TaskStatus::Failed, TaskStatus::Pending)
        )
    }

    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Skipped => "SKIPPED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            "SKIPPED" => Ok(TaskStatus::Skipped),
            _ => Err(ParseError { kind: "status", value: s.to_string() }),
        }
    }
}

/// Failure attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Error category
    pub category: ErrorCategory,
    /// Captured message
    pub message: String,
}

impl TaskError {
    /// Create a new task error.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self { category, message: message.into() }
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// Category of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// No action registered under the task's action name
    ActionNotFound,
    /// The action returned an error
    ActionError,
    /// The action panicked
    ActionPanicked,
    /// Skipped because a dependency failed
    DependencyFailed,
}

impl ErrorCategory {
    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::ActionNotFound => "ActionNotFound",
            ErrorCategory::ActionError => "ActionError",
            ErrorCategory::ActionPanicked => "ActionPanicked",
            ErrorCategory::DependencyFailed => "DependencyFailed",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outcome-triggered rule that spawns a task from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalBranch {
    /// When the branch fires
    pub condition: BranchCondition,
    /// What it spawns
    pub template: TaskTemplate,
}

/// Condition evaluated against a terminal task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BranchCondition {
    /// Task completed
    Success,
    /// Task failed permanently
    Failure,
    /// Result equals the value
    ResultEquals(Value),
    /// Result contains the value
    ResultContains(Value),
}

impl BranchCondition {
    /// Evaluate against a terminal status and result.
    pub fn matches(&self, status: TaskStatus, result: Option<&Value>) -> bool {
        match self {
            BranchCondition::Success => status == TaskStatus::Completed,
            BranchCondition::Failure => status == TaskStatus::Failed,
            BranchCondition::ResultEquals(expected) => result == Some(expected),
            BranchCondition::ResultContains(needle) => {
                result.map(|r| value_contains(r, needle)).unwrap_or(false)
            }
        }
    }
}

fn value_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
        (Value::Array(items), n) => items.contains(n),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

/// Blueprint for a task spawned by a branch.
///
/// Children never inherit their parent's branches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    /// Informational description
    pub description: String,

    /// Registry key of the action to run
    pub action_name: String,

    /// Parameters handed to the action
    #[serde(default)]
    pub action_params: Value,

    /// Priority; the parent's when absent
    #[serde(default)]
    pub priority: Option<Priority>,

    /// Risk classification
    #[serde(default)]
    pub risk_level: RiskLevel,

    /// Caller-supplied confidence
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,

    /// Attempt budget override
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Extra dependencies for the child
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

impl TaskTemplate {
    /// Create a template with defaults.
    pub fn new(description: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            action_name: action_name.into(),
            action_params: Value::Null,
            priority: None,
            risk_level: RiskLevel::default(),
            confidence_score: default_confidence(),
            max_attempts: None,
            dependencies: Vec::new(),
        }
    }

    /// Turn the template into a creation request for a child of `parent`.
    pub fn instantiate(&self, parent: &Task) -> NewTask {
        NewTask {
            description: self.description.clone(),
            action_name: self.action_name.clone(),
            action_params: self.action_params.clone(),
            priority: self.priority.unwrap_or(parent.priority),
            risk_level: self.risk_level,
            confidence_score: self.confidence_score,
            dependencies: self.dependencies.clone(),
            conditional_branches: Vec::new(),
            max_attempts: self.max_attempts,
            parent_id: Some(parent.id),
        }
    }
}
