//! Engine errors.
//!
//! Only synchronous problems surface here. A task that fails while running
//! is reported through its status and the outcome log, never as an error to
//! whoever added it.

use orchestra_core::{InvalidTransition, TaskId};
use orchestra_storage::StorageError;
use crate::config::ConfigError;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by the execution engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Confidence outside [0, 1]
    #[error("confidence score must be within [0, 1], got {0}")]
    InvalidConfidence(f64),

    /// Attempt budget of zero
    #[error("max_attempts must be at least 1")]
    InvalidMaxAttempts,

    /// No task with that id
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// Dependency id not in the store
    #[error("task depends on unknown task {0}")]
    UnknownDependency(TaskId),

    /// Dependency graph contains a cycle
    #[error("dependency cycle among tasks: {0:?}")]
    DependencyCycle(Vec<TaskId>),

    /// Rejected state change
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Task is currently executing
    #[error("task {0} is executing")]
    TaskExecuting(TaskId),

    /// `start` called twice
    #[error("engine is already running")]
    AlreadyRunning,

    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Snapshot persistence failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
