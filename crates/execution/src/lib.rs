//! Execution layer - task store, selection, dependency resolution, retry,
//! branching and the dispatch loop.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod store;
pub mod selector;
pub mod dependency;
pub mod scheduler;
pub mod retry;
pub mod branch;
pub mod outcome;
pub mod status;
pub mod engine;

pub use config::{CompletionDetection, ConfigError, EngineConfig, DEFAULT_QUIET_MS};
pub use error::{EngineError, Result};
pub use store::TaskStore;
pub use selector::{PrioritySelector, TaskSelector};
pub use dependency::{DependencyGraph, DependencyResolver, FailedDependencyPolicy, Resolution};
pub use scheduler::{Budget, ResourceScheduler};
pub use retry::{RetryController, RetryDecision};
pub use branch::BranchExpander;
pub use outcome::OutcomeLogger;
pub use status::StatusReport;
pub use engine::{EngineBuilder, ExecutionEngine};
