//! Orchestra core data models.
//!
//! This crate defines the task model shared by the execution engine, the
//! action registry and the persistence layer.

#![warn(missing_docs)]

// Core identities
mod id;

// Task model and calibration output
mod task;
mod outcome;

// Re-exports
pub use id::*;

pub use task::{
    Task, TaskStatus, Priority, RiskLevel, NewTask, TaskTemplate, ConditionalBranch,
    BranchCondition, TaskError, ErrorCategory, InvalidTransition, ParseError,
    DEFAULT_MAX_ATTEMPTS,
};
pub use outcome::{
    OutcomeRecord, bucket_index, calibration_bucket,
    CALIBRATION_BUCKETS, DEFAULT_CONFIDENCE_THRESHOLD,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
