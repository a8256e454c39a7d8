//! Persistence for Orchestra: queue snapshots and the outcome log.
//!
//! Both are behind traits so the engine can be tested against in-memory
//! implementations; the file-backed ones write JSON.

#![warn(missing_docs)]

pub mod trait_;
pub mod snapshot;
pub mod json_storage;
pub mod outcome_log;

pub use trait_::{OutcomeSink, SnapshotStore, StorageError, Result};
pub use snapshot::{QueueSnapshot, SNAPSHOT_VERSION};
pub use json_storage::{JsonSnapshotStore, MemorySnapshotStore};
pub use outcome_log::{JsonlOutcomeLog, MemoryOutcomeLog};
