//! Storage trait abstraction.

use async_trait::async_trait;
use orchestra_core::OutcomeRecord;
use crate::snapshot::QueueSnapshot;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot written by a newer format
    #[error("unsupported snapshot version {found} (this build reads up to {supported})")]
    UnsupportedVersion {
        /// Version in the document
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Durable home for queue snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, replacing the previous one.
    async fn save(&self, snapshot: &QueueSnapshot) -> Result<()>;

    /// Load the latest snapshot, if any.
    async fn load(&self) -> Result<Option<QueueSnapshot>>;
}

/// Consumer of outcome records.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    /// Append one record.
    async fn append(&self, record: &OutcomeRecord) -> Result<()>;
}
