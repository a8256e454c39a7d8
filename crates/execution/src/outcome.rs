//! Outcome calibration logging.

use orchestra_core::{OutcomeRecord, Task};
use orchestra_storage::OutcomeSink;
use std::sync::Arc;

/// Builds calibration records and hands them to a sink.
///
/// Records are built under the engine lock and emitted after it is
/// released, so a slow sink never stalls dispatch.
#[derive(Clone)]
pub struct OutcomeLogger {
    sink: Option<Arc<dyn OutcomeSink>>,
    threshold: f64,
}

impl OutcomeLogger {
    /// Create a logger with the given prediction threshold.
    pub fn new(threshold: f64) -> Self {
        Self { sink: None, threshold }
    }

    /// Also persist records to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Record for a task that just reached a terminal state.
    pub fn record(&self, task: &Task) -> OutcomeRecord {
        OutcomeRecord::from_task(task, self.threshold)
    }

    /// Log each record and append it to the sink.
    ///
    /// Sink failures are logged and otherwise ignored.
    pub async fn emit(&self, records: Vec<OutcomeRecord>) {
        for record in records {
            tracing::info!(
                task_id = %record.task_id,
                status = %record.status,
                confidence = record.confidence_score,
                bucket = %record.calibration_bucket,
                predicted_success = record.predicted_success,
                actual_success = record.actual_success,
                attempts = record.attempts,
                "Task outcome"
            );

            if let Some(sink) = &self.sink {
                if let Err(e) = sink.append(&record).await {
                    tracing::warn!(task_id = %record.task_id, error = %e, "Failed to write outcome record");
                }
            }
        }
    }
}

impl std::fmt::Debug for OutcomeLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeLogger")
            .field("threshold", &self.threshold)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::{NewTask, TaskStatus};
    use orchestra_storage::MemoryOutcomeLog;

    #[tokio::test]
    async fn test_emit_appends_to_sink() {
        let sink = Arc::new(MemoryOutcomeLog::new());
        let logger = OutcomeLogger::new(0.7).with_sink(sink.clone());

        let mut task = orchestra_core::Task::from_new(NewTask::new("a", "noop").with_confidence(0.65), 3);
        task.status = TaskStatus::Failed;
        let record = logger.record(&task);
        assert!(!record.predicted_success);
        assert!(!record.actual_success);
        assert_eq!(record.calibration_bucket, "[0.6-0.7)");

        logger.emit(vec![record]).await;
        assert_eq!(sink.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_emit_without_sink_is_fine() {
        let logger = OutcomeLogger::new(0.7);
        let mut task = orchestra_core::Task::from_new(NewTask::new("a", "noop"), 3);
        task.status = TaskStatus::Completed;
        let record = logger.record(&task);
        logger.emit(vec![record]).await;
    }
}
