//! Calibration records emitted on terminal transitions.

use serde::{Deserialize, Serialize};
use crate::id::TaskId;
use crate::task::{ErrorCategory, Priority, RiskLevel, Task, TaskStatus};
use crate::Time;

/// Confidence at or above which a task is predicted to succeed.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Number of equal-width confidence bins.
pub const CALIBRATION_BUCKETS: usize = 10;

/// One line of the outcome log.
///
/// This is the only interface an external calibration consumer sees; the
/// engine never adjusts confidence itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Task the record is about
    pub task_id: TaskId,
    /// Task description
    pub description: String,
    /// Final status
    pub status: TaskStatus,
    /// Scheduling priority
    pub priority: Priority,
    /// Risk classification
    pub risk_level: RiskLevel,
    /// Caller-supplied confidence
    pub confidence_score: f64,
    /// Whether the confidence predicted success
    pub predicted_success: bool,
    /// Whether the task completed
    pub actual_success: bool,
    /// Confidence bin label, e.g. `[0.8-0.9)`
    pub calibration_bucket: String,
    /// Dispatches used
    pub attempts: u32,
    /// Duration of the final run
    pub execution_time_ms: Option<u64>,
    /// Category of the final error
    pub error_category: Option<ErrorCategory>,
    /// Branch origin
    pub parent_id: Option<TaskId>,
    /// When the record was produced
    pub timestamp: Time,
}

impl OutcomeRecord {
    /// Build a record for a task that just reached a terminal state.
    pub fn from_task(task: &Task, threshold: f64) -> Self {
        Self {
            task_id: task.id,
            description: task.description.clone(),
            status: task.status,
            priority: task.priority,
            risk_level: task.risk_level,
            confidence_score: task.confidence_score,
            predicted_success: task.confidence_score >= threshold,
            actual_success: task.status == TaskStatus::Completed,
            calibration_bucket: calibration_bucket(task.confidence_score),
            attempts: task.attempt_count,
            execution_time_ms: task.execution_time_ms,
            error_category: task.error.as_ref().map(|e| e.category),
            parent_id: task.parent_id,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Index of the confidence bin, 0..=9. Out-of-range input is clamped.
pub fn bucket_index(confidence: f64) -> usize {
    if !confidence.is_finite() || confidence <= 0.0 {
        return 0;
    }
    // Nudge so that e.g. 0.3 lands in bin 3 despite float error.
    let scaled = (confidence * CALIBRATION_BUCKETS as f64 + 1e-9).floor() as usize;
    scaled.min(CALIBRATION_BUCKETS - 1)
}

/// Label for the bin containing `confidence`.
pub fn calibration_bucket(confidence: f64) -> String {
    let idx = bucket_index(confidence);
    let lo = idx as f64 / CALIBRATION_BUCKETS as f64;
    let hi = (idx + 1) as f64 / CALIBRATION_BUCKETS as f64;
    let close = if idx == CALIBRATION_BUCKETS - 1 { ']' } else { ')' };
    format!("[{:.1}-{:.1}{}", lo, hi, close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;

    #[test]
    fn test_bucket_labels() {
        assert_eq!(calibration_bucket(0.83), "[0.8-0.9)");
        assert_eq!(calibration_bucket(0.0), "[0.0-0.1)");
        assert_eq!(calibration_bucket(0.3), "[0.3-0.4)");
        assert_eq!(calibration_bucket(0.7), "[0.7-0.8)");
        assert_eq!(calibration_bucket(0.95), "[0.9-1.0]");
        assert_eq!(calibration_bucket(1.0), "[0.9-1.0]");
    }

    #[test]
    fn test_bucket_index_clamps() {
        assert_eq!(bucket_index(-0.2), 0);
        assert_eq!(bucket_index(1.7), 9);
        assert_eq!(bucket_index(f64::NAN), 0);
    }

    #[test]
    fn test_record_for_confident_success() {
        let mut task = Task::from_new(NewTask::new("deploy", "noop").with_confidence(0.83), 3);
        task.status = TaskStatus::Completed;
        task.attempt_count = 1;

        let record = OutcomeRecord::from_task(&task, DEFAULT_CONFIDENCE_THRESHOLD);
        assert!(record.predicted_success);
        assert!(record.actual_success);
        assert_eq!(record.calibration_bucket, "[0.8-0.9)");
        assert_eq!(record.attempts, 1);
    }

    #[test]
    fn test_record_for_unconfident_failure() {
        let mut task = Task::from_new(NewTask::new("migrate", "noop").with_confidence(0.4), 3);
        task.status = TaskStatus::Failed;
        task.error = Some(crate::task::TaskError::new(ErrorCategory::ActionError, "boom"));

        let record = OutcomeRecord::from_task(&task, DEFAULT_CONFIDENCE_THRESHOLD);
        assert!(!record.predicted_success);
        assert!(!record.actual_success);
        assert_eq!(record.error_category, Some(ErrorCategory::ActionError));
    }
}
