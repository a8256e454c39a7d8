//! Retry decisions with exponential backoff.

use orchestra_core::{ErrorCategory, Task, TaskError};
use std::time::Duration;

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enter pending after `delay`
    Retry {
        /// Backoff before the task becomes eligible again
        delay: Duration,
    },
    /// Fail permanently
    GiveUp,
}

/// Decides between re-enqueue with backoff and permanent failure.
#[derive(Debug, Clone)]
pub struct RetryController {
    base_delay: Duration,
    retry_unknown_actions: bool,
}

impl RetryController {
    /// Create a controller.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            retry_unknown_actions: false,
        }
    }

    /// Also retry tasks whose action was not registered.
    pub fn with_retry_unknown_actions(mut self, enabled: bool) -> Self {
        self.retry_unknown_actions = enabled;
        self
    }

    /// Decide what to do with a task that just failed.
    ///
    /// `attempt_count` is the number of runs started, including the one
    /// that just failed.
    pub fn decide(&self, task: &Task, error: &TaskError) -> RetryDecision {
        let retryable = match error.category {
            ErrorCategory::ActionError | ErrorCategory::ActionPanicked => true,
            ErrorCategory::ActionNotFound => self.retry_unknown_actions,
            ErrorCategory::DependencyFailed => false,
        };

        if !retryable || task.attempt_count >= task.max_attempts {
            return RetryDecision::GiveUp;
        }

        RetryDecision::Retry {
            delay: self.backoff(task.attempt_count),
        }
    }

    /// Delay after the `attempt`-th run: `base * 2^(attempt - 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::NewTask;

    fn failed_task(attempts: u32, max: u32) -> Task {
        let mut task = Task::from_new(NewTask::new("flaky", "noop").with_max_attempts(max), 3);
        task.attempt_count = attempts;
        task
    }

    fn action_error() -> TaskError {
        TaskError::new(ErrorCategory::ActionError, "boom")
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryController::new(Duration::from_secs(2));
        assert_eq!(retry.backoff(1), Duration::from_secs(2));
        assert_eq!(retry.backoff(2), Duration::from_secs(4));
        assert_eq!(retry.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_exponent_is_capped() {
        let retry = RetryController::new(Duration::from_secs(1));
        assert_eq!(retry.backoff(100), Duration::from_secs(1 << 16));
    }

    #[test]
    fn test_retry_until_budget_exhausted() {
        let retry = RetryController::new(Duration::from_secs(2));
        assert_eq!(
            retry.decide(&failed_task(1, 3), &action_error()),
            RetryDecision::Retry { delay: Duration::from_secs(2) }
        );
        assert_eq!(
            retry.decide(&failed_task(2, 3), &action_error()),
            RetryDecision::Retry { delay: Duration::from_secs(4) }
        );
        assert_eq!(retry.decide(&failed_task(3, 3), &action_error()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_unknown_action_not_retried_by_default() {
        let error = TaskError::new(ErrorCategory::ActionNotFound, "missing");
        let retry = RetryController::new(Duration::from_secs(2));
        assert_eq!(retry.decide(&failed_task(1, 3), &error), RetryDecision::GiveUp);

        let retry = retry.with_retry_unknown_actions(true);
        assert!(matches!(retry.decide(&failed_task(1, 3), &error), RetryDecision::Retry { .. }));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let retry = RetryController::new(Duration::from_secs(2));
        assert_eq!(retry.decide(&failed_task(1, 1), &action_error()), RetryDecision::GiveUp);
    }
}
