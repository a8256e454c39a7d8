//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use orchestra_core::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_ATTEMPTS};
use crate::dependency::FailedDependencyPolicy;

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Could not read the file
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid JSON for this schema
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How the engine decides that a run has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompletionDetection {
    /// Done when no task is left non-terminal, or when nothing can make
    /// progress (nothing running, no retry pending, nothing eligible).
    #[default]
    RemainingCount,
    /// Same idle test, but only after `quiet_ms` without a store mutation.
    StabilityWindow {
        /// Quiet period in milliseconds
        #[serde(default = "default_quiet_ms")]
        quiet_ms: u64,
    },
}

/// Default quiet period of the stability window.
pub const DEFAULT_QUIET_MS: u64 = 500;

fn default_quiet_ms() -> u64 {
    DEFAULT_QUIET_MS
}

/// Configuration for the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on concurrently running actions
    pub max_concurrent_tasks: usize,

    /// Replace high-risk actions with a no-op that reports what would run
    pub enable_dry_run: bool,

    /// Base delay of the exponential retry backoff
    pub base_retry_delay_seconds: f64,

    /// Attempt budget for tasks that do not set their own
    pub default_max_attempts: u32,

    /// Confidence at or above which success is predicted
    pub confidence_threshold: f64,

    /// What happens to dependents of a task that failed for good
    pub failed_dependency_policy: FailedDependencyPolicy,

    /// Retry tasks whose action was not registered (late registration)
    pub retry_unknown_actions: bool,

    /// Reject unknown dependency ids at creation and cycles on restore
    pub validate_dependencies: bool,

    /// Completion detection strategy
    pub completion: CompletionDetection,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            enable_dry_run: false,
            base_retry_delay_seconds: 2.0,
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            failed_dependency_policy: FailedDependencyPolicy::default(),
            retry_unknown_actions: false,
            validate_dependencies: false,
            completion: CompletionDetection::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Invalid("max_concurrent_tasks must be at least 1".into()));
        }
        if let Err(e) = Duration::try_from_secs_f64(self.base_retry_delay_seconds) {
            return Err(ConfigError::Invalid(format!(
                "base_retry_delay_seconds must be a non-negative number of seconds, got {}: {}",
                self.base_retry_delay_seconds, e
            )));
        }
        if self.default_max_attempts == 0 {
            return Err(ConfigError::Invalid("default_max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if let CompletionDetection::StabilityWindow { quiet_ms: 0 } = self.completion {
            return Err(ConfigError::Invalid("stability window must be longer than 0ms".into()));
        }
        Ok(())
    }

    /// Retry base delay as a [`Duration`].
    ///
    /// Values [`validate`](Self::validate) would reject saturate instead of
    /// panicking: negative or NaN becomes zero, too large becomes the maximum.
    pub fn base_retry_delay(&self) -> Duration {
        let seconds = self.base_retry_delay_seconds.max(0.0);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// Set max concurrent tasks.
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.enable_dry_run = enabled;
        self
    }

    /// Set the retry base delay.
    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay_seconds = delay.as_secs_f64();
        self
    }

    /// Set the default attempt budget.
    pub fn with_default_max_attempts(mut self, attempts: u32) -> Self {
        self.default_max_attempts = attempts;
        self
    }

    /// Set the failed-dependency policy.
    pub fn with_failed_dependency_policy(mut self, policy: FailedDependencyPolicy) -> Self {
        self.failed_dependency_policy = policy;
        self
    }

    /// Reject unknown dependencies on creation and cycles on restore.
    pub fn with_validate_dependencies(mut self, enabled: bool) -> Self {
        self.validate_dependencies = enabled;
        self
    }

    /// Retry tasks whose action is not registered yet.
    pub fn with_retry_unknown_actions(mut self, enabled: bool) -> Self {
        self.retry_unknown_actions = enabled;
        self
    }

    /// Set the completion detection strategy.
    pub fn with_completion(mut self, completion: CompletionDetection) -> Self {
        self.completion = completion;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.default_max_attempts, 3);
        assert_eq!(config.base_retry_delay(), Duration::from_secs(2));
        assert_eq!(config.failed_dependency_policy, FailedDependencyPolicy::Block);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"max_concurrent_tasks": 8, "completion": {"mode": "stability_window", "quiet_ms": 500}}"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_tasks, 8);
        assert_eq!(config.default_max_attempts, 3);
        assert_eq!(config.completion, CompletionDetection::StabilityWindow { quiet_ms: 500 });
    }

    #[test]
    fn test_stability_window_default_quiet_period() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"completion": {"mode": "stability_window"}}"#).unwrap();
        assert_eq!(
            config.completion,
            CompletionDetection::StabilityWindow { quiet_ms: DEFAULT_QUIET_MS }
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(EngineConfig::default().with_max_concurrent_tasks(0).validate().is_err());
        assert!(EngineConfig::default().with_default_max_attempts(0).validate().is_err());
        let mut config = EngineConfig::default();
        config.base_retry_delay_seconds = -1.0;
        assert!(config.validate().is_err());
        config.base_retry_delay_seconds = f64::NAN;
        assert!(config.validate().is_err());
        config = EngineConfig::default();
        config.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_retry_delay_rejected_without_panic() {
        let mut config = EngineConfig::default();
        config.base_retry_delay_seconds = 1e30;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.base_retry_delay(), Duration::MAX);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"base_retry_delay_seconds": 1e30}"#).unwrap();
        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"enable_dry_run": true, "failed_dependency_policy": "skip"}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert!(config.enable_dry_run);
        assert_eq!(config.failed_dependency_policy, FailedDependencyPolicy::Skip);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"max_concurrent_tasks": 0}"#).unwrap();
        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Invalid(_))));
    }
}
