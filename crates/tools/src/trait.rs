//! Action abstraction.

use async_trait::async_trait;
use orchestra_core::TaskId;
use serde_json::Value;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// A named unit of behaviour a task can invoke.
#[async_trait]
pub trait Action: Send + Sync {
    /// Short human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Execute the action.
    ///
    /// Errors become a failed task; they never reach the scheduler loop.
    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, anyhow::Error>;
}

/// Per-dispatch context handed to an action.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Task being executed
    pub task_id: TaskId,

    /// 1-based attempt number
    pub attempt: u32,

    /// Cooperative cancellation; long-running actions should watch it
    pub cancel: CancellationToken,
}

impl ActionContext {
    /// Create a context with a fresh token.
    pub fn new(task_id: TaskId, attempt: u32) -> Self {
        Self {
            task_id,
            attempt,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Whether an abort was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Adapter turning an async closure into an [`Action`].
pub struct FnAction<F> {
    f: F,
}

impl<F> FnAction<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(Value, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, anyhow::Error>> + Send,
{
    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, anyhow::Error> {
        (self.f)(params.clone(), ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_action_receives_params() {
        let action = FnAction::new(|params: Value, ctx: ActionContext| async move {
            Ok::<_, anyhow::Error>(json!({ "got": params, "attempt": ctx.attempt }))
        });
        let ctx = ActionContext::new(TaskId::new(), 2);
        let out = action.execute(&json!(5), &ctx).await.unwrap();
        assert_eq!(out, json!({ "got": 5, "attempt": 2 }));
    }

    #[test]
    fn test_context_cancellation() {
        let token = CancellationToken::new();
        let ctx = ActionContext::new(TaskId::new(), 1).with_cancel(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
