//! Built-in actions (noop, echo, sleep, fail, command) and the dry-run stand-in.

use super::r#trait::{Action, ActionContext};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// Does nothing and succeeds.
pub struct NoopAction;

#[async_trait]
impl Action for NoopAction {
    fn description(&self) -> &str {
        "Succeed without side effects"
    }

    async fn execute(&self, _params: &Value, _ctx: &ActionContext) -> Result<Value, anyhow::Error> {
        Ok(Value::Null)
    }
}

/// Returns its parameters as the result.
pub struct EchoAction;

#[async_trait]
impl Action for EchoAction {
    fn description(&self) -> &str {
        "Return the parameters unchanged"
    }

    async fn execute(&self, params: &Value, _ctx: &ActionContext) -> Result<Value, anyhow::Error> {
        Ok(params.clone())
    }
}

#[derive(Debug, Deserialize)]
struct SleepParams {
    #[serde(default)]
    ms: u64,
}

/// Sleeps for `{"ms": n}` milliseconds; stops early on cancellation.
pub struct SleepAction;

#[async_trait]
impl Action for SleepAction {
    fn description(&self) -> &str {
        "Wait for a number of milliseconds"
    }

    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, anyhow::Error> {
        let params: SleepParams = if params.is_null() {
            SleepParams { ms: 0 }
        } else {
            serde_json::from_value(params.clone())?
        };

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(params.ms)) => Ok(json!({ "slept_ms": params.ms })),
            _ = ctx.cancel.cancelled() => bail!("sleep cancelled"),
        }
    }
}

/// Always fails, with `{"message": ..}` as the error text.
pub struct FailAction;

#[async_trait]
impl Action for FailAction {
    fn description(&self) -> &str {
        "Fail unconditionally"
    }

    async fn execute(&self, params: &Value, _ctx: &ActionContext) -> Result<Value, anyhow::Error> {
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("requested failure");
        Err(anyhow!(message.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct CommandParams {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    cwd: Option<PathBuf>,
}

/// Runs an external process. A non-zero exit status fails the task.
///
/// Params: `{"program": "cargo", "args": ["test"], "env": {..}, "cwd": ".."}`.
pub struct CommandAction;

#[async_trait]
impl Action for CommandAction {
    fn description(&self) -> &str {
        "Run an external command"
    }

    async fn execute(&self, params: &Value, ctx: &ActionContext) -> Result<Value, anyhow::Error> {
        let params: CommandParams = serde_json::from_value(params.clone())?;
        let start = std::time::Instant::now();

        let mut cmd = Command::new(&params.program);
        cmd.args(&params.args).kill_on_drop(true);

        for (k, v) in &params.env {
            cmd.env(k, v);
        }
        if let Some(cwd) = &params.cwd {
            cmd.current_dir(cwd);
        }

        let output = tokio::select! {
            output = cmd.output() => output?,
            _ = ctx.cancel.cancelled() => bail!("command '{}' cancelled", params.program),
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            bail!("'{}' exited with {}: {}", params.program, exit_code, stderr.trim());
        }

        Ok(json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "duration_ms": start.elapsed().as_millis() as u64,
        }))
    }
}

/// Shape-preserving stand-in for a high-risk action in dry-run mode.
pub struct DryRunAction {
    name: String,
}

impl DryRunAction {
    /// Stand in for the action registered as `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Action for DryRunAction {
    fn description(&self) -> &str {
        "Report what would have run"
    }

    async fn execute(&self, params: &Value, _ctx: &ActionContext) -> Result<Value, anyhow::Error> {
        tracing::info!(action = %self.name, "Dry run: skipping high-risk action");
        Ok(json!({
            "dry_run": true,
            "action": self.name,
            "params": params,
        }))
    }
}
