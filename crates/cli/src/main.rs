//! Orchestra CLI - run task plans through the execution engine.

mod plan;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use orchestra_core::TaskStatus;
use orchestra_execution::{EngineConfig, ExecutionEngine, StatusReport, TaskStore};
use orchestra_storage::{JsonSnapshotStore, JsonlOutcomeLog, QueueSnapshot, SnapshotStore};
use orchestra_tools::ActionRegistry;
use plan::Plan;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orchestra")]
#[command(about = "Priority task execution engine", long_about = None)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan until the queue is idle
    Run {
        /// Plan file
        #[arg(long)]
        plan: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Continue a saved queue
    Resume {
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Show counts and backlog of a saved queue
    Status {
        /// Snapshot file
        #[arg(long)]
        snapshot: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check a plan for unknown references and cycles
    Validate {
        /// Plan file
        #[arg(long)]
        plan: PathBuf,
    },
    /// Drop old finished tasks from a saved queue
    Prune {
        /// Snapshot file
        #[arg(long)]
        snapshot: PathBuf,
        /// Keep tasks that finished within this many hours
        #[arg(long, default_value = "24")]
        older_than_hours: i64,
    },
}

#[derive(clap::Args)]
struct EngineArgs {
    /// Engine config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Queue snapshot to write (and read, for resume)
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Outcome log (JSON lines)
    #[arg(long)]
    outcomes: Option<PathBuf>,
    /// Max concurrently running actions
    #[arg(long)]
    concurrency: Option<usize>,
    /// Replace high-risk actions with a report of what would run
    #[arg(long)]
    dry_run: bool,
}

impl EngineArgs {
    fn config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(concurrency) = self.concurrency {
            config = config.with_max_concurrent_tasks(concurrency);
        }
        if self.dry_run {
            config = config.with_dry_run(true);
        }
        config.validate()?;
        Ok(config)
    }

    fn build(&self, snapshot: Option<QueueSnapshot>) -> Result<ExecutionEngine> {
        let mut builder = ExecutionEngine::builder(Arc::new(ActionRegistry::with_builtins()))
            .with_config(self.config()?);
        if let Some(path) = &self.outcomes {
            builder = builder.with_outcome_sink(Arc::new(JsonlOutcomeLog::new(path)));
        }
        if let Some(snapshot) = snapshot {
            builder = builder.with_snapshot(snapshot);
        }
        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { plan, engine: args } => {
            let plan = Plan::load(&plan)?;
            let engine = args.build(None)?;
            let ids = plan.submit(&engine)?;
            info!(tasks = ids.len(), "Plan submitted");

            let report = drive(&engine).await?;
            if let Some(path) = &args.snapshot {
                save(&engine, path).await?;
            }
            print!("{}", report);
        }
        Commands::Resume { engine: args } => {
            let Some(path) = args.snapshot.clone() else {
                bail!("resume needs --snapshot");
            };
            let Some(snapshot) = JsonSnapshotStore::new(&path).load().await? else {
                bail!("no snapshot at {}", path.display());
            };

            let engine = args.build(Some(snapshot))?;
            info!(remaining = engine.remaining(), "Resuming queue");
            let report = drive(&engine).await?;
            save(&engine, &path).await?;
            print!("{}", report);
        }
        Commands::Status { snapshot, json } => {
            let snapshot = load(&snapshot).await?;
            let report = report_for(snapshot);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
        Commands::Validate { plan } => {
            let plan = Plan::load(&plan)?;
            let order = plan.order()?;
            println!("Plan OK ({} tasks)", order.len());
            for (i, task) in order.iter().enumerate() {
                println!("  {:>3}. {} [{}] {}", i + 1, task.name, task.priority, task.action);
            }
        }
        Commands::Prune { snapshot: path, older_than_hours } => {
            let mut snapshot = load(&path).await?;
            let cutoff = chrono::Utc::now() - chrono::Duration::hours(older_than_hours);
            let removed = snapshot.prune_terminal_before(cutoff);
            JsonSnapshotStore::new(&path).save(&snapshot).await?;
            println!("Pruned {} tasks, {} left", removed, snapshot.tasks.len());
        }
    }

    Ok(())
}

/// Run until idle; Ctrl-C aborts running actions.
async fn drive(engine: &ExecutionEngine) -> Result<StatusReport> {
    tokio::select! {
        report = engine.run_until_idle() => Ok(report?),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, aborting");
            engine.abort().await;
            Ok(engine.status())
        }
    }
}

async fn load(path: &Path) -> Result<QueueSnapshot> {
    match JsonSnapshotStore::new(path).load().await? {
        Some(snapshot) => Ok(snapshot),
        None => bail!("no snapshot at {}", path.display()),
    }
}

async fn save(engine: &ExecutionEngine, path: &Path) -> Result<()> {
    engine
        .save_snapshot(&JsonSnapshotStore::new(path))
        .await
        .with_context(|| format!("failed to save snapshot {}", path.display()))?;
    info!(path = %path.display(), "Snapshot saved");
    Ok(())
}

/// Status of a saved queue, as recorded (no recovery applied).
fn report_for(snapshot: QueueSnapshot) -> StatusReport {
    let mut store = TaskStore::new();
    for task in snapshot.tasks {
        store.insert_task(task);
    }

    StatusReport {
        counts: store.count_by_status(),
        executing: store
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .map(|t| t.id)
            .collect(),
        backlog: store.pending_by_priority(),
        remaining: store.non_terminal_count(),
        retries_scheduled: store.iter().filter(|t| t.is_retry_pending()).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::{NewTask, Task};

    #[test]
    fn test_report_for_snapshot_keeps_recorded_state() {
        let mut running = Task::from_new(NewTask::new("running", "noop"), 3);
        running.status = TaskStatus::InProgress;
        let pending = Task::from_new(NewTask::new("pending", "noop"), 3);
        let mut done = Task::from_new(NewTask::new("done", "noop"), 3);
        done.status = TaskStatus::Completed;
        let running_id = running.id;

        let report = report_for(QueueSnapshot::new(vec![running, pending, done]));
        assert_eq!(report.count(TaskStatus::InProgress), 1);
        assert_eq!(report.executing, vec![running_id]);
        assert_eq!(report.remaining, 2);
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"max_concurrent_tasks": 2}"#).unwrap();

        let cli = Cli::parse_from([
            "orchestra",
            "run",
            "--plan",
            "plan.json",
            "--config",
            path.to_str().unwrap(),
            "--concurrency",
            "6",
            "--dry-run",
        ]);
        let Commands::Run { engine, .. } = cli.command else {
            panic!("expected run");
        };
        let config = engine.config().unwrap();
        assert_eq!(config.max_concurrent_tasks, 6);
        assert!(config.enable_dry_run);
    }
}
