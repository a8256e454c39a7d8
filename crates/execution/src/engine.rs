//! The execution engine - runs the dispatch loop.
//!
//! One control loop owns dispatch. All task state lives behind a single
//! mutex; a [`Notify`] plays the role of the condition variable. Actions run
//! off-lock in their own spawned tasks and report back through
//! a single completion path, which applies the result, runs the retry controller,
//! the branch expander and the outcome logger, and wakes every waiter.
//!
//! ```text
//! add_task ──► store ──► select_next ──► IN_PROGRESS ──► action
//!                ▲                                         │
//!                └── retry timer / branches ◄── complete ◄─┘
//! ```

use crate::branch::BranchExpander;
use crate::config::{CompletionDetection, EngineConfig};
use crate::dependency::{DependencyGraph, DependencyResolver, FailedDependencyPolicy, Resolution};
use crate::error::{EngineError, Result};
use crate::outcome::OutcomeLogger;
use crate::retry::{RetryController, RetryDecision};
use crate::scheduler::{Budget, ResourceScheduler};
use crate::selector::{PrioritySelector, TaskSelector};
use crate::status::StatusReport;
use crate::store::TaskStore;
use orchestra_core::{
    ErrorCategory, NewTask, OutcomeRecord, RiskLevel, Task, TaskError, TaskId, TaskStatus,
};
use orchestra_storage::{OutcomeSink, QueueSnapshot, SnapshotStore};
use orchestra_tools::{Action, ActionContext, ActionRegistry, DryRunAction};
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mutable engine state, guarded by one lock.
struct EngineState {
    store: TaskStore,
    executing: HashSet<TaskId>,
    scheduler: ResourceScheduler,
    /// Failed tasks whose retry timer has not fired yet
    pending_retries: usize,
    stopping: bool,
    /// Bumped on every store mutation
    mutation_seq: u64,
    /// Outcome records produced but not yet handed to the sink
    unflushed_records: usize,
    /// Records for tasks failed during restore, flushed once the loop runs
    recovered_records: Vec<OutcomeRecord>,
    cancel: CancellationToken,
}

/// A task picked for execution, carried off-lock to its worker.
struct Dispatch {
    task_id: TaskId,
    action_name: String,
    params: Value,
    attempt: u32,
    action: Option<Arc<dyn Action>>,
    cancel: CancellationToken,
}

struct Shared {
    state: Mutex<EngineState>,
    notify: Notify,
    /// Non-terminal task count
    remaining: AtomicUsize,
    registry: Arc<ActionRegistry>,
    config: EngineConfig,
    selector: Box<dyn TaskSelector>,
    resolver: DependencyResolver,
    retry: RetryController,
    branches: BranchExpander,
    outcomes: OutcomeLogger,
}

/// Builder for [`ExecutionEngine`].
pub struct EngineBuilder {
    registry: Arc<ActionRegistry>,
    config: EngineConfig,
    sink: Option<Arc<dyn OutcomeSink>>,
    selector: Option<Box<dyn TaskSelector>>,
    snapshot: Option<QueueSnapshot>,
}

impl EngineBuilder {
    /// Start building an engine around `registry`.
    pub fn new(registry: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
            sink: None,
            selector: None,
            snapshot: None,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist outcome records to `sink`.
    pub fn with_outcome_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the task selector strategy.
    pub fn with_selector(mut self, selector: Box<dyn TaskSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Start from a saved queue instead of an empty one.
    pub fn with_snapshot(mut self, snapshot: QueueSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> Result<ExecutionEngine> {
        self.config.validate()?;

        let store = match self.snapshot {
            Some(snapshot) => {
                snapshot.check_version()?;
                let store = TaskStore::from_snapshot(snapshot);
                if self.config.validate_dependencies {
                    DependencyGraph::build(store.iter())
                        .topological_order()
                        .map_err(EngineError::DependencyCycle)?;
                }
                info!(tasks = store.len(), "Restored task queue");
                store
            }
            None => TaskStore::new(),
        };

        let retry = RetryController::new(self.config.base_retry_delay())
            .with_retry_unknown_actions(self.config.retry_unknown_actions);
        let mut outcomes = OutcomeLogger::new(self.config.confidence_threshold);
        if let Some(sink) = self.sink {
            outcomes = outcomes.with_sink(sink);
        }

        // Interrupted on their final attempt: terminal, but not yet finalized.
        let exhausted: Vec<TaskId> = store
            .iter()
            .filter(|t| t.recovered && t.is_terminal() && !t.branches_fired)
            .map(|t| t.id)
            .collect();

        let remaining = store.non_terminal_count() + exhausted.len();
        let state = EngineState {
            store,
            executing: HashSet::new(),
            scheduler: ResourceScheduler::new(Budget::new(self.config.max_concurrent_tasks)),
            pending_retries: 0,
            stopping: false,
            mutation_seq: 0,
            unflushed_records: 0,
            recovered_records: Vec::new(),
            cancel: CancellationToken::new(),
        };

        let shared = Shared {
            state: Mutex::new(state),
            notify: Notify::new(),
            remaining: AtomicUsize::new(remaining),
            registry: self.registry,
            config: self.config,
            selector: self.selector.unwrap_or_else(|| Box::new(PrioritySelector::new())),
            resolver: DependencyResolver::new(),
            retry,
            branches: BranchExpander::new(),
            outcomes,
        };

        {
            let mut state = shared.lock();
            let records: Vec<OutcomeRecord> = exhausted
                .into_iter()
                .filter_map(|id| shared.finalize_terminal(&mut state, id))
                .collect();
            state.recovered_records = records;
        }

        Ok(ExecutionEngine {
            shared: Arc::new(shared),
            control: Mutex::new(None),
        })
    }
}

/// The main execution engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct ExecutionEngine {
    shared: Arc<Shared>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionEngine {
    /// Create an engine with an empty queue.
    pub fn new(config: EngineConfig, registry: Arc<ActionRegistry>) -> Result<Self> {
        EngineBuilder::new(registry).with_config(config).build()
    }

    /// Create an engine from a saved queue.
    ///
    /// Tasks caught mid-run are reset to pending and flagged `recovered`.
    pub fn restore(
        config: EngineConfig,
        registry: Arc<ActionRegistry>,
        snapshot: QueueSnapshot,
    ) -> Result<Self> {
        EngineBuilder::new(registry)
            .with_config(config)
            .with_snapshot(snapshot)
            .build()
    }

    /// Start building an engine.
    pub fn builder(registry: Arc<ActionRegistry>) -> EngineBuilder {
        EngineBuilder::new(registry)
    }

    /// The action registry; actions may be registered while running.
    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.shared.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Add a task and return its id.
    ///
    /// Only synchronous validation errors are returned; a task that later
    /// fails is reported through its status and the outcome log.
    pub fn add_task(&self, new: NewTask) -> Result<TaskId> {
        check_confidence(new.confidence_score)?;
        check_max_attempts(new.max_attempts)?;
        for branch in &new.conditional_branches {
            check_confidence(branch.template.confidence_score)?;
            check_max_attempts(branch.template.max_attempts)?;
        }

        let id = {
            let mut state = self.shared.lock();
            if self.shared.config.validate_dependencies {
                if let Some(unknown) = new.dependencies.iter().find(|d| !state.store.contains(d)) {
                    return Err(EngineError::UnknownDependency(*unknown));
                }
            }

            let id = state.store.insert(new, self.shared.config.default_max_attempts);
            self.shared.remaining.fetch_add(1, Ordering::SeqCst);
            state.mutation_seq += 1;
            id
        };

        debug!(task_id = %id, "Task added");
        self.shared.notify.notify_waiters();
        Ok(id)
    }

    /// Skip a pending task. Its dependents see it as not completed.
    pub async fn skip_task(&self, id: TaskId) -> Result<()> {
        let records = {
            let mut state = self.shared.lock();
            if state.executing.contains(&id) {
                return Err(EngineError::TaskExecuting(id));
            }
            let task = state.store.get_mut(&id).ok_or(EngineError::UnknownTask(id))?;
            task.transition(TaskStatus::Skipped)?;
            task.completed_at = Some(chrono::Utc::now());
            info!(task_id = %id, "Task skipped");

            let mut records: Vec<OutcomeRecord> =
                self.shared.finalize_terminal(&mut state, id).into_iter().collect();
            records.extend(self.shared.sweep_skipped(&mut state));
            records
        };

        self.shared.flush(records).await;
        Ok(())
    }

    /// Start the control loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if control.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(EngineError::AlreadyRunning);
        }

        {
            let mut state = self.shared.lock();
            state.stopping = false;
            if state.cancel.is_cancelled() {
                state.cancel = CancellationToken::new();
            }
        }

        *control = Some(tokio::spawn(control_loop(Arc::clone(&self.shared))));
        Ok(())
    }

    /// Whether the control loop is running.
    pub fn is_running(&self) -> bool {
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop dispatching and wait for in-flight actions to finish.
    pub async fn stop(&self) {
        {
            self.shared.lock().stopping = true;
        }
        self.shared.notify.notify_waiters();

        let handle = self.control.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Control loop terminated abnormally");
            }
        }
    }

    /// Cancel running actions through their token, then stop.
    ///
    /// Actions that ignore the token still run to completion.
    pub async fn abort(&self) {
        {
            self.shared.lock().cancel.cancel();
        }
        warn!("Abort requested");
        self.stop().await;
    }

    /// Wait until the queue is idle under the configured completion mode.
    ///
    /// If the loop is not running, nothing can make progress: this returns
    /// at once, with a warning when work is still outstanding.
    pub async fn wait_idle(&self) {
        if !self.is_running() {
            let idle = {
                let state = self.shared.lock();
                self.shared.is_idle(&state)
            };
            if !idle {
                warn!(
                    remaining = self.remaining(),
                    "wait_idle called while the engine is not running; call start() first"
                );
            }
            return;
        }
        self.shared.wait_idle().await;
    }

    /// Start if needed, run until idle, stop, and report.
    pub async fn run_until_idle(&self) -> Result<StatusReport> {
        if !self.is_running() {
            self.start()?;
        }
        self.wait_idle().await;
        self.stop().await;
        Ok(self.status())
    }

    /// Counts by status, executing ids and the per-priority backlog.
    pub fn status(&self) -> StatusReport {
        let state = self.shared.lock();
        let mut executing: Vec<TaskId> = state.executing.iter().copied().collect();
        executing.sort();
        StatusReport {
            counts: state.store.count_by_status(),
            executing,
            backlog: state.store.pending_by_priority(),
            remaining: self.shared.remaining.load(Ordering::SeqCst),
            retries_scheduled: state.pending_retries,
        }
    }

    /// Copy of a task.
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.shared.lock().store.get(id).cloned()
    }

    /// Copy of every task, in creation order.
    pub fn tasks(&self) -> Vec<Task> {
        self.shared.lock().store.iter().cloned().collect()
    }

    /// Number of tasks that have not reached a terminal state.
    pub fn remaining(&self) -> usize {
        self.shared.remaining.load(Ordering::SeqCst)
    }

    /// Whether every dependency of a task has completed.
    pub fn is_eligible(&self, id: &TaskId) -> bool {
        let state = self.shared.lock();
        state
            .store
            .get(id)
            .map(|t| self.shared.resolver.is_eligible(t, &state.store))
            .unwrap_or(false)
    }

    /// Point-in-time copy of the queue.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.shared.lock().store.to_snapshot()
    }

    /// Write a snapshot to `store`.
    pub async fn save_snapshot(&self, store: &dyn SnapshotStore) -> Result<()> {
        let snapshot = self.snapshot();
        store.save(&snapshot).await?;
        debug!(tasks = snapshot.tasks.len(), "Saved queue snapshot");
        Ok(())
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select and mark tasks until the budget is used up.
    fn dispatch_ready(&self, state: &mut EngineState) -> Vec<Dispatch> {
        let mut dispatched = Vec::new();

        while !state.stopping && state.scheduler.can_start() {
            let Some(id) = self.selector.select_next(&state.store, &state.executing) else {
                break;
            };
            let cancel = state.cancel.clone();
            let Some(task) = state.store.get_mut(&id) else {
                break;
            };
            if let Err(e) = task.transition(TaskStatus::InProgress) {
                error!(task_id = %id, error = %e, "Selector returned a task that cannot start");
                break;
            }
            task.attempt_count += 1;
            task.started_at = Some(chrono::Utc::now());

            let action = self.resolve_action(task);
            info!(
                task_id = %id,
                action = %task.action_name,
                attempt = task.attempt_count,
                priority = %task.priority,
                "Dispatching task"
            );

            dispatched.push(Dispatch {
                task_id: id,
                action_name: task.action_name.clone(),
                params: task.action_params.clone(),
                attempt: task.attempt_count,
                action,
                cancel,
            });
            state.executing.insert(id);
            state.scheduler.task_started();
            state.mutation_seq += 1;
        }

        dispatched
    }

    /// Look up the task's action, swapping in the dry-run stand-in for
    /// high-risk work when dry-run is enabled.
    fn resolve_action(&self, task: &Task) -> Option<Arc<dyn Action>> {
        let entry = self.registry.resolve(&task.action_name).ok()?;
        let high_risk = entry.risk == RiskLevel::High || task.risk_level == RiskLevel::High;
        if self.config.enable_dry_run && high_risk {
            return Some(Arc::new(DryRunAction::new(entry.name)));
        }
        Some(entry.action)
    }

    /// Apply a worker's result and wake everyone.
    async fn complete(
        self: &Arc<Self>,
        id: TaskId,
        outcome: std::result::Result<Value, TaskError>,
        elapsed: Duration,
    ) {
        let records = {
            let mut state = self.lock();
            self.apply_completion(&mut state, id, outcome, elapsed)
        };
        self.flush(records).await;
    }

    fn apply_completion(
        self: &Arc<Self>,
        state: &mut EngineState,
        id: TaskId,
        outcome: std::result::Result<Value, TaskError>,
        elapsed: Duration,
    ) -> Vec<OutcomeRecord> {
        if !state.executing.remove(&id) {
            debug!(task_id = %id, "Ignoring completion for a task that is not executing");
            return Vec::new();
        }
        state.scheduler.task_completed();
        state.mutation_seq += 1;

        let terminal = {
            let Some(task) = state.store.get_mut(&id) else {
                return Vec::new();
            };
            task.execution_time_ms = Some(elapsed.as_millis() as u64);
            task.completed_at = Some(chrono::Utc::now());

            match outcome {
                Ok(value) => {
                    if let Err(e) = task.transition(TaskStatus::Completed) {
                        error!(task_id = %id, error = %e, "Could not complete task");
                    }
                    task.result = Some(value);
                    task.error = None;
                    info!(task_id = %id, elapsed_ms = elapsed.as_millis() as u64, "Task completed");
                }
                Err(err) => {
                    if let Err(e) = task.transition(TaskStatus::Failed) {
                        error!(task_id = %id, error = %e, "Could not fail task");
                    }
                    let decision = self.retry.decide(task, &err);
                    match decision {
                        RetryDecision::Retry { delay } => {
                            let now = chrono::Utc::now();
                            task.retry_at = Some(
                                chrono::Duration::from_std(delay)
                                    .ok()
                                    .and_then(|d| now.checked_add_signed(d))
                                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC),
                            );
                            warn!(
                                task_id = %id,
                                attempt = task.attempt_count,
                                max_attempts = task.max_attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "Task failed, retry scheduled"
                            );
                        }
                        RetryDecision::GiveUp => {
                            task.retry_at = None;
                            error!(
                                task_id = %id,
                                attempts = task.attempt_count,
                                error = %err,
                                "Task failed permanently"
                            );
                        }
                    }
                    task.error = Some(err);

                    if let RetryDecision::Retry { delay } = decision {
                        state.pending_retries += 1;
                        self.schedule_retry(id, delay);
                    }
                }
            }

            state.store.get(&id).map(Task::is_terminal).unwrap_or(false)
        };

        let mut records = Vec::new();
        if terminal {
            records.extend(self.finalize_terminal(state, id));
        }
        records.extend(self.sweep_skipped(state));
        records
    }

    /// Flip a failed task back to pending once its backoff elapses.
    fn schedule_retry(self: &Arc<Self>, id: TaskId, delay: Duration) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.release_retry(id);
        });
    }

    fn release_retry(&self, id: TaskId) {
        {
            let mut state = self.lock();
            state.pending_retries = state.pending_retries.saturating_sub(1);
            if let Some(task) = state.store.get_mut(&id) {
                if task.is_retry_pending() {
                    if let Err(e) = task.transition(TaskStatus::Pending) {
                        error!(task_id = %id, error = %e, "Could not re-queue task");
                    }
                    task.retry_at = None;
                    debug!(task_id = %id, attempt = task.attempt_count + 1, "Task re-queued for retry");
                }
            }
            state.mutation_seq += 1;
        }
        self.notify.notify_waiters();
    }

    /// Bookkeeping for a task that just became terminal: fire branches,
    /// adjust the remaining count, build its outcome record.
    fn finalize_terminal(&self, state: &mut EngineState, id: TaskId) -> Option<OutcomeRecord> {
        let (children, record) = {
            let task = state.store.get_mut(&id)?;
            let children = self.branches.expand(task);
            (children, self.outcomes.record(task))
        };

        // Count children before releasing the parent so remaining never
        // touches zero in between.
        for child in children {
            let child_id = state.store.insert(child, self.config.default_max_attempts);
            self.remaining.fetch_add(1, Ordering::SeqCst);
            debug!(parent_id = %id, task_id = %child_id, "Branch task created");
        }
        if self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            error!(task_id = %id, "Remaining count already zero at a terminal transition");
        }

        state.unflushed_records += 1;
        state.mutation_seq += 1;
        Some(record)
    }

    /// Pending tasks that can never run under the skip policy.
    fn doomed(&self, state: &EngineState) -> Vec<(TaskId, Vec<TaskId>)> {
        if self.config.failed_dependency_policy != FailedDependencyPolicy::Skip {
            return Vec::new();
        }
        state
            .store
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter_map(|t| match self.resolver.check(t, &state.store) {
                Resolution::Failed(deps) => Some((t.id, deps)),
                _ => None,
            })
            .collect()
    }

    /// Skip dependents of failed or skipped tasks, cascading.
    fn sweep_skipped(&self, state: &mut EngineState) -> Vec<OutcomeRecord> {
        let mut records = Vec::new();

        loop {
            let doomed = self.doomed(state);
            if doomed.is_empty() {
                break;
            }

            for (id, deps) in doomed {
                let Some(task) = state.store.get_mut(&id) else {
                    continue;
                };
                if task.transition(TaskStatus::Skipped).is_err() {
                    continue;
                }
                let deps: Vec<String> = deps.iter().map(TaskId::to_string).collect();
                task.error = Some(TaskError::new(
                    ErrorCategory::DependencyFailed,
                    format!("dependency did not complete: {}", deps.join(", ")),
                ));
                task.completed_at = Some(chrono::Utc::now());
                warn!(task_id = %id, "Skipping task with failed dependency");

                records.extend(self.finalize_terminal(state, id));
            }
        }

        records
    }

    /// Hand records to the outcome logger, then wake waiters.
    async fn flush(&self, records: Vec<OutcomeRecord>) {
        let count = records.len();
        if count > 0 {
            self.outcomes.emit(records).await;
            let mut state = self.lock();
            state.unflushed_records = state.unflushed_records.saturating_sub(count);
        }
        self.notify.notify_waiters();
    }

    /// Nothing running, nothing scheduled, nothing that could start.
    fn is_idle(&self, state: &EngineState) -> bool {
        if !state.executing.is_empty() || state.unflushed_records > 0 {
            return false;
        }
        if state.stopping {
            return true;
        }
        if state.pending_retries > 0 {
            return false;
        }
        if self.remaining.load(Ordering::SeqCst) == 0 {
            return true;
        }
        self.selector.select_next(&state.store, &state.executing).is_none()
            && self.doomed(state).is_empty()
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (idle, seq) = {
                let state = self.lock();
                (self.is_idle(&state), state.mutation_seq)
            };

            if idle {
                match self.config.completion {
                    CompletionDetection::RemainingCount => return,
                    CompletionDetection::StabilityWindow { quiet_ms } => {
                        tokio::time::sleep(Duration::from_millis(quiet_ms)).await;
                        let state = self.lock();
                        if self.is_idle(&state) && state.mutation_seq == seq {
                            return;
                        }
                        continue;
                    }
                }
            }

            notified.await;
        }
    }
}

async fn control_loop(shared: Arc<Shared>) {
    info!(
        max_concurrent = shared.config.max_concurrent_tasks,
        dry_run = shared.config.enable_dry_run,
        "Execution engine started"
    );

    loop {
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let (dispatched, records) = {
            let mut state = shared.lock();
            if state.stopping && state.executing.is_empty() && state.unflushed_records == 0 {
                break;
            }
            let mut records = std::mem::take(&mut state.recovered_records);
            records.extend(shared.sweep_skipped(&mut state));
            (shared.dispatch_ready(&mut state), records)
        };

        if !records.is_empty() {
            shared.flush(records).await;
        }
        for dispatch in dispatched {
            tokio::spawn(run_dispatch(Arc::clone(&shared), dispatch));
        }

        notified.await;
    }

    info!("Execution engine stopped");
}

/// Worker: run one action and report the result.
async fn run_dispatch(shared: Arc<Shared>, dispatch: Dispatch) {
    let Dispatch {
        task_id,
        action_name,
        params,
        attempt,
        action,
        cancel,
    } = dispatch;
    let start = tokio::time::Instant::now();

    let outcome = match action {
        None => Err(TaskError::new(
            ErrorCategory::ActionNotFound,
            format!("no action registered as '{}'", action_name),
        )),
        Some(action) => {
            let ctx = ActionContext::new(task_id, attempt).with_cancel(cancel);
            // Own task so a panic stops at the join handle.
            let handle = tokio::spawn(async move { action.execute(&params, &ctx).await });
            match handle.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(TaskError::new(ErrorCategory::ActionError, format!("{:#}", e))),
                Err(e) if e.is_panic() => Err(TaskError::new(
                    ErrorCategory::ActionPanicked,
                    panic_message(e.into_panic()),
                )),
                Err(e) => Err(TaskError::new(ErrorCategory::ActionError, e.to_string())),
            }
        }
    };

    shared.complete(task_id, outcome, start.elapsed()).await;
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "action panicked".to_string()
    }
}

fn check_confidence(confidence: f64) -> Result<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfidence(confidence))
    }
}

fn check_max_attempts(max_attempts: Option<u32>) -> Result<()> {
    match max_attempts {
        Some(0) => Err(EngineError::InvalidMaxAttempts),
        _ => Ok(()),
    }
}
