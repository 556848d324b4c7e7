//! The DAG scheduler and execution engine — Component D.
//!
//! `WorkflowOrchestrator` drives a workflow from `Pending` to a terminal
//! status by repeatedly computing the ready set (`WorkflowState::ready_tasks`),
//! spawning one `tokio::task` per ready task bounded by a `Semaphore`, and
//! waiting for the next one to finish before recomputing the ready set. Task
//! state transitions, retries, and dependent-skipping all go through
//! `WorkflowStore::update_workflow` so every mutation is durable and
//! versioned, matching the persistence pattern used throughout this engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use rand::Rng;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::warn;

use workflow_core::error::{CoreError, Result};
use workflow_core::events::{Event, EventType};
use workflow_core::executor::{ExecutorRegistry, TaskExecutionContext, TaskExecutor};
use workflow_core::ids::{TaskId, WorkflowId};
use workflow_core::models::{RetryPolicy, TaskDef, TaskFailure, TaskStatus, WorkflowState, WorkflowStatus};
use workflow_core::store::{EventTracker, WorkflowStore};
use workflow_core::validation::GraphValidator;

use crate::config::{CrashRecoveryPolicy, OrchestratorConfig};
use crate::result::{TaskOutcome, WorkflowResult};

pub struct WorkflowOrchestrator {
    store: Arc<dyn WorkflowStore>,
    tracker: Arc<dyn EventTracker>,
    registry: Arc<ExecutorRegistry>,
    config: OrchestratorConfig,
}

impl WorkflowOrchestrator {
    pub fn new(store: Arc<dyn WorkflowStore>, tracker: Arc<dyn EventTracker>, config: OrchestratorConfig) -> Self {
        Self { store, tracker, registry: Arc::new(ExecutorRegistry::new()), config }
    }

    pub fn register_executor(&self, agent_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.registry.register(agent_type, executor);
    }

    /// The backing store, for callers that need direct access (e.g. reading
    /// history or issuing a rollback) beyond what the orchestrator itself exposes.
    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub async fn create_workflow(
        &self,
        task_defs: Vec<TaskDef>,
        workflow_id: Option<WorkflowId>,
        initial_context: Option<Value>,
    ) -> Result<WorkflowId> {
        GraphValidator::validate(&task_defs)?;

        let workflow_id = workflow_id.unwrap_or_else(WorkflowId::generate);
        let context = initial_context.unwrap_or_else(|| Value::Object(Default::default()));
        let task_ids: Vec<TaskId> = task_defs.iter().map(|def| def.task_id.clone()).collect();

        self.store
            .create_workflow(workflow_id.clone(), task_defs, context, Value::Object(Default::default()))
            .await?;

        self.track_event_best_effort(Event::new(EventType::WorkflowCreated, workflow_id.clone(), Utc::now())).await;
        for task_id in task_ids {
            self.track_event_best_effort(Event::new(EventType::TaskCreated, workflow_id.clone(), Utc::now()).with_task(task_id))
                .await;
        }
        Ok(workflow_id)
    }

    pub async fn get_workflow_status(&self, workflow_id: &WorkflowId) -> Result<WorkflowState> {
        self.store.get_workflow(workflow_id).await?.ok_or_else(|| CoreError::workflow_not_found(workflow_id))
    }

    pub async fn pause_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        let state = self.get_workflow_status(workflow_id).await?;
        if !state.can_transition_to(WorkflowStatus::Paused) {
            return Err(CoreError::invalid_transition("workflow", state.status, WorkflowStatus::Paused));
        }
        self.store
            .update_workflow(workflow_id, Some(state.version), Box::new(|s| s.status = WorkflowStatus::Paused), "paused_by_caller")
            .await?;
        self.track_event_best_effort(Event::new(EventType::WorkflowPaused, workflow_id.clone(), Utc::now())).await;
        Ok(())
    }

    pub async fn resume_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        let state = self.get_workflow_status(workflow_id).await?;
        if state.status != WorkflowStatus::Paused {
            return Err(CoreError::invalid_transition("workflow", state.status, WorkflowStatus::Running));
        }
        self.store
            .update_workflow(workflow_id, Some(state.version), Box::new(|s| s.status = WorkflowStatus::Running), "resumed_by_caller")
            .await?;
        self.track_event_best_effort(Event::new(EventType::WorkflowResumed, workflow_id.clone(), Utc::now())).await;
        Ok(())
    }

    pub async fn cancel_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        let state = self.get_workflow_status(workflow_id).await?;
        if !state.can_transition_to(WorkflowStatus::Cancelled) {
            return Err(CoreError::invalid_transition("workflow", state.status, WorkflowStatus::Cancelled));
        }
        self.store
            .update_workflow(
                workflow_id,
                Some(state.version),
                Box::new(|s| {
                    s.status = WorkflowStatus::Cancelled;
                    s.completed_at = Some(Utc::now());
                }),
                "cancelled_by_caller",
            )
            .await?;
        self.track_event_best_effort(Event::new(EventType::WorkflowCancelled, workflow_id.clone(), Utc::now())).await;
        Ok(())
    }

    /// Resolves orphaned `Running` tasks found in the state store — left
    /// behind by a process crash mid-execution — per `config.crash_recovery_policy`.
    pub async fn recover_workflow(&self, workflow_id: &WorkflowId) -> Result<()> {
        let state = self.get_workflow_status(workflow_id).await?;
        let orphaned: Vec<TaskId> =
            state.tasks.values().filter(|t| t.status == TaskStatus::Running).map(|t| t.task_id.clone()).collect();
        if orphaned.is_empty() {
            return Ok(());
        }

        let policy = self.config.crash_recovery_policy;
        self.store
            .update_workflow(
                workflow_id,
                Some(state.version),
                Box::new(move |s| {
                    for task_id in &orphaned {
                        if let Some(task) = s.tasks.get_mut(task_id) {
                            match policy {
                                CrashRecoveryPolicy::MarkFailed => {
                                    task.status = TaskStatus::Failed;
                                    task.error = Some(TaskFailure {
                                        message: "task was running when the process restarted".to_string(),
                                        error_type: "CRASH_RECOVERY".to_string(),
                                    });
                                    task.completed_at = Some(Utc::now());
                                }
                                CrashRecoveryPolicy::ResetToPending => {
                                    task.status = TaskStatus::Pending;
                                    task.started_at = None;
                                }
                            }
                        }
                    }
                }),
                "crash_recovery",
            )
            .await?;
        Ok(())
    }

    /// Drives `workflow_id` from its current status to a terminal one (or
    /// until paused/cancelled mid-flight), scheduling ready tasks with
    /// bounded parallelism until none remain.
    pub async fn execute_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowResult> {
        let state = self.get_workflow_status(workflow_id).await?;
        match state.status {
            WorkflowStatus::Pending => {
                self.store
                    .update_workflow(
                        workflow_id,
                        Some(state.version),
                        Box::new(|s| {
                            s.status = WorkflowStatus::Running;
                            s.started_at = Some(Utc::now());
                        }),
                        "workflow_started",
                    )
                    .await?;
                self.track_event_best_effort(Event::new(EventType::WorkflowStarted, workflow_id.clone(), Utc::now())).await;
            }
            // A `Paused` workflow is left untouched: the scheduling loop below
            // simply finds `scheduling_active` false and returns immediately
            // with `status: Paused`. Callers resume explicitly via `resume_workflow`.
            WorkflowStatus::Paused | WorkflowStatus::Running => {}
            other if other.is_absorbing() => {
                return Err(CoreError::state(format!("workflow {workflow_id} is already {other}")));
            }
            _ => {}
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_tasks.max(1)));
        let variables = Arc::new(parking_lot::RwLock::new(serde_json::Map::new()));
        let mut in_flight = FuturesUnordered::new();

        loop {
            let state = self.get_workflow_status(workflow_id).await?;
            let scheduling_active = state.status == WorkflowStatus::Running;

            if scheduling_active {
                for task_id in state.tasks_to_skip() {
                    self.skip_task(workflow_id, &task_id).await?;
                }
            }

            let state = self.get_workflow_status(workflow_id).await?;
            let ready = if scheduling_active { state.ready_tasks() } else { Vec::new() };

            for task_id in ready {
                self.start_task(workflow_id, &task_id).await?;
                let handle = tokio::spawn(run_task(
                    self.store.clone(),
                    self.tracker.clone(),
                    self.registry.clone(),
                    semaphore.clone(),
                    self.config.event_tracker_enabled,
                    workflow_id.clone(),
                    task_id,
                    variables.clone(),
                ));
                in_flight.push(handle);
            }

            if in_flight.is_empty() {
                let state = self.get_workflow_status(workflow_id).await?;
                if state.all_tasks_terminal() || !scheduling_active {
                    break;
                }
                return Err(CoreError::orchestration("scheduler has no ready tasks and none in flight"));
            }

            if let Some(joined) = in_flight.next().await {
                joined.map_err(|e| CoreError::orchestration(format!("task join error: {e}")))??;
            }
        }

        self.finalize(workflow_id).await
    }

    async fn finalize(&self, workflow_id: &WorkflowId) -> Result<WorkflowResult> {
        let final_state = self.get_workflow_status(workflow_id).await?;
        let final_status = match final_state.status {
            WorkflowStatus::Paused => WorkflowStatus::Paused,
            WorkflowStatus::Cancelled => WorkflowStatus::Cancelled,
            _ if final_state.any_task_failed_without_allow_failure() => WorkflowStatus::Failed,
            _ => WorkflowStatus::Completed,
        };

        if final_state.status != final_status {
            self.store
                .update_workflow(
                    workflow_id,
                    Some(final_state.version),
                    Box::new(move |s| {
                        s.status = final_status;
                        s.completed_at = Some(Utc::now());
                    }),
                    "workflow_finished",
                )
                .await?;

            match final_status {
                WorkflowStatus::Completed => {
                    self.track_event_best_effort(Event::new(EventType::WorkflowCompleted, workflow_id.clone(), Utc::now())).await
                }
                WorkflowStatus::Failed => {
                    self.track_event_best_effort(Event::new(EventType::WorkflowFailed, workflow_id.clone(), Utc::now())).await
                }
                _ => {}
            }
        }

        let tasks: HashMap<TaskId, TaskOutcome> = final_state
            .tasks
            .into_iter()
            .map(|(id, t)| {
                (
                    id,
                    TaskOutcome { status: t.status, result: t.result, error: t.error, attempt: t.attempt },
                )
            })
            .collect();

        Ok(WorkflowResult { status: final_status, tasks })
    }

    async fn start_task(&self, workflow_id: &WorkflowId, task_id: &TaskId) -> Result<()> {
        let now = Utc::now();
        let target = task_id.clone();
        self.store
            .update_workflow(
                workflow_id,
                None,
                Box::new(move |s| {
                    if let Some(task) = s.tasks.get_mut(&target) {
                        task.status = TaskStatus::Running;
                        task.started_at = Some(now);
                        task.attempt += 1;
                    }
                }),
                "task_started",
            )
            .await?;
        self.track_event_best_effort(Event::new(EventType::TaskStarted, workflow_id.clone(), now).with_task(task_id.clone())).await;
        Ok(())
    }

    async fn skip_task(&self, workflow_id: &WorkflowId, task_id: &TaskId) -> Result<()> {
        let now = Utc::now();
        let target = task_id.clone();
        self.store
            .update_workflow(
                workflow_id,
                None,
                Box::new(move |s| {
                    if let Some(task) = s.tasks.get_mut(&target) {
                        task.status = TaskStatus::Skipped;
                        task.completed_at = Some(now);
                    }
                }),
                "task_skipped_dependency_failed",
            )
            .await?;
        self.track_event_best_effort(Event::new(EventType::TaskSkipped, workflow_id.clone(), now).with_task(task_id.clone())).await;
        Ok(())
    }

    async fn track_event_best_effort(&self, event: Event) {
        if !self.config.event_tracker_enabled {
            return;
        }
        if let Err(err) = self.tracker.track_event(event).await {
            warn!(%err, "event tracker failed to persist event; continuing without it");
        }
    }
}

/// Runs one task end to end, including its internal retry loop, then
/// returns once it reaches a terminal status. Spawned by the scheduling
/// loop rather than invoked as a method, so it only needs cloned handles.
async fn run_task(
    store: Arc<dyn WorkflowStore>,
    tracker: Arc<dyn EventTracker>,
    registry: Arc<ExecutorRegistry>,
    semaphore: Arc<Semaphore>,
    event_tracker_enabled: bool,
    workflow_id: WorkflowId,
    task_id: TaskId,
    variables: Arc<parking_lot::RwLock<serde_json::Map<String, Value>>>,
) -> Result<()> {
    loop {
        let state = store.get_workflow(&workflow_id).await?.ok_or_else(|| CoreError::workflow_not_found(&workflow_id))?;
        let task = state.tasks.get(&task_id).cloned().ok_or_else(|| CoreError::task_not_found(&workflow_id, &task_id))?;

        let previous_results: Vec<(TaskId, serde_json::Value)> = task
            .dependencies
            .iter()
            .filter_map(|dep_id| state.tasks.get(dep_id).map(|dep| (dep_id.clone(), dep.result.clone().unwrap_or(Value::Null))))
            .collect();

        let outcome = {
            let _permit = semaphore.clone().acquire_owned().await.map_err(|e| CoreError::orchestration(e.to_string()))?;
            execute_once(&registry, &task, &workflow_id, state.context.clone(), previous_results, variables.clone()).await
        };

        // The workflow may have been cancelled while this task was running.
        // Cancellation is cooperative: the task finishes naturally, but once
        // the workflow is absorbing its outcome is discarded rather than
        // persisted, matching the "no further task transitions" invariant.
        let current = store.get_workflow(&workflow_id).await?.ok_or_else(|| CoreError::workflow_not_found(&workflow_id))?;
        if current.status.is_absorbing() {
            return Ok(());
        }

        match outcome {
            Ok(value) => {
                let now = Utc::now();
                let target = task_id.clone();
                store
                    .update_workflow(
                        &workflow_id,
                        None,
                        Box::new(move |s| {
                            if let Some(t) = s.tasks.get_mut(&target) {
                                t.status = TaskStatus::Completed;
                                t.result = Some(value);
                                t.completed_at = Some(now);
                            }
                        }),
                        "task_completed",
                    )
                    .await?;
                track_event_best_effort(
                    &tracker,
                    event_tracker_enabled,
                    Event::new(EventType::TaskCompleted, workflow_id.clone(), now).with_task(task_id.clone()),
                )
                .await;
                return Ok(());
            }
            Err(failure) => {
                if task.attempt < task.retry_policy.max_attempts {
                    let now = Utc::now();
                    let target = task_id.clone();
                    let failure_clone = failure.clone();
                    store
                        .update_workflow(
                            &workflow_id,
                            None,
                            Box::new(move |s| {
                                if let Some(t) = s.tasks.get_mut(&target) {
                                    t.status = TaskStatus::Retrying;
                                    t.error = Some(failure_clone);
                                }
                            }),
                            "task_retry_scheduled",
                        )
                        .await?;
                    track_event_best_effort(
                        &tracker,
                        event_tracker_enabled,
                        Event::new(EventType::Retry, workflow_id.clone(), now).with_task(task_id.clone()),
                    )
                    .await;

                    tokio::time::sleep(Duration::from_millis(jittered_delay(&task.retry_policy, task.attempt))).await;

                    let target = task_id.clone();
                    store
                        .update_workflow(
                            &workflow_id,
                            None,
                            Box::new(move |s| {
                                if let Some(t) = s.tasks.get_mut(&target) {
                                    t.status = TaskStatus::Running;
                                    t.attempt += 1;
                                }
                            }),
                            "task_retry_attempt",
                        )
                        .await?;
                } else {
                    let now = Utc::now();
                    let target = task_id.clone();
                    let failure_clone = failure.clone();
                    store
                        .update_workflow(
                            &workflow_id,
                            None,
                            Box::new(move |s| {
                                if let Some(t) = s.tasks.get_mut(&target) {
                                    t.status = TaskStatus::Failed;
                                    t.error = Some(failure_clone);
                                    t.completed_at = Some(now);
                                }
                            }),
                            "task_failed",
                        )
                        .await?;
                    track_event_best_effort(
                        &tracker,
                        event_tracker_enabled,
                        Event::new(EventType::TaskFailed, workflow_id.clone(), now)
                            .with_task(task_id.clone())
                            .with_error(failure.message.clone(), failure.error_type.clone()),
                    )
                    .await;
                    return Ok(());
                }
            }
        }
    }
}

async fn execute_once(
    registry: &ExecutorRegistry,
    task: &workflow_core::models::TaskRuntimeState,
    workflow_id: &WorkflowId,
    workflow_context: Value,
    previous_results: Vec<(TaskId, Value)>,
    variables: Arc<parking_lot::RwLock<serde_json::Map<String, Value>>>,
) -> std::result::Result<Value, TaskFailure> {
    let executor = registry.get(&task.agent_type).ok_or_else(|| TaskFailure {
        message: format!("no executor registered for agent_type '{}'", task.agent_type),
        error_type: "UNREGISTERED_EXECUTOR".to_string(),
    })?;

    let ctx = TaskExecutionContext {
        task_def: TaskDef {
            task_id: task.task_id.clone(),
            agent_type: task.agent_type.clone(),
            dependencies: task.dependencies.clone(),
            retry_policy: task.retry_policy.clone(),
            timeout_seconds: task.timeout_seconds,
            allow_failure: task.allow_failure,
            input_data: task.input_data.clone(),
        },
        workflow_id: workflow_id.clone(),
        workflow_context,
        previous_results,
        variables,
    };

    match task.timeout_seconds {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), executor.execute(ctx)).await {
            Ok(inner) => inner.map_err(|e| TaskFailure { message: e.message, error_type: "EXECUTION_FAILED".to_string() }),
            Err(_) => Err(TaskFailure::timeout()),
        },
        None => executor.execute(ctx).await.map_err(|e| TaskFailure { message: e.message, error_type: "EXECUTION_FAILED".to_string() }),
    }
}

fn jittered_delay(policy: &RetryPolicy, attempt: u32) -> u64 {
    let base = policy.base_delay_ms(attempt);
    if !policy.jitter {
        return base;
    }
    let factor: f64 = rand::thread_rng().gen_range(0.85..1.15);
    ((base as f64) * factor).round().max(0.0) as u64
}

async fn track_event_best_effort(tracker: &Arc<dyn EventTracker>, enabled: bool, event: Event) {
    if !enabled {
        return;
    }
    if let Err(err) = tracker.track_event(event).await {
        warn!(%err, "event tracker failed to persist event; continuing without it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mocks::{InMemoryEventTracker, InMemoryWorkflowStore};
    use serde_json::json;
    use workflow_core::executor::ExecutorFailure;

    struct Echo;

    #[async_trait]
    impl TaskExecutor for Echo {
        async fn execute(&self, ctx: TaskExecutionContext) -> std::result::Result<Value, ExecutorFailure> {
            Ok(ctx.task_def.input_data)
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl TaskExecutor for AlwaysFails {
        async fn execute(&self, _ctx: TaskExecutionContext) -> std::result::Result<Value, ExecutorFailure> {
            Err(ExecutorFailure::new("boom"))
        }
    }

    fn orchestrator() -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(
            Arc::new(InMemoryWorkflowStore::new()),
            Arc::new(InMemoryEventTracker::new()),
            OrchestratorConfig { max_parallel_tasks: 4, ..Default::default() },
        )
    }

    fn def(id: &str, deps: Vec<&str>) -> TaskDef {
        TaskDef {
            task_id: TaskId::new(id),
            agent_type: "echo".to_string(),
            dependencies: deps.into_iter().map(TaskId::new).collect(),
            retry_policy: RetryPolicy { max_attempts: 1, ..Default::default() },
            timeout_seconds: Some(5),
            allow_failure: false,
            input_data: json!({ "id": id }),
        }
    }

    #[tokio::test]
    async fn diamond_graph_executes_to_completion() {
        let orch = orchestrator();
        orch.register_executor("echo", Arc::new(Echo));
        let defs = vec![def("a", vec![]), def("b", vec!["a"]), def("c", vec!["a"]), def("d", vec!["b", "c"])];
        let workflow_id = orch.create_workflow(defs, None, None).await.unwrap();
        let result = orch.execute_workflow(&workflow_id).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.tasks.len(), 4);
    }

    #[tokio::test]
    async fn failed_required_task_skips_dependents() {
        let orch = orchestrator();
        orch.register_executor("echo", Arc::new(Echo));
        orch.register_executor("fails", Arc::new(AlwaysFails));
        let mut bad = def("a", vec![]);
        bad.agent_type = "fails".to_string();
        let defs = vec![bad, def("b", vec!["a"])];
        let workflow_id = orch.create_workflow(defs, None, None).await.unwrap();
        let result = orch.execute_workflow(&workflow_id).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(result.skipped_tasks(), vec![&TaskId::new("b")]);
    }

    #[tokio::test]
    async fn allow_failure_branch_does_not_fail_workflow() {
        let orch = orchestrator();
        orch.register_executor("echo", Arc::new(Echo));
        orch.register_executor("fails", Arc::new(AlwaysFails));
        let mut bad = def("a", vec![]);
        bad.agent_type = "fails".to_string();
        bad.allow_failure = true;
        let defs = vec![bad, def("b", vec![])];
        let workflow_id = orch.create_workflow(defs, None, None).await.unwrap();
        let result = orch.execute_workflow(&workflow_id).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn pause_stops_scheduling_new_tasks() {
        let orch = orchestrator();
        orch.register_executor("echo", Arc::new(Echo));
        let defs = vec![def("a", vec![])];
        let workflow_id = orch.create_workflow(defs, None, None).await.unwrap();

        // Drive the workflow to `Running` without letting the scheduler run,
        // so `pause_workflow` (only legal from `Running`) can apply before
        // any task executes.
        let state = orch.store.get_workflow(&workflow_id).await.unwrap().unwrap();
        orch.store
            .update_workflow(&workflow_id, Some(state.version), Box::new(|s| s.status = WorkflowStatus::Running), "test_setup")
            .await
            .unwrap();

        orch.pause_workflow(&workflow_id).await.unwrap();
        let result = orch.execute_workflow(&workflow_id).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Paused);
    }

    /// Simulates a process crash by leaving a task `Running` with no
    /// scheduler watching it, the way a restart would find persisted state.
    async fn orphan_one_running_task(orch: &WorkflowOrchestrator, workflow_id: &WorkflowId) {
        let state = orch.store.get_workflow(workflow_id).await.unwrap().unwrap();
        orch.store
            .update_workflow(
                workflow_id,
                Some(state.version),
                Box::new(|s| {
                    s.status = WorkflowStatus::Running;
                    let task = s.tasks.values_mut().next().unwrap();
                    task.status = TaskStatus::Running;
                    task.attempt = 1;
                }),
                "test_setup_orphaned_task",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn crash_recovery_mark_failed_fails_the_orphaned_task() {
        let orch = WorkflowOrchestrator::new(
            Arc::new(InMemoryWorkflowStore::new()),
            Arc::new(InMemoryEventTracker::new()),
            OrchestratorConfig {
                max_parallel_tasks: 4,
                crash_recovery_policy: CrashRecoveryPolicy::MarkFailed,
                ..Default::default()
            },
        );
        orch.register_executor("echo", Arc::new(Echo));
        let workflow_id = orch.create_workflow(vec![def("a", vec![])], None, None).await.unwrap();
        orphan_one_running_task(&orch, &workflow_id).await;

        orch.recover_workflow(&workflow_id).await.unwrap();

        let state = orch.get_workflow_status(&workflow_id).await.unwrap();
        let task = &state.tasks[&TaskId::new("a")];
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_ref().unwrap().error_type, "CRASH_RECOVERY");

        // The workflow is still `Running` after recovery; a subsequent
        // `execute_workflow` call drives it to its terminal status.
        let result = orch.execute_workflow(&workflow_id).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn crash_recovery_reset_to_pending_retries_the_orphaned_task() {
        let orch = WorkflowOrchestrator::new(
            Arc::new(InMemoryWorkflowStore::new()),
            Arc::new(InMemoryEventTracker::new()),
            OrchestratorConfig {
                max_parallel_tasks: 4,
                crash_recovery_policy: CrashRecoveryPolicy::ResetToPending,
                ..Default::default()
            },
        );
        orch.register_executor("echo", Arc::new(Echo));
        let workflow_id = orch.create_workflow(vec![def("a", vec![])], None, None).await.unwrap();
        orphan_one_running_task(&orch, &workflow_id).await;

        orch.recover_workflow(&workflow_id).await.unwrap();

        let state = orch.get_workflow_status(&workflow_id).await.unwrap();
        let task = &state.tasks[&TaskId::new("a")];
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());

        let result = orch.execute_workflow(&workflow_id).await.unwrap();
        assert_eq!(result.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn recover_workflow_is_a_no_op_when_nothing_is_orphaned() {
        let orch = orchestrator();
        orch.register_executor("echo", Arc::new(Echo));
        let workflow_id = orch.create_workflow(vec![def("a", vec![])], None, None).await.unwrap();
        orch.recover_workflow(&workflow_id).await.unwrap();
        let state = orch.get_workflow_status(&workflow_id).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Pending);
    }
}
