//! Domain models for workflows and tasks.
//!
//! Mirrors the shape of the durable rows in `state-store`: a
//! `WorkflowState` owns a map of `TaskRuntimeState`s, both carry a
//! monotonic `version`, and both are re-derivable in full from a
//! `HistorySnapshot` at any prior version.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{AgentId, TaskId, WorkflowId};

/// Workflow lifecycle. `Completed`, `Failed`, and `Cancelled` are absorbing:
/// no further task transitions are permitted except via explicit rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_absorbing(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Task lifecycle. `Completed`, `Failed`, and `Skipped` are absorbing
/// except via workflow rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Retrying,
}

impl TaskStatus {
    /// Valid task status transitions; a task's state machine never regresses
    /// out of an absorbing state (`Completed`, `Failed`, `Skipped`).
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Retrying)
                | (Retrying, Running)
        )
    }

    pub fn is_absorbing(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn is_terminal_success(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Retrying => "retrying",
        };
        write!(f, "{s}")
    }
}

/// Per-task retry behaviour. Delay is `min(initial_delay * base^(attempt-1), max_delay)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the given 1-based attempt number, before jitter.
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.max(1);
        let scaled = self.initial_delay_ms as f64 * self.exponential_base.powi(attempt as i32 - 1);
        scaled.min(self.max_delay_ms as f64) as u64
    }
}

/// Caller-supplied definition of a single task within a workflow, before execution begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
    pub task_id: TaskId,
    pub agent_type: String,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub allow_failure: bool,
    #[serde(default = "default_input")]
    pub input_data: Value,
}

fn default_input() -> Value {
    Value::Object(Default::default())
}

/// Structured failure captured when an executor returns `Err` or times out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub message: String,
    pub error_type: String,
}

impl TaskFailure {
    pub fn timeout() -> Self {
        Self {
            message: "task execution exceeded its timeout".to_string(),
            error_type: "TIMEOUT".to_string(),
        }
    }
}

/// Durable runtime state for one task within one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRuntimeState {
    pub task_id: TaskId,
    pub workflow_id: WorkflowId,
    pub agent_id: Option<AgentId>,
    pub agent_type: String,
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<TaskFailure>,
    pub attempt: u32,
    pub retry_policy: RetryPolicy,
    pub timeout_seconds: Option<u64>,
    pub allow_failure: bool,
    pub input_data: Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl TaskRuntimeState {
    pub fn from_def(workflow_id: WorkflowId, def: TaskDef, now: DateTime<Utc>) -> Self {
        Self {
            task_id: def.task_id,
            workflow_id,
            agent_id: None,
            agent_type: def.agent_type,
            dependencies: def.dependencies,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            attempt: 0,
            retry_policy: def.retry_policy,
            timeout_seconds: def.timeout_seconds,
            allow_failure: def.allow_failure,
            input_data: def.input_data,
            created_at: now,
            started_at: None,
            completed_at: None,
            version: 1,
        }
    }

    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        self.status.can_transition_to(to)
    }
}

/// Durable workflow state: status, shared context, metadata, and the tasks it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub context: Value,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub tasks: HashMap<TaskId, TaskRuntimeState>,
}

impl WorkflowState {
    pub fn new(workflow_id: WorkflowId, context: Value, metadata: Value, now: DateTime<Utc>) -> Self {
        Self {
            workflow_id,
            status: WorkflowStatus::Pending,
            context,
            metadata,
            created_at: now,
            started_at: None,
            completed_at: None,
            version: 1,
            tasks: HashMap::new(),
        }
    }

    pub fn can_transition_to(&self, to: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self.status, to),
            (Pending, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }

    /// All pending tasks whose dependencies are satisfied: completed, or
    /// failed with `allow_failure=true` on the failing dependency. A
    /// `Skipped` dependency never satisfies readiness — it propagates the
    /// skip instead, via `tasks_to_skip`.
    pub fn ready_tasks(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.dependencies.iter().all(|dep_id| match self.tasks.get(dep_id) {
                    Some(dep) => {
                        dep.status == TaskStatus::Completed || (dep.status == TaskStatus::Failed && dep.allow_failure)
                    }
                    None => false,
                })
            })
            .map(|t| t.task_id.clone())
            .collect()
    }

    /// Pending tasks that must be skipped because a dependency failed
    /// without `allow_failure`, or was itself skipped — so the skip
    /// cascades down an arbitrarily long dependency chain.
    pub fn tasks_to_skip(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| {
                t.dependencies.iter().any(|dep_id| {
                    matches!(
                        self.tasks.get(dep_id),
                        Some(dep) if (dep.status == TaskStatus::Failed && !dep.allow_failure) || dep.status == TaskStatus::Skipped
                    )
                })
            })
            .map(|t| t.task_id.clone())
            .collect()
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks
            .values()
            .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped))
    }

    pub fn any_task_failed_without_allow_failure(&self) -> bool {
        self.tasks.values().any(|t| t.status == TaskStatus::Failed && !t.allow_failure)
    }
}

/// One pre-mutation snapshot, recorded on every workflow/task mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub version: i64,
    pub snapshot: Value,
    pub changed_at: DateTime<Utc>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn task_fsm_allows_only_documented_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Retrying.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
    }

    #[test]
    fn retry_policy_caps_delay_at_max() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            exponential_base: 2.0,
            jitter: false,
        };
        assert_eq!(policy.base_delay_ms(1), 1000);
        assert_eq!(policy.base_delay_ms(2), 2000);
        assert_eq!(policy.base_delay_ms(3), 4000);
        assert_eq!(policy.base_delay_ms(4), 5000); // would be 8000, capped
    }

    #[test]
    fn ready_tasks_respects_allow_failure() {
        let mut wf = WorkflowState::new(WorkflowId::new("w1"), json!({}), json!({}), now());
        let a = TaskDef {
            task_id: TaskId::new("a"),
            agent_type: "noop".into(),
            dependencies: vec![],
            retry_policy: RetryPolicy { max_attempts: 1, ..Default::default() },
            timeout_seconds: None,
            allow_failure: false,
            input_data: json!({}),
        };
        let mut a_state = TaskRuntimeState::from_def(wf.workflow_id.clone(), a, now());
        a_state.status = TaskStatus::Failed;
        wf.tasks.insert(a_state.task_id.clone(), a_state);

        let b = TaskDef {
            task_id: TaskId::new("b"),
            agent_type: "noop".into(),
            dependencies: vec![TaskId::new("a")],
            retry_policy: RetryPolicy::default(),
            timeout_seconds: None,
            allow_failure: false,
            input_data: json!({}),
        };
        wf.tasks.insert(b.task_id.clone(), TaskRuntimeState::from_def(wf.workflow_id.clone(), b, now()));

        assert!(wf.ready_tasks().is_empty());
        assert_eq!(wf.tasks_to_skip(), vec![TaskId::new("b")]);
    }

    #[test]
    fn skip_cascades_through_a_multi_level_dependency_chain() {
        let mut wf = WorkflowState::new(WorkflowId::new("w1"), json!({}), json!({}), now());
        let a = TaskDef {
            task_id: TaskId::new("a"),
            agent_type: "noop".into(),
            dependencies: vec![],
            retry_policy: RetryPolicy { max_attempts: 1, ..Default::default() },
            timeout_seconds: None,
            allow_failure: false,
            input_data: json!({}),
        };
        let mut a_state = TaskRuntimeState::from_def(wf.workflow_id.clone(), a, now());
        a_state.status = TaskStatus::Failed;
        wf.tasks.insert(a_state.task_id.clone(), a_state);

        let b = TaskDef {
            task_id: TaskId::new("b"),
            agent_type: "noop".into(),
            dependencies: vec![TaskId::new("a")],
            retry_policy: RetryPolicy::default(),
            timeout_seconds: None,
            allow_failure: false,
            input_data: json!({}),
        };
        let mut b_state = TaskRuntimeState::from_def(wf.workflow_id.clone(), b, now());
        // Simulates the orchestrator having already skipped `b` on a prior
        // ready-set recomputation, before `c` is considered.
        b_state.status = TaskStatus::Skipped;
        wf.tasks.insert(b_state.task_id.clone(), b_state);

        let c = TaskDef {
            task_id: TaskId::new("c"),
            agent_type: "noop".into(),
            dependencies: vec![TaskId::new("b")],
            retry_policy: RetryPolicy::default(),
            timeout_seconds: None,
            allow_failure: false,
            input_data: json!({}),
        };
        wf.tasks.insert(c.task_id.clone(), TaskRuntimeState::from_def(wf.workflow_id.clone(), c, now()));

        assert!(wf.ready_tasks().is_empty());
        assert_eq!(wf.tasks_to_skip(), vec![TaskId::new("c")]);
    }
}
