use crate::ids::{TaskId, WorkflowId};
use thiserror::Error;

/// Result type alias for core orchestration operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Closed error taxonomy shared by the state manager, event tracker,
/// agent registry and orchestrator. Each variant maps to one concern
/// from the propagation policy: validation/dependency errors surface
/// immediately, version conflicts are retried once by the caller,
/// tracker errors are logged and swallowed.
///
/// # Examples
///
/// ```rust
/// use workflow_core::error::CoreError;
///
/// let not_found = CoreError::NotFound("workflow w-1".to_string());
/// assert!(not_found.is_not_found());
/// assert_eq!(not_found.status_code(), 404);
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Task graph is malformed: a cycle, a missing dependency, or a duplicate task id.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// A handoff message, event, or task definition failed schema validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// An illegal state transition, a missing rollback target, or a mutation
    /// attempted against an absorbing workflow/task state.
    #[error("state error: {0}")]
    State(String),

    /// Optimistic concurrency check failed in the state manager.
    #[error("version conflict on {kind} {id}: expected {expected}, found {actual}")]
    VersionConflict {
        kind: &'static str,
        id: String,
        expected: i64,
        actual: i64,
    },

    /// Executor raised, was never registered, or exceeded its timeout.
    #[error("execution error: {0}")]
    Execution(String),

    /// Scheduling-loop failure not otherwise classified.
    #[error("orchestration error: {0}")]
    Orchestration(String),

    /// Agent registry CRUD/search failure.
    #[error("registry error: {0}")]
    Registry(String),

    /// Event tracker persistence failure. Never propagated to orchestration callers.
    #[error("tracker error: {0}")]
    Tracker(String),

    /// Entity not found by the given identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying storage backend error.
    #[error("database error: {0}")]
    Database(String),
}

impl CoreError {
    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::Dependency(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn orchestration(msg: impl Into<String>) -> Self {
        Self::Orchestration(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn tracker(msg: impl Into<String>) -> Self {
        Self::Tracker(msg.into())
    }

    pub fn workflow_not_found(id: &WorkflowId) -> Self {
        Self::NotFound(format!("workflow {id}"))
    }

    pub fn task_not_found(workflow_id: &WorkflowId, task_id: &TaskId) -> Self {
        Self::NotFound(format!("task {task_id} in workflow {workflow_id}"))
    }

    pub fn version_conflict(kind: &'static str, id: impl Into<String>, expected: i64, actual: i64) -> Self {
        Self::VersionConflict { kind, id: id.into(), expected, actual }
    }

    pub fn invalid_transition(
        kind: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::State(format!("{kind} cannot transition from {from} to {to}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, Self::Dependency(_))
    }

    /// HTTP-style status code, kept for callers that expose this engine over a web API.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Dependency(_) => 422,
            Self::State(_) => 422,
            Self::VersionConflict { .. } => 409,
            Self::Execution(_) => 500,
            Self::Orchestration(_) => 500,
            Self::Registry(_) => 500,
            Self::Tracker(_) => 500,
            Self::Database(_) => 500,
        }
    }
}
