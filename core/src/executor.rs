//! Executor contract: the polymorphic "agent" interface the orchestrator
//! dispatches tasks to, keyed by `agent_type`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::ids::{TaskId, WorkflowId};
use crate::models::TaskDef;

/// Everything an executor needs to run one task: its own definition, the
/// workflow it belongs to, the results of its direct dependencies (in
/// dependency order), and a mutable handle onto the workflow's shared
/// variables.
pub struct TaskExecutionContext {
    pub task_def: TaskDef,
    pub workflow_id: WorkflowId,
    pub workflow_context: Value,
    pub previous_results: Vec<(TaskId, Value)>,
    pub variables: Arc<RwLock<serde_json::Map<String, Value>>>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ExecutorFailure {
    pub message: String,
}

impl ExecutorFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// An executor registered under one `agent_type`. Implementations are
/// supplied by the caller; this crate ships none — the orchestrator has no
/// built-in agent runtime.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, ctx: TaskExecutionContext) -> Result<Value, ExecutorFailure>;
}

/// Thread-safe registry of executors keyed by `agent_type`. Re-registering
/// a type replaces the previous executor.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn TaskExecutor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.executors.write().insert(agent_type.into(), executor);
    }

    pub fn get(&self, agent_type: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.read().get(agent_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl TaskExecutor for Echo {
        async fn execute(&self, ctx: TaskExecutionContext) -> Result<Value, ExecutorFailure> {
            Ok(ctx.task_def.input_data)
        }
    }

    #[test]
    fn registering_same_type_twice_replaces_executor() {
        let registry = ExecutorRegistry::new();
        registry.register("echo", Arc::new(Echo));
        assert!(registry.get("echo").is_some());
        registry.register("echo", Arc::new(Echo));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
    }
}
