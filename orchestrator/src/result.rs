//! The outcome of one `execute_workflow` call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use workflow_core::ids::TaskId;
use workflow_core::models::{TaskFailure, TaskStatus, WorkflowStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<TaskFailure>,
    pub attempt: u32,
}

/// Per-task results plus the workflow's final status, returned to the
/// caller of `execute_workflow` once every task has reached a terminal
/// state (or the workflow was paused/cancelled mid-flight).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    pub tasks: HashMap<TaskId, TaskOutcome>,
}

impl WorkflowResult {
    pub fn failed_tasks(&self) -> Vec<&TaskId> {
        self.tasks.iter().filter(|(_, o)| o.status == TaskStatus::Failed).map(|(id, _)| id).collect()
    }

    pub fn skipped_tasks(&self) -> Vec<&TaskId> {
        self.tasks.iter().filter(|(_, o)| o.status == TaskStatus::Skipped).map(|(id, _)| id).collect()
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }
}
