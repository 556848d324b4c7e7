//! In-memory `WorkflowStore` test double.
//!
//! Mirrors `MockTaskRepository`'s shape: a `parking_lot::Mutex`-guarded
//! map, error injection for failure-path testing, and call-history
//! tracking for verifying which methods a caller invoked.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use workflow_core::error::{CoreError, Result};
use workflow_core::ids::WorkflowId;
use workflow_core::models::{HistorySnapshot, TaskDef, TaskRuntimeState, WorkflowState};
use workflow_core::store::{WorkflowFilter, WorkflowStore};

pub struct InMemoryWorkflowStore {
    workflows: Mutex<HashMap<WorkflowId, WorkflowState>>,
    history: Mutex<HashMap<WorkflowId, Vec<HistorySnapshot>>>,
    error_injection: Mutex<Option<CoreError>>,
    call_history: Mutex<Vec<String>>,
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self {
            workflows: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            error_injection: Mutex::new(None),
            call_history: Mutex::new(Vec::new()),
        }
    }

    pub fn inject_error(&self, error: CoreError) {
        *self.error_injection.lock() = Some(error);
    }

    pub fn call_history(&self) -> Vec<String> {
        self.call_history.lock().clone()
    }

    pub fn assert_called(&self, method: &str) {
        let history = self.call_history.lock();
        assert!(
            history.iter().any(|c| c.contains(method)),
            "method '{method}' was not called. call history: {history:?}"
        );
    }

    fn check_error_injection(&self) -> Result<()> {
        if let Some(error) = self.error_injection.lock().take() {
            return Err(error);
        }
        Ok(())
    }

    fn record(&self, method: &str) {
        self.call_history.lock().push(method.to_string());
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_workflow(
        &self,
        workflow_id: WorkflowId,
        tasks: Vec<TaskDef>,
        context: Value,
        metadata: Value,
    ) -> Result<WorkflowState> {
        self.record("create_workflow");
        self.check_error_injection()?;

        if self.workflows.lock().contains_key(&workflow_id) {
            return Err(CoreError::state(format!("workflow {workflow_id} already exists")));
        }

        let now = Utc::now();
        let mut state = WorkflowState::new(workflow_id.clone(), context, metadata, now);
        for def in tasks {
            let task = TaskRuntimeState::from_def(workflow_id.clone(), def, now);
            state.tasks.insert(task.task_id.clone(), task);
        }

        self.history.lock().entry(workflow_id.clone()).or_default().push(HistorySnapshot {
            version: 1,
            snapshot: serde_json::to_value(&state).unwrap(),
            changed_at: now,
            reason: "workflow_created".to_string(),
        });
        self.workflows.lock().insert(workflow_id, state.clone());
        Ok(state)
    }

    async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowState>> {
        self.record("get_workflow");
        self.check_error_injection()?;
        Ok(self.workflows.lock().get(workflow_id).cloned())
    }

    async fn list_workflows(&self, filter: WorkflowFilter) -> Result<Vec<WorkflowState>> {
        self.record("list_workflows");
        self.check_error_injection()?;

        let workflows = self.workflows.lock();
        let mut result: Vec<WorkflowState> = workflows
            .values()
            .filter(|w| filter.status.map(|s| s == w.status).unwrap_or(true))
            .filter(|w| filter.created_after.map(|t| w.created_at >= t).unwrap_or(true))
            .filter(|w| filter.created_before.map(|t| w.created_at <= t).unwrap_or(true))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(offset) = filter.offset {
            result = result.into_iter().skip(offset as usize).collect();
        }
        if let Some(limit) = filter.limit {
            result.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn update_workflow(
        &self,
        workflow_id: &WorkflowId,
        expected_version: Option<i64>,
        mutate: Box<dyn FnOnce(&mut WorkflowState) + Send>,
        reason: &str,
    ) -> Result<i64> {
        self.record("update_workflow");
        self.check_error_injection()?;

        let mut workflows = self.workflows.lock();
        let state = workflows.get_mut(workflow_id).ok_or_else(|| CoreError::workflow_not_found(workflow_id))?;

        if let Some(expected) = expected_version {
            if state.version != expected {
                return Err(CoreError::version_conflict("workflow", workflow_id.as_str(), expected, state.version));
            }
        }

        if state.status.is_absorbing() {
            return Err(CoreError::state(format!(
                "workflow {workflow_id} is {} and accepts no further mutations except rollback",
                state.status
            )));
        }

        let pre_mutation = serde_json::to_value(&*state).unwrap();
        mutate(state);
        state.version += 1;

        self.history.lock().entry(workflow_id.clone()).or_default().push(HistorySnapshot {
            version: state.version - 1,
            snapshot: pre_mutation,
            changed_at: Utc::now(),
            reason: reason.to_string(),
        });

        Ok(state.version)
    }

    async fn get_workflow_history(&self, workflow_id: &WorkflowId) -> Result<Vec<HistorySnapshot>> {
        self.record("get_workflow_history");
        self.check_error_injection()?;
        Ok(self.history.lock().get(workflow_id).cloned().unwrap_or_default())
    }

    async fn rollback_workflow(&self, workflow_id: &WorkflowId, target_version: i64) -> Result<i64> {
        self.record("rollback_workflow");
        self.check_error_injection()?;

        let snapshot = {
            let history = self.history.lock();
            let snapshots = history.get(workflow_id).ok_or_else(|| CoreError::workflow_not_found(workflow_id))?;
            snapshots
                .iter()
                .find(|s| s.version == target_version)
                .cloned()
                .ok_or_else(|| CoreError::state(format!("no snapshot at version {target_version}")))?
        };

        let mut workflows = self.workflows.lock();
        let current = workflows.get_mut(workflow_id).ok_or_else(|| CoreError::workflow_not_found(workflow_id))?;
        let current_version = current.version;
        let mut restored: WorkflowState = serde_json::from_value(snapshot.snapshot.clone()).unwrap();
        restored.version = current_version + 1;

        self.history.lock().entry(workflow_id.clone()).or_default().push(HistorySnapshot {
            version: current_version,
            snapshot: serde_json::to_value(&*current).unwrap(),
            changed_at: Utc::now(),
            reason: format!("rollback_to_v{target_version}"),
        });

        *current = restored;
        Ok(current.version)
    }

    async fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<bool> {
        self.record("delete_workflow");
        self.check_error_injection()?;
        self.history.lock().remove(workflow_id);
        Ok(self.workflows.lock().remove(workflow_id).is_some())
    }

    async fn health_check(&self) -> Result<()> {
        self.record("health_check");
        self.check_error_injection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryWorkflowStore::new();
        let id = WorkflowId::new("w1");
        store.create_workflow(id.clone(), vec![], Value::Null, Value::Null).await.unwrap();
        assert!(store.get_workflow(&id).await.unwrap().is_some());
        store.assert_called("create_workflow");
    }

    #[tokio::test]
    async fn injected_error_surfaces_once() {
        let store = InMemoryWorkflowStore::new();
        store.inject_error(CoreError::Database("boom".to_string()));
        assert!(store.health_check().await.is_err());
        assert!(store.health_check().await.is_ok());
    }
}
