//! Storage trait contracts implemented by `state-store` (durable, sqlx-backed)
//! and `mocks` (in-memory test doubles). Mirrors the polymorphic-repository
//! pattern used throughout this codebase: callers depend on the trait object,
//! never on a concrete backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::events::{Event, EventStatistics, EventType, Timeline};
use crate::ids::{AgentId, TaskId, WorkflowId};
use crate::models::{HistorySnapshot, TaskDef, WorkflowState, WorkflowStatus};
use crate::registry::{AgentEntry, HealthReport};

#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub status: Option<WorkflowStatus>,
    pub created_after: Option<chrono::DateTime<chrono::Utc>>,
    pub created_before: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Durable (or in-memory) persistence for workflow and task state — Component B.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create_workflow(
        &self,
        workflow_id: WorkflowId,
        tasks: Vec<TaskDef>,
        context: Value,
        metadata: Value,
    ) -> Result<WorkflowState>;

    async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowState>>;

    async fn list_workflows(&self, filter: WorkflowFilter) -> Result<Vec<WorkflowState>>;

    /// Apply `mutate` to the current state under a write lock, bumping `version`.
    /// If `expected_version` is supplied and does not match the current
    /// version, returns `CoreError::VersionConflict` and does not mutate.
    async fn update_workflow(
        &self,
        workflow_id: &WorkflowId,
        expected_version: Option<i64>,
        mutate: Box<dyn FnOnce(&mut WorkflowState) + Send>,
        reason: &str,
    ) -> Result<i64>;

    async fn get_workflow_history(&self, workflow_id: &WorkflowId) -> Result<Vec<HistorySnapshot>>;

    async fn rollback_workflow(&self, workflow_id: &WorkflowId, target_version: i64) -> Result<i64>;

    async fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<bool>;

    async fn health_check(&self) -> Result<()>;
}

/// Append-only event log — Component C.
#[async_trait]
pub trait EventTracker: Send + Sync {
    async fn track_event(&self, event: Event) -> Result<uuid::Uuid>;

    async fn get_workflow_events(
        &self,
        workflow_id: &WorkflowId,
        event_type: Option<EventType>,
        limit: Option<u32>,
    ) -> Result<Vec<Event>>;

    async fn get_task_events(&self, task_id: &TaskId, limit: Option<u32>) -> Result<Vec<Event>>;

    async fn get_agent_events(
        &self,
        agent_id: &AgentId,
        event_type: Option<EventType>,
        limit: Option<u32>,
    ) -> Result<Vec<Event>>;

    async fn get_handoff_chain(&self, workflow_id: &WorkflowId) -> Result<Vec<Event>>;

    async fn get_workflow_timeline(&self, workflow_id: &WorkflowId) -> Result<Timeline>;

    async fn get_statistics(&self, workflow_id: Option<&WorkflowId>) -> Result<EventStatistics>;

    async fn delete_workflow_events(&self, workflow_id: &WorkflowId) -> Result<u64>;

    /// `false` for the in-memory fallback: it loses data on process restart.
    fn is_durable(&self) -> bool;
}

/// Agent metadata store with text and vector similarity search — Component E.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn create_agent(&self, agent: AgentEntry) -> Result<AgentEntry>;

    async fn get_agent_by_id(&self, agent_id: &AgentId) -> Result<Option<AgentEntry>>;

    async fn get_agent_by_type(&self, agent_type: &str) -> Result<Option<AgentEntry>>;

    async fn update_agent(&self, agent_id: &AgentId, agent: AgentEntry) -> Result<AgentEntry>;

    async fn delete_agent(&self, agent_id: &AgentId) -> Result<bool>;

    async fn search_agents(&self, query: &str, limit: u32) -> Result<Vec<(AgentEntry, f32)>>;

    async fn similarity_search(
        &self,
        embedding: Vec<f32>,
        limit: u32,
        threshold: Option<f32>,
    ) -> Result<Vec<(AgentEntry, f32)>>;

    async fn bulk_insert(&self, agents: Vec<AgentEntry>) -> Result<u64>;

    async fn record_usage(&self, agent_id: &AgentId, response_time_ms: f64, success: bool) -> Result<()>;

    async fn health_check(&self) -> Result<HealthReport>;
}
