//! Coordination event schema: the closed set of event types the orchestrator
//! emits, and the record shape persisted by the event tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ids::{AgentId, TaskId, WorkflowId};

/// Closed event type enum. Unknown values are rejected at deserialization
/// time by serde rather than silently accepted through a catch-all arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Handoff,
    ExecutionStart,
    ExecutionEnd,
    Failure,
    Retry,
    WorkflowCreated,
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    WorkflowPaused,
    WorkflowResumed,
    TaskCreated,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskSkipped,
    TaskRetrying,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventError {
    pub message: String,
    pub error_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPerformance {
    pub queue_time_ms: Option<u64>,
    pub execution_time_ms: Option<u64>,
    pub total_time_ms: Option<u64>,
}

/// An immutable coordination event. Never mutated after being tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub workflow_id: WorkflowId,
    pub task_id: Option<TaskId>,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<AgentId>,
    pub source_agent: Option<AgentId>,
    pub target_agent: Option<AgentId>,
    pub status: Option<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<EventError>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub workflow_context: Value,
    #[serde(default)]
    pub performance: EventPerformance,
}

impl Event {
    /// Start building an event for the given type/workflow; all optional
    /// fields default to empty/None and can be set with the builder methods.
    pub fn new(event_type: EventType, workflow_id: WorkflowId, now: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            workflow_id,
            task_id: None,
            timestamp: now,
            agent_id: None,
            source_agent: None,
            target_agent: None,
            status: None,
            duration_ms: None,
            error: None,
            metadata: Value::Object(Default::default()),
            workflow_context: Value::Object(Default::default()),
            performance: EventPerformance::default(),
        }
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.error = Some(EventError { message: message.into(), error_type: error_type.into() });
        self
    }
}

/// Grouped view of a workflow's event history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub events: Vec<Event>,
    pub phases: Vec<TimelinePhase>,
    pub duration_ms: Option<u64>,
    pub event_type_counts: std::collections::HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePhase {
    pub name: String,
    pub event_types: Vec<EventType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStatistics {
    pub total_events: u64,
    pub event_type_counts: std::collections::HashMap<String, u64>,
    pub failure_rate: f64,
    pub avg_duration_ms: Option<f64>,
    pub first_event: Option<DateTime<Utc>>,
    pub last_event: Option<DateTime<Utc>>,
}
