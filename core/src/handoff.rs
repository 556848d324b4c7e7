//! Handoff message: the schema-validated unit of context transfer between
//! executors. Pure data plus validation — no I/O, no side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::ids::AgentId;

const MAX_AGENT_TYPE_LEN: usize = 100;
const MAX_ID_LEN: usize = 256;
const MAX_TASK_DESCRIPTION_LEN: usize = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentRef {
    pub agent_id: AgentId,
    pub agent_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandoffContext {
    pub task_description: String,
    pub current_state: Value,
    #[serde(default)]
    pub shared_variables: Value,
    pub trace_id: String,
    pub correlation_id: String,
    pub parent_context_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandoffProgress {
    pub percent_complete: f32,
    pub tasks_completed: u32,
    pub tasks_remaining: u32,
    pub current_phase: String,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl Default for HandoffProgress {
    fn default() -> Self {
        Self {
            percent_complete: 0.0,
            tasks_completed: 0,
            tasks_remaining: 0,
            current_phase: "handoff".to_string(),
            estimated_completion: None,
        }
    }
}

/// A schema-validated message describing a transfer of control/context
/// between two executors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandoffMessage {
    pub message_id: Uuid,
    pub schema_version: String,
    pub created_at: DateTime<Utc>,
    pub source: AgentRef,
    pub target: AgentRef,
    pub context: HandoffContext,
    #[serde(default)]
    pub progress: HandoffProgress,
    pub validated: bool,
    #[serde(default)]
    pub metadata: Value,
}

pub const HANDOFF_SCHEMA_VERSION: &str = "1.0";

/// Create a validated handoff message.
pub fn create(
    source: AgentRef,
    target: AgentRef,
    task_description: impl Into<String>,
    current_state: Option<Value>,
    shared_variables: Option<Value>,
    trace_id: Option<String>,
    parent_context_id: Option<String>,
) -> Result<HandoffMessage> {
    let message = HandoffMessage {
        message_id: Uuid::new_v4(),
        schema_version: HANDOFF_SCHEMA_VERSION.to_string(),
        created_at: Utc::now(),
        source,
        target,
        context: HandoffContext {
            task_description: task_description.into(),
            current_state: current_state.unwrap_or_else(|| Value::Object(Default::default())),
            shared_variables: shared_variables.unwrap_or_else(|| Value::Object(Default::default())),
            trace_id: trace_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            correlation_id: Uuid::new_v4().to_string(),
            parent_context_id,
        },
        progress: HandoffProgress::default(),
        validated: false,
        metadata: Value::Object(Default::default()),
    };
    validate(&message)?;
    let mut message = message;
    message.validated = true;
    Ok(message)
}

/// Validate every field against the handoff message's length and shape constraints.
pub fn validate(message: &HandoffMessage) -> Result<()> {
    if message.source.agent_type.len() > MAX_AGENT_TYPE_LEN {
        return Err(CoreError::validation("source.agent_type exceeds maximum length"));
    }
    if message.target.agent_type.len() > MAX_AGENT_TYPE_LEN {
        return Err(CoreError::validation("target.agent_type exceeds maximum length"));
    }
    if message.source.agent_id.as_str().len() > MAX_ID_LEN || message.source.agent_id.as_str().is_empty() {
        return Err(CoreError::validation("source.agent_id has invalid length"));
    }
    if message.target.agent_id.as_str().len() > MAX_ID_LEN || message.target.agent_id.as_str().is_empty() {
        return Err(CoreError::validation("target.agent_id has invalid length"));
    }
    if message.context.task_description.len() > MAX_TASK_DESCRIPTION_LEN {
        return Err(CoreError::validation("context.task_description exceeds maximum length"));
    }
    if message.context.task_description.trim().is_empty() {
        return Err(CoreError::validation("context.task_description cannot be empty"));
    }
    if message.context.trace_id.trim().is_empty() {
        return Err(CoreError::validation("context.trace_id cannot be empty"));
    }
    if !(0.0..=100.0).contains(&message.progress.percent_complete) {
        return Err(CoreError::validation("progress.percent_complete must be within [0, 100]"));
    }
    if message.schema_version != HANDOFF_SCHEMA_VERSION {
        return Err(CoreError::validation(format!(
            "unsupported schema_version '{}'",
            message.schema_version
        )));
    }
    Ok(())
}

/// Serialize to the canonical JSON wire format.
pub fn serialize(message: &HandoffMessage) -> Result<String> {
    serde_json::to_string(message).map_err(|e| CoreError::validation(format!("serialization failed: {e}")))
}

/// Deserialize and re-validate.
pub fn deserialize(json: &str) -> Result<HandoffMessage> {
    let message: HandoffMessage =
        serde_json::from_str(json).map_err(|e| CoreError::validation(format!("deserialization failed: {e}")))?;
    validate(&message)?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, kind: &str) -> AgentRef {
        AgentRef { agent_id: AgentId::new(id), agent_type: kind.to_string() }
    }

    #[test]
    fn create_produces_a_validated_message() {
        let message = create(
            agent("agent-a", "planner"),
            agent("agent-b", "executor"),
            "summarize the PRD",
            None,
            None,
            None,
            None,
        )
        .unwrap();
        assert!(message.validated);
    }

    #[test]
    fn empty_task_description_is_rejected() {
        let err = create(agent("a", "x"), agent("b", "y"), "", None, None, None, None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn round_trip_is_idempotent() {
        let message = create(agent("a", "x"), agent("b", "y"), "do the thing", None, None, None, None).unwrap();
        let json = serialize(&message).unwrap();
        let restored = deserialize(&json).unwrap();
        assert_eq!(message.message_id, restored.message_id);
        assert_eq!(message.context.task_description, restored.context.task_description);
    }

    #[test]
    fn unknown_field_is_rejected_at_deserialize() {
        let json = r#"{"message_id":"00000000-0000-0000-0000-000000000000","schema_version":"1.0","created_at":"2026-01-01T00:00:00Z","source":{"agent_id":"a","agent_type":"x"},"target":{"agent_id":"b","agent_type":"y"},"context":{"task_description":"d","current_state":{},"shared_variables":{},"trace_id":"t","correlation_id":"c","parent_context_id":null},"progress":{"percent_complete":0.0,"tasks_completed":0,"tasks_remaining":0,"current_phase":"handoff","estimated_completion":null},"validated":true,"metadata":{},"bogus_field":1}"#;
        assert!(deserialize(json).is_err());
    }
}
