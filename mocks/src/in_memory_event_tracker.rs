//! Non-durable `EventTracker` fallback for environments without a database.
//! Loses all events on process restart; `is_durable()` reports `false`
//! accordingly.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;
use workflow_core::error::Result;
use workflow_core::events::{Event, EventStatistics, EventType, Timeline, TimelinePhase};
use workflow_core::ids::{AgentId, TaskId, WorkflowId};
use workflow_core::store::EventTracker;

/// `snake_case` key matching the serde wire representation used by the
/// durable tracker, so `event_type_counts` reads the same across backends.
fn event_type_key(event_type: EventType) -> String {
    serde_json::to_value(event_type).unwrap().as_str().unwrap().to_string()
}

#[derive(Default)]
pub struct InMemoryEventTracker {
    events: Mutex<HashMap<WorkflowId, Vec<Event>>>,
}

impl InMemoryEventTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventTracker for InMemoryEventTracker {
    async fn track_event(&self, event: Event) -> Result<Uuid> {
        let id = event.event_id;
        self.events.lock().entry(event.workflow_id.clone()).or_default().push(event);
        Ok(id)
    }

    async fn get_workflow_events(
        &self,
        workflow_id: &WorkflowId,
        event_type: Option<EventType>,
        limit: Option<u32>,
    ) -> Result<Vec<Event>> {
        let events = self.events.lock();
        let mut matched: Vec<Event> = events
            .get(workflow_id)
            .map(|v| v.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|e| event_type.map(|t| t == e.event_type).unwrap_or(true))
            .collect();
        matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if let Some(limit) = limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn get_task_events(&self, task_id: &TaskId, limit: Option<u32>) -> Result<Vec<Event>> {
        let events = self.events.lock();
        let mut matched: Vec<Event> = events
            .values()
            .flatten()
            .filter(|e| e.task_id.as_ref() == Some(task_id))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if let Some(limit) = limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn get_agent_events(
        &self,
        agent_id: &AgentId,
        event_type: Option<EventType>,
        limit: Option<u32>,
    ) -> Result<Vec<Event>> {
        let events = self.events.lock();
        let mut matched: Vec<Event> = events
            .values()
            .flatten()
            .filter(|e| e.agent_id.as_ref() == Some(agent_id))
            .filter(|e| event_type.map(|t| t == e.event_type).unwrap_or(true))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if let Some(limit) = limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn get_handoff_chain(&self, workflow_id: &WorkflowId) -> Result<Vec<Event>> {
        self.get_workflow_events(workflow_id, Some(EventType::Handoff), None).await
    }

    async fn get_workflow_timeline(&self, workflow_id: &WorkflowId) -> Result<Timeline> {
        let events = self.get_workflow_events(workflow_id, None, None).await?;
        let mut event_type_counts = std::collections::HashMap::new();
        for event in &events {
            *event_type_counts.entry(event_type_key(event.event_type)).or_insert(0u64) += 1;
        }
        let duration_ms = match (events.first(), events.last()) {
            (Some(f), Some(l)) => Some((l.timestamp - f.timestamp).num_milliseconds().max(0) as u64),
            _ => None,
        };
        Ok(Timeline {
            events,
            phases: vec![TimelinePhase { name: "all".to_string(), event_types: vec![] }],
            duration_ms,
            event_type_counts,
        })
    }

    async fn get_statistics(&self, workflow_id: Option<&WorkflowId>) -> Result<EventStatistics> {
        let events = match workflow_id {
            Some(id) => self.get_workflow_events(id, None, None).await?,
            None => {
                let all = self.events.lock();
                let mut v: Vec<Event> = all.values().flatten().cloned().collect();
                v.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                v
            }
        };
        let total_events = events.len() as u64;
        let failures = events
            .iter()
            .filter(|e| matches!(e.event_type, EventType::Failure | EventType::TaskFailed | EventType::WorkflowFailed))
            .count() as u64;
        let mut event_type_counts = std::collections::HashMap::new();
        for event in &events {
            *event_type_counts.entry(event_type_key(event.event_type)).or_insert(0u64) += 1;
        }
        let durations: Vec<f64> = events.iter().filter_map(|e| e.duration_ms).map(|d| d as f64).collect();
        Ok(EventStatistics {
            total_events,
            event_type_counts,
            failure_rate: if total_events == 0 { 0.0 } else { failures as f64 / total_events as f64 },
            avg_duration_ms: if durations.is_empty() { None } else { Some(durations.iter().sum::<f64>() / durations.len() as f64) },
            first_event: events.first().map(|e| e.timestamp),
            last_event: events.last().map(|e| e.timestamp),
        })
    }

    async fn delete_workflow_events(&self, workflow_id: &WorkflowId) -> Result<u64> {
        Ok(self.events.lock().remove(workflow_id).map(|v| v.len() as u64).unwrap_or(0))
    }

    fn is_durable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn tracks_and_orders_events() {
        let tracker = InMemoryEventTracker::new();
        let workflow_id = WorkflowId::new("w1");
        tracker.track_event(Event::new(EventType::WorkflowCreated, workflow_id.clone(), Utc::now())).await.unwrap();
        let events = tracker.get_workflow_events(&workflow_id, None, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(!tracker.is_durable());
    }
}
