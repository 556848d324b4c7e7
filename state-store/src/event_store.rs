//! Durable `EventTracker`: append-only inserts into `coordination_events`,
//! indexed by workflow/task/agent + timestamp. Writes here are never
//! allowed to fail a caller's workflow operation — see `track_event_best_effort`
//! in the orchestrator crate, which wraps this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use workflow_core::error::{CoreError, Result};
use workflow_core::events::{Event, EventError, EventPerformance, EventStatistics, EventType, Timeline, TimelinePhase};
use workflow_core::ids::{AgentId, TaskId, WorkflowId};
use workflow_core::store::EventTracker;

pub struct SqliteEventTracker {
    pool: SqlitePool,
}

impl SqliteEventTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn to_error(e: sqlx::Error) -> CoreError {
        CoreError::Tracker(e.to_string())
    }
}

fn event_type_str(event_type: EventType) -> String {
    serde_json::to_value(event_type).unwrap().as_str().unwrap().to_string()
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<Event> {
    let event_id_str: String = row.try_get("event_id").map_err(SqliteEventTracker::to_error)?;
    let event_type_str_val: String = row.try_get("event_type").map_err(SqliteEventTracker::to_error)?;
    let workflow_id: String = row.try_get("workflow_id").map_err(SqliteEventTracker::to_error)?;
    let task_id: Option<String> = row.try_get("task_id").map_err(SqliteEventTracker::to_error)?;
    let timestamp: DateTime<Utc> = row.try_get("timestamp").map_err(SqliteEventTracker::to_error)?;
    let agent_id: Option<String> = row.try_get("agent_id").map_err(SqliteEventTracker::to_error)?;
    let source_agent: Option<String> = row.try_get("source_agent").map_err(SqliteEventTracker::to_error)?;
    let target_agent: Option<String> = row.try_get("target_agent").map_err(SqliteEventTracker::to_error)?;
    let status: Option<String> = row.try_get("status").map_err(SqliteEventTracker::to_error)?;
    let duration_ms: Option<i64> = row.try_get("duration_ms").map_err(SqliteEventTracker::to_error)?;
    let error_json: Option<String> = row.try_get("error_json").map_err(SqliteEventTracker::to_error)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(SqliteEventTracker::to_error)?;
    let workflow_context: String = row.try_get("workflow_context").map_err(SqliteEventTracker::to_error)?;
    let performance_json: String = row.try_get("performance_json").map_err(SqliteEventTracker::to_error)?;

    Ok(Event {
        event_id: Uuid::parse_str(&event_id_str).map_err(|e| CoreError::Tracker(e.to_string()))?,
        event_type: serde_json::from_value(serde_json::Value::String(event_type_str_val))
            .map_err(|e| CoreError::Tracker(format!("bad event_type column: {e}")))?,
        workflow_id: WorkflowId::new(workflow_id),
        task_id: task_id.map(TaskId::new),
        timestamp,
        agent_id: agent_id.map(AgentId::new),
        source_agent: source_agent.map(AgentId::new),
        target_agent: target_agent.map(AgentId::new),
        status,
        duration_ms: duration_ms.map(|v| v as u64),
        error: error_json.and_then(|s| serde_json::from_str::<EventError>(&s).ok()),
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        workflow_context: serde_json::from_str(&workflow_context).unwrap_or_default(),
        performance: serde_json::from_str(&performance_json).unwrap_or_default(),
    })
}

#[async_trait]
impl EventTracker for SqliteEventTracker {
    async fn track_event(&self, event: Event) -> Result<Uuid> {
        let error_json = event.error.as_ref().map(|e| serde_json::to_string(e).unwrap());
        let metadata_json = serde_json::to_string(&event.metadata).unwrap_or_default();
        let workflow_context = serde_json::to_string(&event.workflow_context).unwrap_or_default();
        let performance_json = serde_json::to_string(&event.performance).unwrap_or_default();

        sqlx::query(
            "INSERT INTO coordination_events \
             (event_id, event_type, workflow_id, task_id, timestamp, agent_id, source_agent, target_agent, \
              status, duration_ms, error_json, metadata_json, workflow_context, performance_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.event_id.to_string())
        .bind(event_type_str(event.event_type))
        .bind(event.workflow_id.as_str())
        .bind(event.task_id.as_ref().map(|t| t.as_str()))
        .bind(event.timestamp)
        .bind(event.agent_id.as_ref().map(|a| a.as_str()))
        .bind(event.source_agent.as_ref().map(|a| a.as_str()))
        .bind(event.target_agent.as_ref().map(|a| a.as_str()))
        .bind(&event.status)
        .bind(event.duration_ms.map(|v| v as i64))
        .bind(error_json)
        .bind(metadata_json)
        .bind(workflow_context)
        .bind(performance_json)
        .execute(&self.pool)
        .await
        .map_err(Self::to_error)?;

        Ok(event.event_id)
    }

    async fn get_workflow_events(
        &self,
        workflow_id: &WorkflowId,
        event_type: Option<EventType>,
        limit: Option<u32>,
    ) -> Result<Vec<Event>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM coordination_events WHERE workflow_id = ");
        qb.push_bind(workflow_id.as_str());
        if let Some(event_type) = event_type {
            qb.push(" AND event_type = ").push_bind(event_type_str(event_type));
        }
        qb.push(" ORDER BY timestamp ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        let rows = qb.build().fetch_all(&self.pool).await.map_err(Self::to_error)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn get_task_events(&self, task_id: &TaskId, limit: Option<u32>) -> Result<Vec<Event>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM coordination_events WHERE task_id = ");
        qb.push_bind(task_id.as_str());
        qb.push(" ORDER BY timestamp ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        let rows = qb.build().fetch_all(&self.pool).await.map_err(Self::to_error)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn get_agent_events(
        &self,
        agent_id: &AgentId,
        event_type: Option<EventType>,
        limit: Option<u32>,
    ) -> Result<Vec<Event>> {
        let mut qb = sqlx::QueryBuilder::new("SELECT * FROM coordination_events WHERE agent_id = ");
        qb.push_bind(agent_id.as_str());
        if let Some(event_type) = event_type {
            qb.push(" AND event_type = ").push_bind(event_type_str(event_type));
        }
        qb.push(" ORDER BY timestamp ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        let rows = qb.build().fetch_all(&self.pool).await.map_err(Self::to_error)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn get_handoff_chain(&self, workflow_id: &WorkflowId) -> Result<Vec<Event>> {
        self.get_workflow_events(workflow_id, Some(EventType::Handoff), None).await
    }

    async fn get_workflow_timeline(&self, workflow_id: &WorkflowId) -> Result<Timeline> {
        let events = self.get_workflow_events(workflow_id, None, None).await?;
        let mut event_type_counts = std::collections::HashMap::new();
        for event in &events {
            *event_type_counts.entry(event_type_str(event.event_type)).or_insert(0u64) += 1;
        }

        let duration_ms = match (events.first(), events.last()) {
            (Some(first), Some(last)) => {
                Some((last.timestamp - first.timestamp).num_milliseconds().max(0) as u64)
            }
            _ => None,
        };

        let phases = vec![
            TimelinePhase {
                name: "creation".to_string(),
                event_types: vec![EventType::WorkflowCreated, EventType::TaskCreated],
            },
            TimelinePhase {
                name: "execution".to_string(),
                event_types: vec![
                    EventType::WorkflowStarted,
                    EventType::TaskStarted,
                    EventType::ExecutionStart,
                    EventType::ExecutionEnd,
                    EventType::Retry,
                    EventType::TaskRetrying,
                    EventType::Failure,
                    EventType::Handoff,
                ],
            },
            TimelinePhase {
                name: "completion".to_string(),
                event_types: vec![
                    EventType::TaskCompleted,
                    EventType::TaskFailed,
                    EventType::TaskSkipped,
                    EventType::WorkflowCompleted,
                    EventType::WorkflowFailed,
                    EventType::WorkflowCancelled,
                    EventType::WorkflowPaused,
                    EventType::WorkflowResumed,
                ],
            },
        ];

        Ok(Timeline { events, phases, duration_ms, event_type_counts })
    }

    async fn get_statistics(&self, workflow_id: Option<&WorkflowId>) -> Result<EventStatistics> {
        let events = match workflow_id {
            Some(id) => self.get_workflow_events(id, None, None).await?,
            None => {
                let rows = sqlx::query("SELECT * FROM coordination_events ORDER BY timestamp ASC")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(Self::to_error)?;
                rows.iter().map(row_to_event).collect::<Result<Vec<_>>>()?
            }
        };

        let total_events = events.len() as u64;
        let mut event_type_counts = std::collections::HashMap::new();
        let mut failures = 0u64;
        let mut durations = Vec::new();
        for event in &events {
            *event_type_counts.entry(event_type_str(event.event_type)).or_insert(0u64) += 1;
            if matches!(event.event_type, EventType::Failure | EventType::TaskFailed | EventType::WorkflowFailed) {
                failures += 1;
            }
            if let Some(d) = event.duration_ms {
                durations.push(d as f64);
            }
        }

        let failure_rate = if total_events == 0 { 0.0 } else { failures as f64 / total_events as f64 };
        let avg_duration_ms = if durations.is_empty() { None } else { Some(durations.iter().sum::<f64>() / durations.len() as f64) };

        Ok(EventStatistics {
            total_events,
            event_type_counts,
            failure_rate,
            avg_duration_ms,
            first_event: events.first().map(|e| e.timestamp),
            last_event: events.last().map(|e| e.timestamp),
        })
    }

    async fn delete_workflow_events(&self, workflow_id: &WorkflowId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM coordination_events WHERE workflow_id = ?")
            .bind(workflow_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(Self::to_error)?;
        Ok(result.rows_affected())
    }

    fn is_durable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect;

    async fn tracker() -> SqliteEventTracker {
        SqliteEventTracker::new(connect(":memory:").await.unwrap())
    }

    #[tokio::test]
    async fn track_and_query_events() {
        let tracker = tracker().await;
        let workflow_id = WorkflowId::new("w1");
        let event = Event::new(EventType::WorkflowCreated, workflow_id.clone(), Utc::now());
        tracker.track_event(event).await.unwrap();

        let events = tracker.get_workflow_events(&workflow_id, None, None).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::WorkflowCreated);
    }

    #[tokio::test]
    async fn timeline_orders_events_and_counts_types() {
        let tracker = tracker().await;
        let workflow_id = WorkflowId::new("w1");
        tracker.track_event(Event::new(EventType::WorkflowCreated, workflow_id.clone(), Utc::now())).await.unwrap();
        tracker.track_event(Event::new(EventType::WorkflowStarted, workflow_id.clone(), Utc::now())).await.unwrap();

        let timeline = tracker.get_workflow_timeline(&workflow_id).await.unwrap();
        assert_eq!(timeline.events.len(), 2);
        assert_eq!(*timeline.event_type_counts.get("workflow_created").unwrap(), 1);
    }
}
