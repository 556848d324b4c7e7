//! Durable `WorkflowStore`: each workflow (plus its tasks) is one row,
//! serialized as JSON, guarded by a `version` column and append-only
//! history snapshots. Mutations run inside `BEGIN IMMEDIATE` transactions
//! so concurrent writers to the same workflow serialize at the row.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use workflow_core::error::{CoreError, Result};
use workflow_core::ids::WorkflowId;
use workflow_core::models::{HistorySnapshot, TaskDef, TaskRuntimeState, WorkflowState};
use workflow_core::store::{WorkflowFilter, WorkflowStore};

pub struct SqliteWorkflowStore {
    pool: SqlitePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn to_error(e: sqlx::Error) -> CoreError {
        CoreError::Database(e.to_string())
    }

    async fn load(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowState>> {
        let row = sqlx::query(
            "SELECT status, context, metadata, tasks, created_at, started_at, completed_at, version \
             FROM workflow_states WHERE workflow_id = ?",
        )
        .bind(workflow_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::to_error)?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_workflow_state(workflow_id.clone(), &row)?))
    }
}

fn row_to_workflow_state(workflow_id: WorkflowId, row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowState> {
    let status_str: String = row.try_get("status").map_err(SqliteWorkflowStore::to_error)?;
    let status = serde_json::from_value(serde_json::Value::String(status_str))
        .map_err(|e| CoreError::Database(format!("bad status column: {e}")))?;
    let context: String = row.try_get("context").map_err(SqliteWorkflowStore::to_error)?;
    let metadata: String = row.try_get("metadata").map_err(SqliteWorkflowStore::to_error)?;
    let tasks_json: String = row.try_get("tasks").map_err(SqliteWorkflowStore::to_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(SqliteWorkflowStore::to_error)?;
    let started_at: Option<DateTime<Utc>> = row.try_get("started_at").map_err(SqliteWorkflowStore::to_error)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(SqliteWorkflowStore::to_error)?;
    let version: i64 = row.try_get("version").map_err(SqliteWorkflowStore::to_error)?;

    let tasks: HashMap<workflow_core::ids::TaskId, TaskRuntimeState> = serde_json::from_str(&tasks_json)
        .map_err(|e| CoreError::Database(format!("corrupt tasks column: {e}")))?;

    Ok(WorkflowState {
        workflow_id,
        status,
        context: serde_json::from_str(&context).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        created_at,
        started_at,
        completed_at,
        version,
        tasks,
    })
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn create_workflow(
        &self,
        workflow_id: WorkflowId,
        tasks: Vec<TaskDef>,
        context: serde_json::Value,
        metadata: serde_json::Value,
    ) -> Result<WorkflowState> {
        let now = Utc::now();
        let mut state = WorkflowState::new(workflow_id.clone(), context, metadata, now);
        for def in tasks {
            let task = TaskRuntimeState::from_def(workflow_id.clone(), def, now);
            state.tasks.insert(task.task_id.clone(), task);
        }

        let tasks_json = serde_json::to_string(&state.tasks).map_err(|e| CoreError::Database(e.to_string()))?;
        let context_json = serde_json::to_string(&state.context).map_err(|e| CoreError::Database(e.to_string()))?;
        let metadata_json = serde_json::to_string(&state.metadata).map_err(|e| CoreError::Database(e.to_string()))?;
        let status_json = serde_json::to_value(state.status).unwrap();
        let status_str = status_json.as_str().unwrap().to_string();

        let result = sqlx::query(
            "INSERT INTO workflow_states (workflow_id, status, context, metadata, tasks, created_at, version) \
             VALUES (?, ?, ?, ?, ?, ?, 1)",
        )
        .bind(workflow_id.as_str())
        .bind(&status_str)
        .bind(&context_json)
        .bind(&metadata_json)
        .bind(&tasks_json)
        .bind(state.created_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            if e.to_string().contains("UNIQUE") {
                return Err(CoreError::State(format!("workflow {workflow_id} already exists")));
            }
            return Err(Self::to_error(e));
        }

        sqlx::query(
            "INSERT INTO workflow_state_history (workflow_id, version, snapshot, changed_at, reason) \
             VALUES (?, 1, ?, ?, 'workflow_created')",
        )
        .bind(workflow_id.as_str())
        .bind(serde_json::to_string(&state).map_err(|e| CoreError::Database(e.to_string()))?)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Self::to_error)?;

        Ok(state)
    }

    async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowState>> {
        self.load(workflow_id).await
    }

    async fn list_workflows(&self, filter: WorkflowFilter) -> Result<Vec<WorkflowState>> {
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT workflow_id, status, context, metadata, tasks, created_at, started_at, completed_at, version \
             FROM workflow_states WHERE 1=1",
        );
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(after) = filter.created_after {
            qb.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            qb.push(" AND created_at <= ").push_bind(before);
        }
        qb.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset as i64);
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(Self::to_error)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("workflow_id").map_err(Self::to_error)?;
            out.push(row_to_workflow_state(WorkflowId::new(id), &row)?);
        }
        Ok(out)
    }

    async fn update_workflow(
        &self,
        workflow_id: &WorkflowId,
        expected_version: Option<i64>,
        mutate: Box<dyn FnOnce(&mut WorkflowState) + Send>,
        reason: &str,
    ) -> Result<i64> {
        // `pool.begin()` issues a plain `BEGIN`, which under SQLite's deferred
        // transaction mode only takes a SHARED lock until the first write —
        // leaving a window between this `SELECT` and the `UPDATE` below where
        // a second writer for the same workflow_id can read the same
        // pre-mutation row and clobber this commit. `BEGIN IMMEDIATE` takes
        // the RESERVED write lock up front, serializing concurrent
        // `update_workflow` calls on one workflow the way row-level locking
        // would.
        let mut conn = self.pool.acquire().await.map_err(Self::to_error)?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await.map_err(Self::to_error)?;

        let outcome: Result<i64> = async {
            let row = sqlx::query(
                "SELECT status, context, metadata, tasks, created_at, started_at, completed_at, version \
                 FROM workflow_states WHERE workflow_id = ?",
            )
            .bind(workflow_id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(Self::to_error)?;

            let Some(row) = row else {
                return Err(CoreError::workflow_not_found(workflow_id));
            };

            let mut state = row_to_workflow_state(workflow_id.clone(), &row)?;

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

            let pre_mutation_snapshot =
                serde_json::to_string(&state).map_err(|e| CoreError::Database(e.to_string()))?;

            mutate(&mut state);
            state.version += 1;

            let tasks_json = serde_json::to_string(&state.tasks).map_err(|e| CoreError::Database(e.to_string()))?;
            let context_json = serde_json::to_string(&state.context).map_err(|e| CoreError::Database(e.to_string()))?;
            let metadata_json = serde_json::to_string(&state.metadata).map_err(|e| CoreError::Database(e.to_string()))?;

            sqlx::query(
                "UPDATE workflow_states SET status = ?, context = ?, metadata = ?, tasks = ?, \
                 started_at = ?, completed_at = ?, version = ? WHERE workflow_id = ?",
            )
            .bind(state.status.to_string())
            .bind(&context_json)
            .bind(&metadata_json)
            .bind(&tasks_json)
            .bind(state.started_at)
            .bind(state.completed_at)
            .bind(state.version)
            .bind(workflow_id.as_str())
            .execute(&mut *conn)
            .await
            .map_err(Self::to_error)?;

            sqlx::query(
                "INSERT INTO workflow_state_history (workflow_id, version, snapshot, changed_at, reason) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(workflow_id.as_str())
            .bind(state.version - 1)
            .bind(pre_mutation_snapshot)
            .bind(Utc::now())
            .bind(reason)
            .execute(&mut *conn)
            .await
            .map_err(Self::to_error)?;

            Ok(state.version)
        }
        .await;

        match outcome {
            Ok(version) => {
                sqlx::query("COMMIT").execute(&mut *conn).await.map_err(Self::to_error)?;
                Ok(version)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn get_workflow_history(&self, workflow_id: &WorkflowId) -> Result<Vec<HistorySnapshot>> {
        let rows = sqlx::query(
            "SELECT version, snapshot, changed_at, reason FROM workflow_state_history \
             WHERE workflow_id = ? ORDER BY version ASC",
        )
        .bind(workflow_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Self::to_error)?;

        rows.into_iter()
            .map(|row| {
                let version: i64 = row.try_get("version").map_err(Self::to_error)?;
                let snapshot: String = row.try_get("snapshot").map_err(Self::to_error)?;
                let changed_at: DateTime<Utc> = row.try_get("changed_at").map_err(Self::to_error)?;
                let reason: String = row.try_get("reason").map_err(Self::to_error)?;
                Ok(HistorySnapshot {
                    version,
                    snapshot: serde_json::from_str(&snapshot).unwrap_or(serde_json::Value::Null),
                    changed_at,
                    reason,
                })
            })
            .collect()
    }

    async fn rollback_workflow(&self, workflow_id: &WorkflowId, target_version: i64) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(Self::to_error)?;

        let current_row = sqlx::query("SELECT version FROM workflow_states WHERE workflow_id = ?")
            .bind(workflow_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(Self::to_error)?
            .ok_or_else(|| CoreError::workflow_not_found(workflow_id))?;
        let current_version: i64 = current_row.try_get("version").map_err(Self::to_error)?;

        let snapshot_row = sqlx::query(
            "SELECT snapshot FROM workflow_state_history WHERE workflow_id = ? AND version = ?",
        )
        .bind(workflow_id.as_str())
        .bind(target_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Self::to_error)?
        .ok_or_else(|| CoreError::state(format!("no snapshot at version {target_version} for workflow {workflow_id}")))?;

        let snapshot: String = snapshot_row.try_get("snapshot").map_err(Self::to_error)?;
        let mut restored: WorkflowState =
            serde_json::from_str(&snapshot).map_err(|e| CoreError::Database(format!("corrupt snapshot: {e}")))?;
        let new_version = current_version + 1;
        restored.version = new_version;

        let tasks_json = serde_json::to_string(&restored.tasks).map_err(|e| CoreError::Database(e.to_string()))?;
        let context_json = serde_json::to_string(&restored.context).map_err(|e| CoreError::Database(e.to_string()))?;
        let metadata_json = serde_json::to_string(&restored.metadata).map_err(|e| CoreError::Database(e.to_string()))?;

        sqlx::query(
            "UPDATE workflow_states SET status = ?, context = ?, metadata = ?, tasks = ?, \
             started_at = ?, completed_at = ?, version = ? WHERE workflow_id = ?",
        )
        .bind(restored.status.to_string())
        .bind(&context_json)
        .bind(&metadata_json)
        .bind(&tasks_json)
        .bind(restored.started_at)
        .bind(restored.completed_at)
        .bind(new_version)
        .bind(workflow_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(Self::to_error)?;

        sqlx::query(
            "INSERT INTO workflow_state_history (workflow_id, version, snapshot, changed_at, reason) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(workflow_id.as_str())
        .bind(current_version)
        .bind(&snapshot)
        .bind(Utc::now())
        .bind(format!("rollback_to_v{target_version}"))
        .execute(&mut *tx)
        .await
        .map_err(Self::to_error)?;

        tx.commit().await.map_err(Self::to_error)?;
        Ok(new_version)
    }

    async fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workflow_states WHERE workflow_id = ?")
            .bind(workflow_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(Self::to_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.map_err(Self::to_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect;
    use workflow_core::models::RetryPolicy;

    async fn store() -> SqliteWorkflowStore {
        let pool = connect(":memory:").await.unwrap();
        SqliteWorkflowStore::new(pool)
    }

    fn task_def(id: &str) -> TaskDef {
        TaskDef {
            task_id: workflow_core::ids::TaskId::new(id),
            agent_type: "noop".into(),
            dependencies: vec![],
            retry_policy: RetryPolicy::default(),
            timeout_seconds: None,
            allow_failure: false,
            input_data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = store().await;
        let workflow_id = WorkflowId::new("w1");
        let created = store
            .create_workflow(workflow_id.clone(), vec![task_def("a")], serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let fetched = store.get_workflow(&workflow_id).await.unwrap().unwrap();
        assert_eq!(fetched.tasks.len(), 1);
    }

    #[tokio::test]
    async fn version_conflict_is_detected() {
        let store = store().await;
        let workflow_id = WorkflowId::new("w1");
        store
            .create_workflow(workflow_id.clone(), vec![], serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();

        let err = store
            .update_workflow(&workflow_id, Some(99), Box::new(|_| {}), "noop")
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());
    }

    #[tokio::test]
    async fn rollback_restores_prior_snapshot() {
        let store = store().await;
        let workflow_id = WorkflowId::new("w1");
        store
            .create_workflow(workflow_id.clone(), vec![], serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();

        store
            .update_workflow(
                &workflow_id,
                None,
                Box::new(|s| s.status = workflow_core::models::WorkflowStatus::Running),
                "started",
            )
            .await
            .unwrap();

        let new_version = store.rollback_workflow(&workflow_id, 1).await.unwrap();
        assert_eq!(new_version, 3);
        let restored = store.get_workflow(&workflow_id).await.unwrap().unwrap();
        assert_eq!(restored.status, workflow_core::models::WorkflowStatus::Pending);
    }

    /// `:memory:` pools are capped at one connection (see `pool::connect`),
    /// which would serialize concurrent callers regardless of transaction
    /// mode and hide a `BEGIN`-vs-`BEGIN IMMEDIATE` race. This test instead
    /// uses a file-backed database, where the pool hands out multiple
    /// connections and two `update_workflow` calls for the same workflow can
    /// genuinely interleave.
    #[tokio::test]
    async fn concurrent_updates_to_the_same_workflow_do_not_lose_either_write() {
        let db_path = std::env::temp_dir().join(format!("workflow-store-concurrency-{}.db", uuid::Uuid::new_v4()));
        let pool = connect(&format!("sqlite://{}", db_path.display())).await.unwrap();
        let store = std::sync::Arc::new(SqliteWorkflowStore::new(pool));

        let workflow_id = WorkflowId::new("concurrent");
        store
            .create_workflow(
                workflow_id.clone(),
                vec![task_def("a"), task_def("b")],
                serde_json::json!({}),
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let store_a = store.clone();
        let workflow_id_a = workflow_id.clone();
        let store_b = store.clone();
        let workflow_id_b = workflow_id.clone();

        let (result_a, result_b) = tokio::join!(
            store_a.update_workflow(
                &workflow_id_a,
                None,
                Box::new(|s| {
                    s.tasks.get_mut(&workflow_core::ids::TaskId::new("a")).unwrap().status =
                        workflow_core::models::TaskStatus::Completed;
                }),
                "a_completed",
            ),
            store_b.update_workflow(
                &workflow_id_b,
                None,
                Box::new(|s| {
                    s.tasks.get_mut(&workflow_core::ids::TaskId::new("b")).unwrap().status =
                        workflow_core::models::TaskStatus::Completed;
                }),
                "b_completed",
            ),
        );
        result_a.unwrap();
        result_b.unwrap();

        let final_state = store.get_workflow(&workflow_id).await.unwrap().unwrap();
        assert_eq!(
            final_state.tasks[&workflow_core::ids::TaskId::new("a")].status,
            workflow_core::models::TaskStatus::Completed
        );
        assert_eq!(
            final_state.tasks[&workflow_core::ids::TaskId::new("b")].status,
            workflow_core::models::TaskStatus::Completed
        );

        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(format!("{}-wal", db_path.display()));
        let _ = std::fs::remove_file(format!("{}-shm", db_path.display()));
    }
}
