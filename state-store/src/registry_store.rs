//! Durable `AgentRegistry`: CRUD plus text search (SQL `LIKE` over name,
//! description, capabilities, keywords) and vector similarity search
//! (cosine similarity computed in Rust over stored embeddings — adequate
//! at the scale of a few thousand registered agents).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use workflow_core::error::{CoreError, Result};
use workflow_core::ids::AgentId;
use workflow_core::registry::{AgentDependency, AgentEntry, AgentUsageStats, HealthReport};
use workflow_core::store::AgentRegistry;

pub struct SqliteAgentRegistry {
    pool: SqlitePool,
}

impl SqliteAgentRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn to_error(e: sqlx::Error) -> CoreError {
        CoreError::Registry(e.to_string())
    }
}

/// Embedding dimension is a hard invariant, enforced on every write path
/// that can introduce or replace an embedding — not just `create_agent`.
fn check_embedding_dimension(embedding: &Option<Vec<f32>>) -> Result<()> {
    if let Some(embedding) = embedding {
        if embedding.len() != workflow_core::registry::EMBEDDING_DIM {
            return Err(CoreError::registry(format!(
                "embedding has {} dimensions, expected {}",
                embedding.len(),
                workflow_core::registry::EMBEDDING_DIM
            )));
        }
    }
    Ok(())
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<AgentEntry> {
    let agent_id: String = row.try_get("agent_id").map_err(SqliteAgentRegistry::to_error)?;
    let agent_type: String = row.try_get("agent_type").map_err(SqliteAgentRegistry::to_error)?;
    let display_name: String = row.try_get("display_name").map_err(SqliteAgentRegistry::to_error)?;
    let category: String = row.try_get("category").map_err(SqliteAgentRegistry::to_error)?;
    let description: String = row.try_get("description").map_err(SqliteAgentRegistry::to_error)?;
    let embedding_json: Option<String> = row.try_get("embedding_json").map_err(SqliteAgentRegistry::to_error)?;
    let capabilities_json: String = row.try_get("capabilities_json").map_err(SqliteAgentRegistry::to_error)?;
    let tools_json: String = row.try_get("tools_json").map_err(SqliteAgentRegistry::to_error)?;
    let keywords_json: String = row.try_get("keywords_json").map_err(SqliteAgentRegistry::to_error)?;
    let dependencies_json: String = row.try_get("dependencies_json").map_err(SqliteAgentRegistry::to_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(SqliteAgentRegistry::to_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(SqliteAgentRegistry::to_error)?;
    let avg_response_time_ms: f64 = row.try_get("avg_response_time_ms").map_err(SqliteAgentRegistry::to_error)?;
    let success_rate: f64 = row.try_get("success_rate").map_err(SqliteAgentRegistry::to_error)?;
    let usage_count: i64 = row.try_get("usage_count").map_err(SqliteAgentRegistry::to_error)?;

    Ok(AgentEntry {
        agent_id: AgentId::new(agent_id),
        agent_type,
        display_name,
        category,
        description,
        embedding: embedding_json.and_then(|s| serde_json::from_str::<Vec<f32>>(&s).ok()),
        capabilities: serde_json::from_str(&capabilities_json).unwrap_or_default(),
        tools: serde_json::from_str(&tools_json).unwrap_or_default(),
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        dependencies: serde_json::from_str::<Vec<AgentDependency>>(&dependencies_json).unwrap_or_default(),
        created_at,
        updated_at,
        stats: AgentUsageStats { avg_response_time_ms, success_rate, usage_count: usage_count as u64 },
    })
}

#[async_trait]
impl AgentRegistry for SqliteAgentRegistry {
    async fn create_agent(&self, agent: AgentEntry) -> Result<AgentEntry> {
        check_embedding_dimension(&agent.embedding)?;

        let embedding_json = agent.embedding.as_ref().map(|e| serde_json::to_string(e).unwrap());
        let result = sqlx::query(
            "INSERT INTO agents (agent_id, agent_type, display_name, category, description, embedding_json, \
             capabilities_json, tools_json, keywords_json, dependencies_json, created_at, updated_at, \
             avg_response_time_ms, success_rate, usage_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(agent.agent_id.as_str())
        .bind(&agent.agent_type)
        .bind(&agent.display_name)
        .bind(&agent.category)
        .bind(&agent.description)
        .bind(embedding_json)
        .bind(serde_json::to_string(&agent.capabilities).unwrap())
        .bind(serde_json::to_string(&agent.tools).unwrap())
        .bind(serde_json::to_string(&agent.keywords).unwrap())
        .bind(serde_json::to_string(&agent.dependencies).unwrap())
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .bind(agent.stats.avg_response_time_ms)
        .bind(agent.stats.success_rate)
        .bind(agent.stats.usage_count as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(agent),
            Err(e) if e.to_string().contains("UNIQUE") => {
                Err(CoreError::registry(format!("agent '{}' already registered", agent.agent_type)))
            }
            Err(e) => Err(Self::to_error(e)),
        }
    }

    async fn get_agent_by_id(&self, agent_id: &AgentId) -> Result<Option<AgentEntry>> {
        let row = sqlx::query("SELECT * FROM agents WHERE agent_id = ?")
            .bind(agent_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::to_error)?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn get_agent_by_type(&self, agent_type: &str) -> Result<Option<AgentEntry>> {
        let row = sqlx::query("SELECT * FROM agents WHERE agent_type = ?")
            .bind(agent_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::to_error)?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn update_agent(&self, agent_id: &AgentId, agent: AgentEntry) -> Result<AgentEntry> {
        check_embedding_dimension(&agent.embedding)?;

        let embedding_json = agent.embedding.as_ref().map(|e| serde_json::to_string(e).unwrap());
        let result = sqlx::query(
            "UPDATE agents SET agent_type = ?, display_name = ?, category = ?, description = ?, \
             embedding_json = ?, capabilities_json = ?, tools_json = ?, keywords_json = ?, \
             dependencies_json = ?, updated_at = ? WHERE agent_id = ?",
        )
        .bind(&agent.agent_type)
        .bind(&agent.display_name)
        .bind(&agent.category)
        .bind(&agent.description)
        .bind(embedding_json)
        .bind(serde_json::to_string(&agent.capabilities).unwrap())
        .bind(serde_json::to_string(&agent.tools).unwrap())
        .bind(serde_json::to_string(&agent.keywords).unwrap())
        .bind(serde_json::to_string(&agent.dependencies).unwrap())
        .bind(Utc::now())
        .bind(agent_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(Self::to_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("agent {agent_id}")));
        }
        self.get_agent_by_id(agent_id).await?.ok_or_else(|| CoreError::NotFound(format!("agent {agent_id}")))
    }

    async fn delete_agent(&self, agent_id: &AgentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE agent_id = ?")
            .bind(agent_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(Self::to_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_agents(&self, query: &str, limit: u32) -> Result<Vec<(AgentEntry, f32)>> {
        let like = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT * FROM agents WHERE display_name LIKE ?1 OR description LIKE ?1 \
             OR capabilities_json LIKE ?1 OR keywords_json LIKE ?1 LIMIT ?2",
        )
        .bind(&like)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::to_error)?;

        let mut scored: Vec<(AgentEntry, f32)> = rows
            .iter()
            .map(|row| row_to_agent(row).map(|a| {
                let score = if a.matches_text(query) { 1.0 } else { 0.5 };
                (a, score)
            }))
            .collect::<Result<Vec<_>>>()?;
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        Ok(scored)
    }

    async fn similarity_search(
        &self,
        embedding: Vec<f32>,
        limit: u32,
        threshold: Option<f32>,
    ) -> Result<Vec<(AgentEntry, f32)>> {
        let rows = sqlx::query("SELECT * FROM agents WHERE embedding_json IS NOT NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(Self::to_error)?;

        let mut scored: Vec<(AgentEntry, f32)> = Vec::new();
        for row in &rows {
            let agent = row_to_agent(row)?;
            if let Some(sim) = agent.cosine_similarity(&embedding) {
                if threshold.map(|t| sim >= t).unwrap_or(true) {
                    scored.push((agent, sim));
                }
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(limit as usize);
        Ok(scored)
    }

    async fn bulk_insert(&self, agents: Vec<AgentEntry>) -> Result<u64> {
        let mut count = 0u64;
        for agent in agents {
            check_embedding_dimension(&agent.embedding)?;

            let embedding_json = agent.embedding.as_ref().map(|e| serde_json::to_string(e).unwrap());
            sqlx::query(
                "INSERT INTO agents (agent_id, agent_type, display_name, category, description, embedding_json, \
                 capabilities_json, tools_json, keywords_json, dependencies_json, created_at, updated_at, \
                 avg_response_time_ms, success_rate, usage_count) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(agent_id) DO UPDATE SET agent_type = excluded.agent_type, \
                 display_name = excluded.display_name, category = excluded.category, \
                 description = excluded.description, embedding_json = excluded.embedding_json, \
                 capabilities_json = excluded.capabilities_json, tools_json = excluded.tools_json, \
                 keywords_json = excluded.keywords_json, dependencies_json = excluded.dependencies_json, \
                 updated_at = excluded.updated_at",
            )
            .bind(agent.agent_id.as_str())
            .bind(&agent.agent_type)
            .bind(&agent.display_name)
            .bind(&agent.category)
            .bind(&agent.description)
            .bind(embedding_json)
            .bind(serde_json::to_string(&agent.capabilities).unwrap())
            .bind(serde_json::to_string(&agent.tools).unwrap())
            .bind(serde_json::to_string(&agent.keywords).unwrap())
            .bind(serde_json::to_string(&agent.dependencies).unwrap())
            .bind(agent.created_at)
            .bind(agent.updated_at)
            .bind(agent.stats.avg_response_time_ms)
            .bind(agent.stats.success_rate)
            .bind(agent.stats.usage_count as i64)
            .execute(&self.pool)
            .await
            .map_err(Self::to_error)?;
            count += 1;
        }
        Ok(count)
    }

    async fn record_usage(&self, agent_id: &AgentId, response_time_ms: f64, success: bool) -> Result<()> {
        let agent = self.get_agent_by_id(agent_id).await?.ok_or_else(|| CoreError::NotFound(format!("agent {agent_id}")))?;
        let n = agent.stats.usage_count as f64;
        let new_avg = (agent.stats.avg_response_time_ms * n + response_time_ms) / (n + 1.0);
        let successes = agent.stats.success_rate * n + if success { 1.0 } else { 0.0 };
        let new_success_rate = successes / (n + 1.0);

        sqlx::query(
            "UPDATE agents SET avg_response_time_ms = ?, success_rate = ?, usage_count = usage_count + 1, \
             updated_at = ? WHERE agent_id = ?",
        )
        .bind(new_avg)
        .bind(new_success_rate)
        .bind(Utc::now())
        .bind(agent_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(Self::to_error)?;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthReport> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM agents").fetch_one(&self.pool).await.map_err(Self::to_error)?;
        let count: i64 = row.try_get("count").map_err(Self::to_error)?;
        Ok(HealthReport {
            status: "healthy".to_string(),
            vector_index_present: false,
            agent_count: count as u64,
            timestamp: Utc::now(),
        })
    }
}
