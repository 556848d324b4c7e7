//! In-memory `AgentRegistry` test double.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use workflow_core::error::{CoreError, Result};
use workflow_core::ids::AgentId;
use workflow_core::registry::{AgentEntry, HealthReport, EMBEDDING_DIM};
use workflow_core::store::AgentRegistry;

#[derive(Default)]
pub struct InMemoryAgentRegistry {
    agents: Mutex<HashMap<AgentId, AgentEntry>>,
    error_injection: Mutex<Option<CoreError>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_error(&self, error: CoreError) {
        *self.error_injection.lock() = Some(error);
    }

    fn check_error_injection(&self) -> Result<()> {
        if let Some(error) = self.error_injection.lock().take() {
            return Err(error);
        }
        Ok(())
    }
}

/// Embedding dimension is a hard invariant, enforced on every write path
/// that can introduce or replace an embedding — not just `create_agent`.
fn check_embedding_dimension(embedding: &Option<Vec<f32>>) -> Result<()> {
    if let Some(embedding) = embedding {
        if embedding.len() != EMBEDDING_DIM {
            return Err(CoreError::registry(format!(
                "embedding dimension {} does not match expected {EMBEDDING_DIM}",
                embedding.len()
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl AgentRegistry for InMemoryAgentRegistry {
    async fn create_agent(&self, agent: AgentEntry) -> Result<AgentEntry> {
        self.check_error_injection()?;
        check_embedding_dimension(&agent.embedding)?;
        let mut agents = self.agents.lock();
        if agents.values().any(|a| a.agent_type == agent.agent_type) {
            return Err(CoreError::registry(format!("agent_type '{}' already registered", agent.agent_type)));
        }
        agents.insert(agent.agent_id.clone(), agent.clone());
        Ok(agent)
    }

    async fn get_agent_by_id(&self, agent_id: &AgentId) -> Result<Option<AgentEntry>> {
        self.check_error_injection()?;
        Ok(self.agents.lock().get(agent_id).cloned())
    }

    async fn get_agent_by_type(&self, agent_type: &str) -> Result<Option<AgentEntry>> {
        self.check_error_injection()?;
        Ok(self.agents.lock().values().find(|a| a.agent_type == agent_type).cloned())
    }

    async fn update_agent(&self, agent_id: &AgentId, agent: AgentEntry) -> Result<AgentEntry> {
        self.check_error_injection()?;
        check_embedding_dimension(&agent.embedding)?;
        let mut agents = self.agents.lock();
        if !agents.contains_key(agent_id) {
            return Err(CoreError::NotFound(format!("agent {agent_id} not found")));
        }
        let mut updated = agent;
        updated.updated_at = Utc::now();
        agents.insert(agent_id.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete_agent(&self, agent_id: &AgentId) -> Result<bool> {
        self.check_error_injection()?;
        Ok(self.agents.lock().remove(agent_id).is_some())
    }

    async fn search_agents(&self, query: &str, limit: u32) -> Result<Vec<(AgentEntry, f32)>> {
        self.check_error_injection()?;
        let agents = self.agents.lock();
        let mut matched: Vec<(AgentEntry, f32)> = agents
            .values()
            .filter(|a| a.matches_text(query))
            .map(|a| (a.clone(), 1.0))
            .collect();
        matched.truncate(limit as usize);
        Ok(matched)
    }

    async fn similarity_search(
        &self,
        embedding: Vec<f32>,
        limit: u32,
        threshold: Option<f32>,
    ) -> Result<Vec<(AgentEntry, f32)>> {
        self.check_error_injection()?;
        let agents = self.agents.lock();
        let mut scored: Vec<(AgentEntry, f32)> = agents
            .values()
            .filter_map(|a| a.cosine_similarity(&embedding).map(|s| (a.clone(), s)))
            .filter(|(_, score)| threshold.map(|t| *score >= t).unwrap_or(true))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit as usize);
        Ok(scored)
    }

    async fn bulk_insert(&self, agents: Vec<AgentEntry>) -> Result<u64> {
        self.check_error_injection()?;
        for agent in &agents {
            check_embedding_dimension(&agent.embedding)?;
        }
        let mut store = self.agents.lock();
        let count = agents.len() as u64;
        for agent in agents {
            store.insert(agent.agent_id.clone(), agent);
        }
        Ok(count)
    }

    async fn record_usage(&self, agent_id: &AgentId, response_time_ms: f64, success: bool) -> Result<()> {
        self.check_error_injection()?;
        let mut agents = self.agents.lock();
        let agent = agents.get_mut(agent_id).ok_or_else(|| CoreError::NotFound(format!("agent {agent_id} not found")))?;
        let stats = &mut agent.stats;
        let n = stats.usage_count as f64;
        stats.avg_response_time_ms = (stats.avg_response_time_ms * n + response_time_ms) / (n + 1.0);
        let successes = stats.success_rate * n + if success { 1.0 } else { 0.0 };
        stats.usage_count += 1;
        stats.success_rate = successes / stats.usage_count as f64;
        agent.updated_at = Utc::now();
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthReport> {
        self.check_error_injection()?;
        Ok(HealthReport {
            status: "ok".to_string(),
            vector_index_present: false,
            agent_count: self.agents.lock().len() as u64,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(agent_type: &str) -> AgentEntry {
        AgentEntry {
            agent_id: AgentId::generate(),
            agent_type: agent_type.to_string(),
            display_name: agent_type.to_string(),
            category: "test".to_string(),
            description: "a test agent".to_string(),
            embedding: None,
            capabilities: vec![],
            tools: vec![],
            keywords: vec![],
            dependencies: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            stats: Default::default(),
        }
    }

    #[tokio::test]
    async fn create_then_fetch_by_type() {
        let registry = InMemoryAgentRegistry::new();
        registry.create_agent(agent("planner")).await.unwrap();
        assert!(registry.get_agent_by_type("planner").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_agent_type_is_rejected() {
        let registry = InMemoryAgentRegistry::new();
        registry.create_agent(agent("planner")).await.unwrap();
        assert!(registry.create_agent(agent("planner")).await.is_err());
    }

    #[tokio::test]
    async fn update_agent_rejects_a_malformed_embedding() {
        let registry = InMemoryAgentRegistry::new();
        let a = registry.create_agent(agent("planner")).await.unwrap();
        let mut bad = a.clone();
        bad.embedding = Some(vec![1.0, 2.0]);
        assert!(registry.update_agent(&a.agent_id, bad).await.is_err());
    }

    #[tokio::test]
    async fn bulk_insert_rejects_a_malformed_embedding() {
        let registry = InMemoryAgentRegistry::new();
        let mut bad = agent("planner");
        bad.embedding = Some(vec![1.0, 2.0]);
        assert!(registry.bulk_insert(vec![bad]).await.is_err());
    }

    #[tokio::test]
    async fn record_usage_updates_rolling_stats() {
        let registry = InMemoryAgentRegistry::new();
        let a = registry.create_agent(agent("planner")).await.unwrap();
        registry.record_usage(&a.agent_id, 100.0, true).await.unwrap();
        registry.record_usage(&a.agent_id, 200.0, false).await.unwrap();
        let updated = registry.get_agent_by_id(&a.agent_id).await.unwrap().unwrap();
        assert_eq!(updated.stats.usage_count, 2);
        assert!((updated.stats.avg_response_time_ms - 150.0).abs() < 1e-6);
        assert!((updated.stats.success_rate - 0.5).abs() < 1e-6);
    }
}
