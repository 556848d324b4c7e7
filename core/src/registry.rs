//! Agent registry entities: metadata, capability/embedding search inputs,
//! dependency links, and aggregate usage statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

pub const EMBEDDING_DIM: usize = 384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Required,
    Optional,
    Recommended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDependency {
    pub depends_on: AgentId,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUsageStats {
    pub avg_response_time_ms: f64,
    pub success_rate: f64,
    pub usage_count: u64,
}

/// One entry in the agent registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub agent_id: AgentId,
    pub agent_type: String,
    pub display_name: String,
    pub category: String,
    pub description: String,
    pub embedding: Option<Vec<f32>>,
    pub capabilities: Vec<String>,
    pub tools: Vec<String>,
    pub keywords: Vec<String>,
    pub dependencies: Vec<AgentDependency>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub stats: AgentUsageStats,
}

impl AgentEntry {
    /// Cosine similarity against a query embedding of the same dimension.
    /// Returns `None` if either embedding is absent or dimensions mismatch.
    pub fn cosine_similarity(&self, query: &[f32]) -> Option<f32> {
        let embedding = self.embedding.as_ref()?;
        if embedding.len() != query.len() || embedding.is_empty() {
            return None;
        }
        let dot: f32 = embedding.iter().zip(query).map(|(a, b)| a * b).sum();
        let norm_a: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        let norm_b: f32 = query.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return Some(0.0);
        }
        Some(dot / (norm_a * norm_b))
    }

    pub fn matches_text(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.display_name.to_lowercase().contains(&q)
            || self.description.to_lowercase().contains(&q)
            || self.capabilities.iter().any(|c| c.to_lowercase().contains(&q))
            || self.keywords.iter().any(|k| k.to_lowercase().contains(&q))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub vector_index_present: bool,
    pub agent_count: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(embedding: Option<Vec<f32>>) -> AgentEntry {
        AgentEntry {
            agent_id: AgentId::new("a1"),
            agent_type: "planner".into(),
            display_name: "Planner".into(),
            category: "planning".into(),
            description: "breaks down PRDs into tasks".into(),
            embedding,
            capabilities: vec!["planning".into()],
            tools: vec![],
            keywords: vec!["prd".into()],
            dependencies: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            stats: AgentUsageStats::default(),
        }
    }

    #[test]
    fn identical_vectors_have_similarity_one() {
        let e = entry(Some(vec![1.0, 0.0, 0.0]));
        let sim = e.cosine_similarity(&[1.0, 0.0, 0.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let e = entry(Some(vec![1.0, 0.0]));
        let sim = e.cosine_similarity(&[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn missing_embedding_returns_none() {
        let e = entry(None);
        assert!(e.cosine_similarity(&[1.0]).is_none());
    }

    #[test]
    fn text_search_matches_keywords() {
        let e = entry(None);
        assert!(e.matches_text("PRD"));
        assert!(!e.matches_text("database"));
    }
}
