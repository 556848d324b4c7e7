//! End-to-end coverage of the agent registry's search paths: bulk upsert,
//! cosine-similarity ranking over 384-dim embeddings, and rolling usage stats.

use chrono::Utc;

use mocks::InMemoryAgentRegistry;
use workflow_core::ids::AgentId;
use workflow_core::registry::{AgentEntry, AgentUsageStats, EMBEDDING_DIM};
use workflow_core::store::AgentRegistry;

/// A small deterministic PRNG so this test needs no `rand` dependency of its
/// own and reproduces the same embeddings on every run.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
    }

    fn vector(&mut self, dim: usize) -> Vec<f32> {
        (0..dim).map(|_| self.next_f32()).collect()
    }
}

fn agent(agent_type: &str, embedding: Vec<f32>) -> AgentEntry {
    AgentEntry {
        agent_id: AgentId::generate(),
        agent_type: agent_type.to_string(),
        display_name: agent_type.to_string(),
        category: "generated".to_string(),
        description: format!("synthetic agent {agent_type}"),
        embedding: Some(embedding),
        capabilities: vec![],
        tools: vec![],
        keywords: vec![],
        dependencies: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
        stats: AgentUsageStats::default(),
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[tokio::test]
async fn similarity_search_over_a_hundred_agents_returns_the_true_top_k() {
    let registry = InMemoryAgentRegistry::new();
    let mut rng = Lcg(0x9E3779B97F4A7C15);

    let agents: Vec<AgentEntry> = (0..100).map(|i| agent(&format!("agent-{i}"), rng.vector(EMBEDDING_DIM))).collect();
    let inserted = registry.bulk_insert(agents.clone()).await.unwrap();
    assert_eq!(inserted, 100);

    let query = rng.vector(EMBEDDING_DIM);
    let mut expected: Vec<(String, f32)> =
        agents.iter().map(|a| (a.agent_type.clone(), cosine(a.embedding.as_ref().unwrap(), &query))).collect();
    expected.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    let expected_top5: Vec<String> = expected.iter().take(5).map(|(ty, _)| ty.clone()).collect();

    let results = registry.similarity_search(query, 5, None).await.unwrap();
    assert_eq!(results.len(), 5);
    let got_top5: Vec<String> = results.iter().map(|(a, _)| a.agent_type.clone()).collect();
    assert_eq!(got_top5, expected_top5);

    // Results are sorted descending by score.
    for pair in results.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
}

#[tokio::test]
async fn similarity_search_threshold_excludes_low_scoring_agents() {
    let registry = InMemoryAgentRegistry::new();
    registry.create_agent(agent("identical", vec![1.0; EMBEDDING_DIM])).await.unwrap();
    let mut orthogonal = vec![0.0; EMBEDDING_DIM];
    orthogonal[0] = 1.0;
    registry.create_agent(agent("unrelated", orthogonal)).await.unwrap();

    let results = registry.similarity_search(vec![1.0; EMBEDDING_DIM], 10, Some(0.9)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.agent_type, "identical");
}

#[tokio::test]
async fn rolling_usage_stats_average_across_many_calls() {
    let registry = InMemoryAgentRegistry::new();
    let created = registry.create_agent(agent("worker", vec![0.0; EMBEDDING_DIM])).await.unwrap();

    for i in 0..10 {
        registry.record_usage(&created.agent_id, 100.0 + i as f64, i % 3 != 0).await.unwrap();
    }

    let fetched = registry.get_agent_by_id(&created.agent_id).await.unwrap().unwrap();
    assert_eq!(fetched.stats.usage_count, 10);
    assert!(fetched.stats.avg_response_time_ms > 100.0 && fetched.stats.avg_response_time_ms < 110.0);
}
