//! Random test data generators for workflow/task/agent fixtures.
//!
//! Combines `fake`+`rand` for realistic fixture builders used in everyday
//! unit tests, plus `proptest` strategies for property-based coverage of
//! the state machine invariants.

use chrono::Utc;
use fake::faker::company::en::Buzzword;
use fake::faker::lorem::en::{Paragraph, Sentence};
use fake::Fake;
use proptest::prelude::*;
use rand::Rng;
use serde_json::json;
use workflow_core::ids::{AgentId, TaskId, WorkflowId};
use workflow_core::models::{RetryPolicy, TaskDef, TaskRuntimeState, WorkflowState};
use workflow_core::registry::{AgentEntry, AgentUsageStats, EMBEDDING_DIM};

const AGENT_TYPES: &[&str] = &[
    "planner",
    "code-writer",
    "test-writer",
    "reviewer",
    "documenter",
    "integrator",
];

/// A realistic-looking agent type name from a fixed pool.
pub fn generate_agent_type() -> String {
    AGENT_TYPES[rand::thread_rng().gen_range(0..AGENT_TYPES.len())].to_string()
}

/// A short, human-sounding task description.
pub fn generate_task_description() -> String {
    Sentence(4..10).fake()
}

/// A longer free-text blurb, used for agent descriptions.
pub fn generate_agent_description() -> String {
    Paragraph(1..3).fake()
}

/// Build a single, dependency-free `TaskDef` with a random agent type.
pub fn generate_task_def() -> TaskDef {
    TaskDef {
        task_id: TaskId::generate(),
        agent_type: generate_agent_type(),
        dependencies: vec![],
        retry_policy: RetryPolicy::default(),
        timeout_seconds: Some(30),
        allow_failure: false,
        input_data: json!({ "description": generate_task_description() }),
    }
}

/// Build a linear chain of `count` task defs, each depending on the previous one.
pub fn generate_task_chain(count: usize) -> Vec<TaskDef> {
    let mut defs = Vec::with_capacity(count);
    let mut previous: Option<TaskId> = None;
    for _ in 0..count {
        let mut def = generate_task_def();
        if let Some(prev) = &previous {
            def.dependencies = vec![prev.clone()];
        }
        previous = Some(def.task_id.clone());
        defs.push(def);
    }
    defs
}

/// Build a fresh `WorkflowState` with the given task defs already registered as `Pending`.
pub fn generate_workflow_state(tasks: Vec<TaskDef>) -> WorkflowState {
    let now = Utc::now();
    let workflow_id = WorkflowId::generate();
    let mut state = WorkflowState::new(workflow_id.clone(), json!({}), json!({}), now);
    for def in tasks {
        let task = TaskRuntimeState::from_def(workflow_id.clone(), def, now);
        state.tasks.insert(task.task_id.clone(), task);
    }
    state
}

/// Build a random 384-dimensional unit-ish embedding vector.
pub fn generate_embedding() -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..EMBEDDING_DIM).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Build a registry entry with a random agent type, description and embedding.
pub fn generate_agent_entry() -> AgentEntry {
    let now = Utc::now();
    let agent_type = generate_agent_type();
    AgentEntry {
        agent_id: AgentId::generate(),
        agent_type: agent_type.clone(),
        display_name: agent_type.replace('-', " "),
        category: Buzzword().fake(),
        description: generate_agent_description(),
        embedding: Some(generate_embedding()),
        capabilities: vec![Sentence(1..3).fake()],
        tools: vec![],
        keywords: vec![agent_type],
        dependencies: vec![],
        created_at: now,
        updated_at: now,
        stats: AgentUsageStats::default(),
    }
}

/// Proptest strategy for a single task def with no dependencies.
pub fn task_def_strategy() -> impl Strategy<Value = TaskDef> {
    ("[a-z][a-z0-9-]{2,20}", 1u32..5, 100u64..10_000u64).prop_map(|(task_id, max_attempts, initial_delay_ms)| {
        TaskDef {
            task_id: TaskId::new(task_id),
            agent_type: "noop".to_string(),
            dependencies: vec![],
            retry_policy: RetryPolicy { max_attempts, initial_delay_ms, ..Default::default() },
            timeout_seconds: Some(30),
            allow_failure: false,
            input_data: json!({}),
        }
    })
}

/// Proptest strategy for a small DAG: a chain of 1-6 tasks, each depending on the previous.
pub fn task_chain_strategy() -> impl Strategy<Value = Vec<TaskDef>> {
    (1usize..6).prop_map(generate_task_chain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_chain_has_linear_dependencies() {
        let chain = generate_task_chain(3);
        assert_eq!(chain.len(), 3);
        assert!(chain[0].dependencies.is_empty());
        assert_eq!(chain[1].dependencies, vec![chain[0].task_id.clone()]);
        assert_eq!(chain[2].dependencies, vec![chain[1].task_id.clone()]);
    }

    #[test]
    fn generated_embedding_has_expected_dimension() {
        assert_eq!(generate_embedding().len(), EMBEDDING_DIM);
    }

    proptest! {
        #[test]
        fn task_def_strategy_always_produces_valid_retry_policy(def in task_def_strategy()) {
            prop_assert!(def.retry_policy.max_attempts >= 1);
        }
    }
}
