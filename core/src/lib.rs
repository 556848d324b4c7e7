//! Workflow orchestration core.
//!
//! This crate provides the foundational domain models, trait interfaces,
//! and pure logic shared by every other crate in the workspace.
//!
//! # Architecture
//!
//! - [`ids`] - strongly typed workflow/task/agent identifiers
//! - [`models`] - workflow and task state, retry policy, the task FSM
//! - [`events`] - the closed coordination-event schema
//! - [`handoff`] - the handoff protocol's message type and validation
//! - [`registry`] - agent registry entities (capabilities, embeddings, usage)
//! - [`store`] - `WorkflowStore` / `EventTracker` / `AgentRegistry` trait contracts
//! - [`executor`] - the `TaskExecutor` contract and executor registry
//! - [`error`] - the shared error taxonomy
//! - [`validation`] - task-graph validation (cycle detection, missing deps)
//!
//! # Example
//!
//! ```rust
//! use workflow_core::models::{TaskDef, RetryPolicy};
//! use workflow_core::validation::GraphValidator;
//! use workflow_core::ids::TaskId;
//!
//! let tasks = vec![TaskDef {
//!     task_id: TaskId::new("fetch"),
//!     agent_type: "http-fetcher".to_string(),
//!     dependencies: vec![],
//!     retry_policy: RetryPolicy::default(),
//!     timeout_seconds: Some(30),
//!     allow_failure: false,
//!     input_data: serde_json::json!({"url": "https://example.com"}),
//! }];
//!
//! GraphValidator::validate(&tasks).unwrap();
//! ```

pub mod error;
pub mod events;
pub mod executor;
pub mod handoff;
pub mod ids;
pub mod models;
pub mod registry;
pub mod store;
pub mod validation;

pub use error::{CoreError, Result};
pub use events::{Event, EventType, Timeline};
pub use executor::{ExecutorFailure, ExecutorRegistry, TaskExecutionContext, TaskExecutor};
pub use handoff::HandoffMessage;
pub use ids::{AgentId, TaskId, WorkflowId};
pub use models::{RetryPolicy, TaskDef, TaskRuntimeState, TaskStatus, WorkflowState, WorkflowStatus};
pub use registry::AgentEntry;
pub use store::{AgentRegistry, EventTracker, WorkflowStore};
pub use validation::GraphValidator;

/// Current version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(CRATE_NAME, "workflow-core");
    }
}
