//! The DAG scheduler and execution engine — Component D of the orchestration
//! core. `WorkflowOrchestrator` drives a workflow from creation to a terminal
//! status against whatever `WorkflowStore` / `EventTracker` pair the caller
//! wires in (durable `state-store` or the in-memory `mocks` fallback).
//!
//! # Modules
//!
//! - [`engine`] - `WorkflowOrchestrator`: create/execute/pause/resume/cancel,
//!   the per-task execution pipeline, and crash recovery.
//! - [`config`] - tunables (`max_parallel_tasks`, retry defaults, crash
//!   recovery policy) and the CLI args the demo binary builds them from.
//! - [`result`] - `WorkflowResult`, the per-task outcome map returned by
//!   `execute_workflow`.

pub mod config;
pub mod engine;
pub mod result;

pub use config::{CrashRecoveryPolicy, OrchestratorConfig};
pub use engine::WorkflowOrchestrator;
pub use result::{TaskOutcome, WorkflowResult};
