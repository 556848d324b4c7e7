//! Demo binary: runs a small diamond-shaped workflow through the
//! orchestration engine end to end, against a durable or in-memory backend
//! depending on `--database-url`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Value};
use tracing::info;

use mocks::{InMemoryEventTracker, InMemoryWorkflowStore};
use orchestrator::config::CliArgs;
use orchestrator::{OrchestratorConfig, WorkflowOrchestrator};
use workflow_core::executor::{ExecutorFailure, TaskExecutionContext, TaskExecutor};
use workflow_core::models::{RetryPolicy, TaskDef};
use workflow_core::store::{EventTracker, WorkflowStore};

/// Echoes its input back as the task result. Stands in for a real agent
/// runtime, which this crate does not provide.
struct EchoExecutor;

#[async_trait]
impl TaskExecutor for EchoExecutor {
    async fn execute(&self, ctx: TaskExecutionContext) -> Result<Value, ExecutorFailure> {
        Ok(json!({ "echoed": ctx.task_def.input_data, "task_id": ctx.task_def.task_id.to_string() }))
    }
}

fn diamond_workflow() -> Vec<TaskDef> {
    let task = |id: &str, deps: &[&str]| TaskDef {
        task_id: workflow_core::ids::TaskId::new(id),
        agent_type: "echo".to_string(),
        dependencies: deps.iter().map(|d| workflow_core::ids::TaskId::new(*d)).collect(),
        retry_policy: RetryPolicy::default(),
        timeout_seconds: Some(30),
        allow_failure: false,
        input_data: json!({ "step": id }),
    };
    vec![task("fetch", &[]), task("analyze", &["fetch"]), task("summarize", &["fetch"]), task("report", &["analyze", "summarize"])]
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = CliArgs::parse();
    let config: OrchestratorConfig = args.into();

    let (store, tracker): (Arc<dyn WorkflowStore>, Arc<dyn EventTracker>) = if config.database_url == ":memory:" {
        info!("running against the non-durable in-memory backend");
        (Arc::new(InMemoryWorkflowStore::new()), Arc::new(InMemoryEventTracker::new()))
    } else {
        info!(database_url = %config.database_url, "running against the durable sqlite backend");
        let pool = state_store::connect(&config.database_url).await?;
        (Arc::new(state_store::SqliteWorkflowStore::new(pool.clone())), Arc::new(state_store::SqliteEventTracker::new(pool)))
    };

    let orchestrator = WorkflowOrchestrator::new(store, tracker, config);
    orchestrator.register_executor("echo", Arc::new(EchoExecutor));

    let workflow_id = orchestrator.create_workflow(diamond_workflow(), None, Some(json!({ "demo": true }))).await?;
    info!(%workflow_id, "workflow created");

    let result = orchestrator.execute_workflow(&workflow_id).await?;
    info!(status = %result.status, tasks = result.tasks.len(), "workflow finished");
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
