//! SQLite-backed durable persistence for the orchestration engine.
//!
//! Provides `WorkflowStore`, `EventTracker`, and `AgentRegistry`
//! implementations backed by a single `sqlx::SqlitePool`, with WAL mode
//! for file-backed databases and embedded migrations.
//!
//! # Usage
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use state_store::{connect, SqliteWorkflowStore, SqliteEventTracker, SqliteAgentRegistry};
//!
//! let pool = connect(":memory:").await?;
//! let workflow_store = SqliteWorkflowStore::new(pool.clone());
//! let event_tracker = SqliteEventTracker::new(pool.clone());
//! let registry = SqliteAgentRegistry::new(pool);
//! # Ok(())
//! # }
//! ```

mod event_store;
mod pool;
mod registry_store;
mod workflow_store;

pub use event_store::SqliteEventTracker;
pub use pool::connect;
pub use registry_store::SqliteAgentRegistry;
pub use workflow_store::SqliteWorkflowStore;

// Re-export the trait contracts for convenience
pub use workflow_core::store::{AgentRegistry, EventTracker, WorkflowStore};
