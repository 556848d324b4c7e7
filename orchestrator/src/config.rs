//! Orchestrator configuration: runtime tunables for the engine, and the
//! `clap`-derived CLI args the demo binary builds them from.

use clap::Parser;
use workflow_core::models::RetryPolicy;

/// What happens to in-flight tasks found `Running` in the state store at
/// startup, before any new `execute_workflow` call resumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashRecoveryPolicy {
    /// Mark orphaned `Running` tasks `Failed` and let the workflow's usual
    /// skip/complete logic take over. The default — never re-runs a task
    /// whose executor may have partially applied side effects.
    MarkFailed,
    /// Reset orphaned `Running` tasks back to `Pending` so the next
    /// `execute_workflow` call retries them from scratch.
    ResetToPending,
}

impl Default for CrashRecoveryPolicy {
    fn default() -> Self {
        Self::MarkFailed
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_parallel_tasks: usize,
    pub default_retry_policy: RetryPolicy,
    pub database_url: String,
    pub event_tracker_enabled: bool,
    pub crash_recovery_policy: CrashRecoveryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 10,
            default_retry_policy: RetryPolicy::default(),
            database_url: ":memory:".to_string(),
            event_tracker_enabled: true,
            crash_recovery_policy: CrashRecoveryPolicy::default(),
        }
    }
}

/// CLI args for the orchestrator demo binary.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Runs a demo workflow through the orchestration engine", long_about = None)]
pub struct CliArgs {
    /// SQLite connection string, or `:memory:` for a non-durable run.
    #[arg(short, long, default_value = ":memory:")]
    pub database_url: String,

    /// Maximum number of tasks the scheduler runs concurrently.
    #[arg(short = 'p', long, default_value_t = 10)]
    pub max_parallel_tasks: usize,

    /// Disable the event tracker (coordination events are not recorded).
    #[arg(long)]
    pub no_event_tracker: bool,

    /// Reset orphaned `Running` tasks to `Pending` on recovery instead of
    /// marking them `Failed`.
    #[arg(long)]
    pub reset_incomplete_on_recovery: bool,
}

impl From<CliArgs> for OrchestratorConfig {
    fn from(args: CliArgs) -> Self {
        Self {
            max_parallel_tasks: args.max_parallel_tasks,
            default_retry_policy: RetryPolicy::default(),
            database_url: args.database_url,
            event_tracker_enabled: !args.no_event_tracker,
            crash_recovery_policy: if args.reset_incomplete_on_recovery {
                CrashRecoveryPolicy::ResetToPending
            } else {
                CrashRecoveryPolicy::MarkFailed
            },
        }
    }
}
