//! Runner module - Execution abstraction layer
//!
//! A runner takes a code string and a workspace and produces an
//! `ExecutionOutcome`. The only implementation is `IsolatedRunner`, which runs
//! the code in a separate interpreter process under a wall-clock deadline.
//!
//! The runner module does NOT:
//! - Create or remove workspaces
//! - Collect produced files
//! - Shape transport responses

pub mod isolated;

use async_trait::async_trait;
use std::time::Duration;

use crate::core::error::InvocationError;
use crate::core::outcome::ExecutionOutcome;
use crate::engine::workspace::Workspace;

/// Runner trait for executing submitted code
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run `code` inside `workspace`, giving up after `deadline`.
    ///
    /// Errors are returned only for failures before execution starts; launch
    /// failures and timeouts are reported through `Completion`.
    async fn run(
        &self,
        code: &str,
        workspace: &Workspace,
        deadline: Duration,
    ) -> Result<ExecutionOutcome, InvocationError>;

    /// Files in the workspace that belong to the runner, not the snippet
    fn owned_paths(&self, workspace: &Workspace) -> Vec<std::path::PathBuf>;
}

// Re-exports
pub use isolated::IsolatedRunner;
