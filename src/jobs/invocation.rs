//! Invocation pipeline
//!
//! validate → acquire workspace → run → collect artifacts → build response →
//! release workspace. The workspace is released on every path once acquired.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::RunnerConfig;
use crate::core::error::InvocationError;
use crate::core::outcome::ExecutionOutcome;
use crate::core::request::{parse_request, parse_request_bytes, InvocationRequest};
use crate::core::response::{build_response, error_response, InvocationResponse};
use crate::engine::artifacts::collect_artifacts;
use crate::engine::workspace::Workspace;
use crate::runner::{IsolatedRunner, Runner};

/// Counter used to tag log lines of one invocation
static INVOCATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Executes invocations end to end
#[derive(Clone)]
pub struct Invoker {
    config: Arc<RunnerConfig>,
    runner: Arc<dyn Runner>,
}

impl Invoker {
    pub fn new(config: RunnerConfig) -> Self {
        let runner = Arc::new(IsolatedRunner::from_config(&config));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: RunnerConfig, runner: Arc<dyn Runner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Handle an already-decoded invocation event
    pub async fn handle(&self, event: &Value) -> InvocationResponse {
        let request = parse_request(event);
        self.respond(request).await
    }

    /// Handle a raw transport payload
    pub async fn handle_bytes(&self, payload: &[u8]) -> InvocationResponse {
        let request = parse_request_bytes(payload);
        self.respond(request).await
    }

    /// Response for a fault outside the pipeline (e.g. a panicked task)
    pub fn fault_response(&self, message: impl Into<String>) -> InvocationResponse {
        let err = InvocationError::InternalFault(message.into());
        error!("Invocation failed: {}", err);
        error_response(&err, self.config.files_format)
    }

    /// Response for a payload the transport refused before parsing
    pub fn rejection_response(&self, message: impl Into<String>) -> InvocationResponse {
        let err = InvocationError::InvalidRequest(message.into());
        warn!("Invocation rejected: {}", err);
        error_response(&err, self.config.files_format)
    }

    async fn respond(
        &self,
        request: Result<InvocationRequest, InvocationError>,
    ) -> InvocationResponse {
        let id = INVOCATION_COUNTER.fetch_add(1, Ordering::Relaxed);

        let result = match request {
            Ok(request) => {
                info!(
                    "Invocation {} started: code_bytes={}",
                    id,
                    request.code.len()
                );
                self.execute(&request.code).await
            }
            Err(err) => Err(err),
        };

        match &result {
            Ok(outcome) => info!(
                "Invocation {} finished: completion={}, files={}",
                id,
                outcome.completion,
                outcome.produced_files.len()
            ),
            Err(err) if err.is_client_error() => {
                warn!("Invocation {} rejected ({}): {}", id, err.kind(), err)
            }
            Err(err) => error!("Invocation {} failed ({}): {}", id, err.kind(), err),
        }

        build_response(result, self.config.files_format)
    }

    /// Run code in a fresh workspace and collect what it produced
    pub async fn execute(&self, code: &str) -> Result<ExecutionOutcome, InvocationError> {
        let workspace = Workspace::acquire(&self.config)?;
        let result = self.run_in(&workspace, code).await;
        workspace.release();
        result
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        code: &str,
    ) -> Result<ExecutionOutcome, InvocationError> {
        let mut outcome = self
            .runner
            .run(code, workspace, self.config.timeout())
            .await?;

        // Timed-out and unlaunched runs skip collection
        if outcome.completion.ran() {
            let exclude: HashSet<PathBuf> =
                self.runner.owned_paths(workspace).into_iter().collect();
            let collected = collect_artifacts(
                workspace.output_dir(),
                &exclude,
                self.config.artifact_naming,
            );
            collected.annotate_stderr(&mut outcome.stderr);
            outcome.produced_files = collected.artifacts;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::Completion;
    use crate::core::response::FilesFormat;
    use crate::engine::artifacts::ArtifactNaming;
    use async_trait::async_trait;
    use base64::{engine::general_purpose, Engine as _};
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;

    fn sh_config(root: &Path) -> RunnerConfig {
        RunnerConfig {
            interpreter: vec!["sh".to_string()],
            script_name: "script.sh".to_string(),
            workspace_root: Some(root.to_path_buf()),
            ..RunnerConfig::default()
        }
    }

    fn decode(data: &Value) -> Vec<u8> {
        general_purpose::STANDARD
            .decode(data.as_str().unwrap())
            .unwrap()
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_missing_code_never_acquires_workspace() {
        let root = tempfile::tempdir().unwrap();
        let ws_root = root.path().join("workspaces");
        let invoker = Invoker::new(sh_config(&ws_root));

        let resp = invoker.handle(&json!({ "body": "{}" })).await;
        assert_eq!(resp.status_code, 400);
        let body = resp.body_json().unwrap();
        assert_eq!(body["exit_code"], -1);
        assert_eq!(body["files"], json!({}));
        assert!(!ws_root.exists());
    }

    #[tokio::test]
    async fn test_files_collected_and_workspace_released() {
        let root = tempfile::tempdir().unwrap();
        let invoker = Invoker::new(sh_config(root.path()));

        let code = "printf 'Test content' > output.txt; mkdir -p sub; printf 'x' > sub/n.txt; echo done";
        let resp = invoker.handle(&json!({ "code": code })).await;

        assert_eq!(resp.status_code, 200);
        let body = resp.body_json().unwrap();
        assert_eq!(body["stdout"], "done\n");
        assert_eq!(body["exit_code"], 0);
        assert!(body.get("error").is_none());

        let files = body["files"].as_object().unwrap();
        assert_eq!(files.len(), 2);
        assert!(!files.contains_key("script.sh"));
        assert_eq!(decode(&files["output.txt"]), b"Test content");
        assert_eq!(decode(&files["sub/n.txt"]), b"x");

        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_failing_script_still_collects_files() {
        let root = tempfile::tempdir().unwrap();
        let invoker = Invoker::new(sh_config(root.path()));

        let resp = invoker
            .handle(&json!({ "code": "echo partial > part.txt; echo boom >&2; exit 2" }))
            .await;

        assert_eq!(resp.status_code, 200);
        let body = resp.body_json().unwrap();
        assert_eq!(body["exit_code"], 2);
        assert_eq!(body["stderr"], "boom\n");
        assert_eq!(decode(&body["files"]["part.txt"]), b"partial\n");
    }

    #[tokio::test]
    async fn test_timeout_is_500_and_releases_workspace() {
        let root = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            timeout_ms: 300,
            ..sh_config(root.path())
        };
        let invoker = Invoker::new(config);

        let resp = invoker
            .handle(&json!({ "code": "echo hi > early.txt; sleep 30" }))
            .await;

        assert_eq!(resp.status_code, 500);
        let body = resp.body_json().unwrap();
        assert_eq!(body["error"], "Script execution timed out");
        assert_eq!(body["stdout"], "");
        assert_eq!(body["files"], json!({}));
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_500() {
        let root = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            interpreter: vec!["no-such-interpreter-b81c".to_string()],
            ..sh_config(root.path())
        };
        let resp = Invoker::new(config)
            .handle(&json!({ "code": "echo hi" }))
            .await;

        assert_eq!(resp.status_code, 500);
        let error = resp.body_json().unwrap()["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Script execution failed:"));
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_runs_do_not_leak_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let invoker = Invoker::new(sh_config(root.path()));

        let first = invoker
            .handle(&json!({ "code": "echo one > first.txt" }))
            .await;
        assert!(first.body_json().unwrap()["files"]
            .as_object()
            .unwrap()
            .contains_key("first.txt"));

        let second = invoker.handle(&json!({ "code": "ls" })).await;
        let body = second.body_json().unwrap();
        assert_eq!(body["files"], json!({}));
        assert_eq!(body["stdout"], "script.sh\n");
    }

    #[tokio::test]
    async fn test_output_dir_bounds_collection() {
        let root = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            output_dir: PathBuf::from("out"),
            artifact_naming: ArtifactNaming::Flat,
            files_format: FilesFormat::List,
            ..sh_config(root.path())
        };
        let invoker = Invoker::new(config);

        let resp = invoker
            .handle(&json!({ "code": "echo a > scratch.txt; mkdir -p out/deep; echo b > out/deep/result.txt" }))
            .await;

        let body = resp.body_json().unwrap();
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["name"], "result.txt");
        assert_eq!(decode(&files[0]["data"]), b"b\n");
    }

    #[tokio::test]
    async fn test_handle_bytes_malformed() {
        let root = tempfile::tempdir().unwrap();
        let invoker = Invoker::new(sh_config(root.path()));

        let resp = invoker.handle_bytes(b"{\"code\": ").await;
        assert_eq!(resp.status_code, 400);
        let error = resp.body_json().unwrap()["error"].as_str().unwrap().to_string();
        assert!(error.starts_with("Request body is not valid JSON"));
    }

    struct FailingWriteRunner;

    #[async_trait]
    impl Runner for FailingWriteRunner {
        async fn run(
            &self,
            _code: &str,
            _workspace: &Workspace,
            _deadline: Duration,
        ) -> Result<ExecutionOutcome, InvocationError> {
            Err(InvocationError::WorkspaceWriteFailure(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no space left on device",
            )))
        }

        fn owned_paths(&self, _workspace: &Workspace) -> Vec<PathBuf> {
            vec![]
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_500_and_releases_workspace() {
        let root = tempfile::tempdir().unwrap();
        let invoker =
            Invoker::with_runner(sh_config(root.path()), Arc::new(FailingWriteRunner));

        let resp = invoker.handle(&json!({ "code": "x" })).await;
        assert_eq!(resp.status_code, 500);
        assert_eq!(
            resp.body_json().unwrap()["error"],
            "Failed to write script file: no space left on device"
        );
        assert!(dir_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_execute_reports_exit_code() {
        let root = tempfile::tempdir().unwrap();
        let invoker = Invoker::new(sh_config(root.path()));
        let outcome = invoker.execute("exit 4").await.unwrap();
        assert_eq!(outcome.completion, Completion::Success(4));
    }

    #[test]
    fn test_fault_response() {
        let invoker = Invoker::new(RunnerConfig::default());
        let resp = invoker.fault_response("task panicked");
        assert_eq!(resp.status_code, 500);
        assert_eq!(
            resp.body_json().unwrap()["error"],
            "Unexpected error: task panicked"
        );
    }
}
