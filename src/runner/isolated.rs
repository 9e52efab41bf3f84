//! Isolated runner implementation
//!
//! Writes the code to a script file and runs it with the configured
//! interpreter in a child process. The child gets its own process group so
//! everything it started is killed when the run ends, on time or not.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::Runner;
use crate::config::RunnerConfig;
use crate::core::error::InvocationError;
use crate::core::outcome::{Completion, ExecutionOutcome};
use crate::engine::workspace::Workspace;

/// Runner that executes code in a separate interpreter process
#[derive(Debug, Clone)]
pub struct IsolatedRunner {
    /// Interpreter program and leading arguments
    interpreter: Vec<String>,
    /// Script file name inside the workspace
    script_name: String,
    extend_pythonpath: bool,
}

impl IsolatedRunner {
    pub fn new(interpreter: Vec<String>, script_name: impl Into<String>) -> Self {
        Self {
            interpreter,
            script_name: script_name.into(),
            extend_pythonpath: true,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.interpreter.clone(), config.script_name.clone())
            .with_extend_pythonpath(config.extend_pythonpath)
    }

    pub fn with_extend_pythonpath(mut self, value: bool) -> Self {
        self.extend_pythonpath = value;
        self
    }

    pub fn script_path(&self, workspace: &Workspace) -> PathBuf {
        workspace.path().join(&self.script_name)
    }

    fn build_command(&self, script_path: &Path, work_dir: &Path) -> Result<Command, String> {
        let mut parts = self.interpreter.iter();
        let program = parts
            .next()
            .ok_or_else(|| "No interpreter configured".to_string())?;

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .arg(script_path)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.extend_pythonpath {
            cmd.env("PYTHONPATH", widened_pythonpath());
        }

        #[cfg(unix)]
        cmd.process_group(0);

        Ok(cmd)
    }
}

#[async_trait]
impl Runner for IsolatedRunner {
    async fn run(
        &self,
        code: &str,
        workspace: &Workspace,
        deadline: Duration,
    ) -> Result<ExecutionOutcome, InvocationError> {
        let script_path = self.script_path(workspace);
        fs::write(&script_path, code)
            .await
            .map_err(InvocationError::WorkspaceWriteFailure)?;

        let mut cmd = match self.build_command(&script_path, workspace.path()) {
            Ok(cmd) => cmd,
            Err(msg) => {
                return Ok(ExecutionOutcome::without_output(Completion::RuntimeFailure(
                    msg,
                )))
            }
        };

        debug!(
            "Running {:?} {} in {}",
            self.interpreter,
            script_path.display(),
            workspace.path().display()
        );

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn interpreter {:?}: {}", self.interpreter, e);
                return Ok(ExecutionOutcome::without_output(Completion::RuntimeFailure(
                    e.to_string(),
                )));
            }
        };

        let pid = child.id();
        let started = Instant::now();

        let waited = tokio::time::timeout(deadline, child.wait_with_output()).await;

        // Whatever the snippet left running in the background dies with it.
        // On timeout the child itself was already killed when its future dropped.
        if let Some(pid) = pid {
            kill_process_group(pid);
        }

        match waited {
            Ok(Ok(output)) => {
                let exit_code = exit_code_of(output.status);
                info!(
                    "Script finished: exit_code={}, elapsed_ms={}",
                    exit_code,
                    started.elapsed().as_millis()
                );
                Ok(ExecutionOutcome::new(
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                    Completion::Success(exit_code),
                ))
            }
            Ok(Err(e)) => Ok(ExecutionOutcome::without_output(Completion::RuntimeFailure(
                format!("Failed to wait for script: {}", e),
            ))),
            Err(_) => {
                warn!("Script timed out after {}ms", deadline.as_millis());
                Ok(ExecutionOutcome::without_output(Completion::TimedOut))
            }
        }
    }

    fn owned_paths(&self, workspace: &Workspace) -> Vec<PathBuf> {
        vec![self.script_path(workspace)]
    }
}

/// Exit code as reported by the child; signal deaths become `-signal`
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        // ESRCH: the whole group is already gone
        if e != nix::errno::Errno::ESRCH {
            warn!("Failed to kill process group {}: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// `PYTHONPATH` with the service's working directory in front
fn widened_pythonpath() -> String {
    let cwd = std::env::var("PWD")
        .ok()
        .or_else(|| {
            std::env::current_dir()
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    let existing = std::env::var("PYTHONPATH").unwrap_or_default();
    format!("{}:{}", cwd, existing)
}
