//! Runner configuration
//!
//! Loaded from an optional TOML file (`RUNNER_CONFIG`), then overridden by
//! environment variables. Installed once per process with `init_config`.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::core::response::FilesFormat;
use crate::engine::artifacts::ArtifactNaming;

/// Default wall-clock deadline for one execution
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Default cap on an HTTP request body (6 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Runner configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,
    /// Largest accepted HTTP request body in bytes
    pub max_body_bytes: usize,
    /// Interpreter command; the script path is appended as the last argument
    pub interpreter: Vec<String>,
    /// Name of the script file written into the workspace
    pub script_name: String,
    /// Wall-clock deadline in milliseconds (default: 5000ms)
    pub timeout_ms: u64,
    /// Directory under which workspaces are created (default: system temp dir)
    pub workspace_root: Option<PathBuf>,
    /// Output root relative to the workspace; empty means the workspace itself
    pub output_dir: PathBuf,
    pub artifact_naming: ArtifactNaming,
    pub files_format: FilesFormat,
    /// Prepend the service's working directory to the child's PYTHONPATH
    pub extend_pythonpath: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            interpreter: vec!["python3".to_string()],
            script_name: "script.py".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            workspace_root: None,
            output_dir: PathBuf::new(),
            artifact_naming: ArtifactNaming::Relative,
            files_format: FilesFormat::Map,
            extend_pythonpath: true,
        }
    }
}

impl RunnerConfig {
    /// Load configuration: TOML file from `RUNNER_CONFIG` if set, then env overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("RUNNER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `RUNNER_*` overrides using the given lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup("RUNNER_BIND_ADDR") {
            self.bind_addr = addr
                .parse()
                .with_context(|| format!("Invalid RUNNER_BIND_ADDR: {}", addr))?;
        }
        if let Some(limit) = lookup("RUNNER_MAX_BODY_BYTES") {
            self.max_body_bytes = limit
                .parse()
                .with_context(|| format!("Invalid RUNNER_MAX_BODY_BYTES: {}", limit))?;
        }
        if let Some(interpreter) = lookup("RUNNER_INTERPRETER") {
            self.interpreter = into_command(&interpreter);
        }
        if let Some(name) = lookup("RUNNER_SCRIPT_NAME") {
            self.script_name = name;
        }
        if let Some(timeout) = lookup("RUNNER_TIMEOUT_MS") {
            self.timeout_ms = timeout
                .parse()
                .with_context(|| format!("Invalid RUNNER_TIMEOUT_MS: {}", timeout))?;
        }
        if let Some(root) = lookup("RUNNER_WORKSPACE_ROOT") {
            self.workspace_root = Some(PathBuf::from(root));
        }
        if let Some(dir) = lookup("RUNNER_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(naming) = lookup("RUNNER_ARTIFACT_NAMING") {
            self.artifact_naming = match naming.to_lowercase().as_str() {
                "relative" => ArtifactNaming::Relative,
                "flat" => ArtifactNaming::Flat,
                other => anyhow::bail!("Invalid RUNNER_ARTIFACT_NAMING: {}", other),
            };
        }
        if let Some(format) = lookup("RUNNER_FILES_FORMAT") {
            self.files_format = match format.to_lowercase().as_str() {
                "map" => FilesFormat::Map,
                "list" => FilesFormat::List,
                other => anyhow::bail!("Invalid RUNNER_FILES_FORMAT: {}", other),
            };
        }
        if let Some(flag) = lookup("RUNNER_EXTEND_PYTHONPATH") {
            self.extend_pythonpath = flag == "true" || flag == "1";
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.interpreter.is_empty() {
            anyhow::bail!("Interpreter command must not be empty");
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("Timeout must be greater than zero");
        }
        if self.max_body_bytes == 0 {
            anyhow::bail!("Max body size must be greater than zero");
        }
        if self.script_name.is_empty() || self.script_name.contains('/') {
            anyhow::bail!("Invalid script name: {:?}", self.script_name);
        }
        let escapes = self
            .output_dir
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            anyhow::bail!(
                "Output dir must be relative to the workspace: {}",
                self.output_dir.display()
            );
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

/// Global runner configuration
static RUNNER_CONFIG: OnceLock<RunnerConfig> = OnceLock::new();

/// Install the process-wide configuration
pub fn init_config(config: RunnerConfig) -> Result<()> {
    RUNNER_CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Runner configuration already initialized"))?;

    Ok(())
}

/// Get runner configuration
pub fn get_config() -> &'static RunnerConfig {
    RUNNER_CONFIG.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<RunnerConfig> = OnceLock::new();

        warn!("Runner configuration not initialized, using default");
        DEFAULT.get_or_init(RunnerConfig::default)
    })
}
