//! Per-invocation workspace
//!
//! Each invocation gets its own uniquely-named directory. The directory is
//! removed when the `Workspace` is released or dropped, whichever comes first.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::config::RunnerConfig;

const WORKSPACE_PREFIX: &str = "invocation-";

pub struct Workspace {
    dir: TempDir,
    output_dir: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace under the configured root
    pub fn acquire(config: &RunnerConfig) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        let dir = match &config.workspace_root {
            Some(root) => {
                std::fs::create_dir_all(root).with_context(|| {
                    format!("Failed to create workspace root {}", root.display())
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create workspace directory")?;

        let output_dir = dir.path().join(&config.output_dir);
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;

        debug!("Acquired workspace {}", dir.path().display());

        Ok(Self { dir, output_dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory whose files are reported as artifacts
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Remove the workspace. Removal errors are logged, never returned.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Released workspace {}", path.display()),
            Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(root: &Path) -> RunnerConfig {
        RunnerConfig {
            workspace_root: Some(root.to_path_buf()),
            ..RunnerConfig::default()
        }
    }

    #[test]
    fn test_acquire_and_release() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(&config_in(root.path())).unwrap();
        let path = workspace.path().to_path_buf();

        assert!(path.is_dir());
        assert!(path.starts_with(root.path()));
        std::fs::write(path.join("leftover.txt"), b"x").unwrap();
        std::fs::create_dir_all(path.join("nested/dir")).unwrap();

        workspace.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let workspace = Workspace::acquire(&config_in(root.path())).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_workspaces_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        let a = Workspace::acquire(&config).unwrap();
        let b = Workspace::acquire(&config).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_output_dir_created() {
        let root = tempfile::tempdir().unwrap();
        let config = RunnerConfig {
            output_dir: PathBuf::from("out"),
            ..config_in(root.path())
        };
        let workspace = Workspace::acquire(&config).unwrap();
        assert!(workspace.output_dir().is_dir());
        assert_eq!(workspace.output_dir(), workspace.path().join("out"));
    }

    #[test]
    fn test_release_tolerates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(&config_in(root.path())).unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();
        workspace.release();
    }
}
