//! Artifact collection
//!
//! After a run completes, every regular file under the output root is read and
//! base64-encoded. Unreadable files produce a diagnostic line instead of
//! failing the invocation.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::outcome::Artifact;

/// How artifact names are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactNaming {
    /// Path relative to the output root, `/`-separated
    #[default]
    Relative,
    /// Bare file name
    Flat,
}

/// Result of a collection pass
#[derive(Debug, Default)]
pub struct Collected {
    pub artifacts: Vec<Artifact>,
    /// One line per file that could not be read
    pub diagnostics: Vec<String>,
}

impl Collected {
    /// Append diagnostics to captured stderr, one per line
    pub fn annotate_stderr(&self, stderr: &mut String) {
        for line in &self.diagnostics {
            stderr.push('\n');
            stderr.push_str(line);
        }
    }
}

struct Candidate {
    full_path: PathBuf,
    rel_path: String,
    /// Creation time where the filesystem records it, else modification time
    written: SystemTime,
}

/// Collect files under `root`, skipping `exclude`, in write order
pub fn collect_artifacts(
    root: &Path,
    exclude: &HashSet<PathBuf>,
    naming: ArtifactNaming,
) -> Collected {
    collect_artifacts_with(root, exclude, naming, |path| std::fs::read(path))
}

/// Same as [`collect_artifacts`], reading file contents through `read`
pub fn collect_artifacts_with<F>(
    root: &Path,
    exclude: &HashSet<PathBuf>,
    naming: ArtifactNaming,
    read: F,
) -> Collected
where
    F: Fn(&Path) -> io::Result<Vec<u8>>,
{
    let mut collected = Collected::default();
    let mut candidates = Vec::new();

    walk_dir(root, root, exclude, &mut candidates, &mut collected.diagnostics);
    order_candidates(&mut candidates);

    let mut seen = HashSet::new();
    for candidate in candidates {
        let name = match naming {
            ArtifactNaming::Relative => candidate.rel_path,
            ArtifactNaming::Flat => candidate
                .full_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(candidate.rel_path),
        };

        // Flat names can collide across directories; the first write wins
        if seen.contains(&name) {
            warn!(
                "Skipping {}: artifact name {} already taken",
                candidate.full_path.display(),
                name
            );
            collected.diagnostics.push(format!(
                "Duplicate artifact name {}: skipped {}",
                name,
                candidate.full_path.display()
            ));
            continue;
        }

        match read(&candidate.full_path) {
            Ok(bytes) => {
                seen.insert(name.clone());
                collected.artifacts.push(Artifact {
                    name,
                    content_base64: general_purpose::STANDARD.encode(&bytes),
                });
            }
            Err(e) => {
                warn!("Failed to read artifact {}: {}", candidate.full_path.display(), e);
                collected.diagnostics.push(format!(
                    "Error reading file {}: {}",
                    candidate.full_path.display(),
                    e
                ));
            }
        }
    }

    debug!(
        "Collected {} artifacts from {} ({} diagnostics)",
        collected.artifacts.len(),
        root.display(),
        collected.diagnostics.len()
    );

    collected
}

/// Oldest write first; equal timestamps fall back to the relative path
fn order_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.written
            .cmp(&b.written)
            .then_with(|| a.rel_path.cmp(&b.rel_path))
    });
}

fn walk_dir(
    dir: &Path,
    base: &Path,
    exclude: &HashSet<PathBuf>,
    out: &mut Vec<Candidate>,
    diagnostics: &mut Vec<String>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            diagnostics.push(format!("Error reading directory {}: {}", dir.display(), e));
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                diagnostics.push(format!("Error reading directory {}: {}", dir.display(), e));
                continue;
            }
        };
        let path = entry.path();
        if exclude.contains(&path) {
            continue;
        }

        // Symlinks are not followed
        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                diagnostics.push(format!("Error reading file {}: {}", path.display(), e));
                continue;
            }
        };

        if metadata.is_dir() {
            walk_dir(&path, base, exclude, out, diagnostics);
        } else if metadata.is_file() {
            let Ok(rel) = path.strip_prefix(base) else {
                continue;
            };
            let rel_path = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(Candidate {
                full_path: path.clone(),
                rel_path,
                written: write_time(&metadata),
            });
        }
    }
}

/// Creation time survives later appends, so it tracks the first write
fn write_time(metadata: &std::fs::Metadata) -> SystemTime {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
