//! Workspace binding resolution.
//!
//! Two strategies, queried in priority order:
//! 1. `Explicit` — a binding marker file at the canonical root, written when
//!    a workspace was created mid-session.
//! 2. `Inferred` — the current directory is itself a secondary working copy
//!    (a linked git worktree) of the shared repository, which happens when a
//!    session was started already inside one.

use crate::errors::WorkspaceError;
use git2::Repository;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The binding marker record `{name, branch, path}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceBinding {
    pub name: String,
    pub branch: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    Explicit,
    Inferred,
}

/// A resolved workspace binding and how it was found.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub strategy: ResolutionStrategy,
    pub binding: WorkspaceBinding,
}

/// Path of the binding marker under the canonical root.
pub fn marker_path(root: &Path) -> PathBuf {
    root.join(".stagecraft").join("workspace.json")
}

/// Read the binding marker, if present.
pub fn read_marker(root: &Path) -> Result<Option<WorkspaceBinding>, WorkspaceError> {
    let path = marker_path(root);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let binding = serde_json::from_str(&content)
        .map_err(|e| WorkspaceError::Io(std::io::Error::other(e)))?;
    Ok(Some(binding))
}

/// Write the binding marker at the canonical root.
pub fn write_marker(root: &Path, binding: &WorkspaceBinding) -> Result<(), WorkspaceError> {
    let path = marker_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(binding)
        .map_err(|e| WorkspaceError::Io(std::io::Error::other(e)))?;
    fs::write(&path, content)?;
    Ok(())
}

/// Remove the binding marker. Missing marker is not an error.
pub fn remove_marker(root: &Path) -> Result<(), WorkspaceError> {
    let path = marker_path(root);
    if path.exists() {
        fs::remove_file(&path)?;
    }
    Ok(())
}

/// Resolve the workspace binding for a session rooted at `root` whose
/// current directory is `cwd`. Returns `None` for the default workspace.
pub fn resolve(root: &Path, cwd: &Path) -> Result<Option<Resolution>, WorkspaceError> {
    // Explicit marker wins.
    if let Some(binding) = read_marker(root)? {
        return Ok(Some(Resolution {
            strategy: ResolutionStrategy::Explicit,
            binding,
        }));
    }

    // Otherwise infer from the working directory being a linked worktree.
    if cwd != root
        && let Ok(repo) = Repository::open(cwd)
        && repo.is_worktree()
    {
        let name = cwd
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("workspace")
            .to_string();
        let branch = repo
            .head()
            .ok()
            .and_then(|h| h.shorthand().map(|s| s.to_string()))
            .unwrap_or_else(|| name.clone());
        return Ok(Some(Resolution {
            strategy: ResolutionStrategy::Inferred,
            binding: WorkspaceBinding {
                name,
                branch,
                path: cwd.to_path_buf(),
            },
        }));
    }

    Ok(None)
}
