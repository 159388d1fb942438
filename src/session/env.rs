//! Per-session environment records on a shared filesystem.
//!
//! Each record lives at `.stagecraft/sessions/<session_id>.json` under the
//! canonical root. Isolation is achieved purely by filename-keying: a
//! session only ever writes and reads its own keyed file, so no locking is
//! needed even though all records share one directory.

use crate::errors::StateError;
use crate::workspace::registry::{self, WorkspaceBinding};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ephemeral per-running-instance environment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnvironment {
    pub session_id: String,
    /// Canonical repository root
    pub root: PathBuf,
    /// Directory this session operates in: the root, or a workspace path
    pub active_dir: PathBuf,
    /// Workspace binding when one is in effect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<WorkspaceBinding>,
}

impl SessionEnvironment {
    /// Environment for the default (unnamed) workspace.
    pub fn at_root(session_id: &str, root: &Path) -> Self {
        Self {
            session_id: session_id.to_string(),
            root: root.to_path_buf(),
            active_dir: root.to_path_buf(),
            workspace: None,
        }
    }
}

pub struct SessionEnvManager {
    root: PathBuf,
    sessions_dir: PathBuf,
}

impl SessionEnvManager {
    pub fn new(root: &Path) -> Result<Self, StateError> {
        let sessions_dir = root.join(".stagecraft").join("sessions");
        fs::create_dir_all(&sessions_dir)?;
        Ok(Self {
            root: root.to_path_buf(),
            sessions_dir,
        })
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }

    /// Resolve and persist this session's environment. Idempotent: calling
    /// again with the same session id rewrites the same record.
    ///
    /// The active directory resolves to a workspace path when a binding
    /// marker exists at the root or when `cwd` is itself a linked worktree;
    /// otherwise it is the canonical root.
    pub fn on_session_start(
        &self,
        session_id: &str,
        cwd: &Path,
    ) -> Result<SessionEnvironment, StateError> {
        let mut env = SessionEnvironment::at_root(session_id, &self.root);
        if let Ok(Some(resolution)) = registry::resolve(&self.root, cwd) {
            env.active_dir = resolution.binding.path.clone();
            env.workspace = Some(resolution.binding);
        }
        self.write(&env)?;
        debug!(session = %session_id, dir = %env.active_dir.display(), "session environment resolved");
        Ok(env)
    }

    /// Re-resolve an existing session's environment, same rules as start.
    pub fn refresh(&self, session_id: &str, cwd: &Path) -> Result<SessionEnvironment, StateError> {
        self.on_session_start(session_id, cwd)
    }

    /// Bind a freshly created workspace to a live session so the new path
    /// takes effect without a restart.
    pub fn bind_workspace(
        &self,
        session_id: &str,
        binding: &WorkspaceBinding,
    ) -> Result<SessionEnvironment, StateError> {
        let mut env = self.load(session_id);
        env.active_dir = binding.path.clone();
        env.workspace = Some(binding.clone());
        self.write(&env)?;
        Ok(env)
    }

    /// Read this session's record.
    ///
    /// A missing or unreadable record falls back to the canonical root: the
    /// active-directory indirection is an optimization for parallel
    /// workspaces, not a correctness dependency for the default case.
    pub fn load(&self, session_id: &str) -> SessionEnvironment {
        let path = self.record_path(session_id);
        fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_else(|| SessionEnvironment::at_root(session_id, &self.root))
    }

    /// Delete this session's record. Other sessions' records are untouched.
    pub fn on_session_end(&self, session_id: &str) -> Result<(), StateError> {
        let path = self.record_path(session_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Redirect every live session bound to `workspace_name` back to the
    /// canonical root. Used when that workspace is closed.
    pub fn redirect_from_workspace(&self, workspace_name: &str) -> Result<usize, StateError> {
        let mut redirected = 0;
        for entry in fs::read_dir(&self.sessions_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(mut env) = serde_json::from_str::<SessionEnvironment>(&content) else {
                continue;
            };
            if env.workspace.as_ref().is_some_and(|w| w.name == workspace_name) {
                env.workspace = None;
                env.active_dir = self.root.clone();
                self.write(&env)?;
                redirected += 1;
            }
        }
        Ok(redirected)
    }

    fn write(&self, env: &SessionEnvironment) -> Result<(), StateError> {
        let path = self.record_path(&env.session_id);
        let content = serde_json::to_string_pretty(env)?;
        fs::write(&path, content)?;
        Ok(())
    }
}
