//! Create, track, and tear down isolated parallel working copies.
//!
//! Each named workspace is a git branch plus a linked worktree bound to it.
//! The default (unnamed) workspace is the repository root itself and is
//! never destroyed. Lifecycle per workspace:
//! `absent -> active -> (merged | kept | deleted) -> absent`.

use crate::errors::WorkspaceError;
use crate::session::env::SessionEnvManager;
use crate::workspace::registry::{self, WorkspaceBinding};
use git2::build::CheckoutBuilder;
use git2::{
    BranchType, IndexAddOption, Repository, Signature, StatusOptions, WorktreeAddOptions,
    WorktreePruneOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// What to do with uncommitted changes when closing a workspace.
///
/// There is no default: a dirty workspace requires an explicit choice, and
/// `Abort` never discards work.
#[derive(Debug, Clone, PartialEq)]
pub enum DirtyDisposition {
    /// Commit everything in the workspace before closing
    Commit { message: String },
    /// Throw the uncommitted changes away
    Discard,
    /// Refuse to close
    Abort,
}

/// What to do with the workspace branch when closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchDisposition {
    /// Merge the branch into the trunk
    Merge,
    /// Leave the branch as-is
    Keep,
    /// Delete the branch
    Delete,
}

/// One known workspace, annotated with its clean/dirty status.
#[derive(Debug, Clone)]
pub struct WorkspaceInfo {
    pub name: String,
    pub branch: String,
    pub path: PathBuf,
    pub dirty: bool,
}

/// What `close` actually did.
#[derive(Debug, Clone, Default)]
pub struct CloseOutcome {
    pub merged: bool,
    pub branch_deleted: bool,
    pub dir_removed: bool,
    /// Directory removal was deferred because the calling process is
    /// currently inside the workspace being closed.
    pub removal_deferred: bool,
    /// A requested branch deletion was deferred along with the directory;
    /// re-run close after leaving the workspace.
    pub branch_deletion_deferred: bool,
}

pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Open the manager over the shared repository at `root`.
    pub fn new(root: &Path) -> Result<Self, WorkspaceError> {
        Repository::open(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Normalize a requested name to a safe identifier.
    pub fn normalize_name(name: &str) -> Result<String, WorkspaceError> {
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .trim_matches('-')
            .to_string();
        if slug.is_empty() {
            return Err(WorkspaceError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(slug)
    }

    fn worktree_dir(&self, slug: &str) -> PathBuf {
        self.root.join(".stagecraft").join("worktrees").join(slug)
    }

    fn branch_name(slug: &str) -> String {
        format!("ws/{slug}")
    }

    /// Create a new workspace: branch, worktree directory, binding marker.
    ///
    /// The calling session's environment record is refreshed immediately so
    /// the new path takes effect without a restart.
    pub fn create(
        &self,
        name: &str,
        sessions: &SessionEnvManager,
        session_id: &str,
    ) -> Result<WorkspaceBinding, WorkspaceError> {
        let slug = Self::normalize_name(name)?;
        let branch_name = Self::branch_name(&slug);
        let repo = Repository::open(&self.root)?;

        if repo.find_branch(&branch_name, BranchType::Local).is_ok()
            || repo.find_worktree(&slug).is_ok()
        {
            return Err(WorkspaceError::Conflict { name: slug });
        }

        let head = repo.head()?.peel_to_commit()?;
        let branch = repo.branch(&branch_name, &head, false)?;
        let reference = branch.into_reference();

        let path = self.worktree_dir(&slug);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        repo.worktree(&slug, &path, Some(&opts))?;

        let binding = WorkspaceBinding {
            name: slug.clone(),
            branch: branch_name,
            path,
        };
        registry::write_marker(&self.root, &binding)?;
        sessions
            .bind_workspace(session_id, &binding)
            .map_err(|e| WorkspaceError::Io(std::io::Error::other(e)))?;

        info!(workspace = %slug, branch = %binding.branch, "workspace created");
        Ok(binding)
    }

    /// Enumerate all workspaces known to the repository. Read-only.
    pub fn list(&self) -> Result<Vec<WorkspaceInfo>, WorkspaceError> {
        let repo = Repository::open(&self.root)?;
        let mut infos = Vec::new();
        for name in repo.worktrees()?.iter().flatten() {
            let wt = repo.find_worktree(name)?;
            let path = wt.path().to_path_buf();
            let Ok(ws_repo) = Repository::open(&path) else {
                continue;
            };
            let branch = ws_repo
                .head()
                .ok()
                .and_then(|h| h.shorthand().map(|s| s.to_string()))
                .unwrap_or_default();
            infos.push(WorkspaceInfo {
                name: name.to_string(),
                branch,
                path: path.clone(),
                dirty: !Self::dirty_files(&ws_repo)?.is_empty(),
            });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    fn dirty_files(repo: &Repository) -> Result<Vec<String>, WorkspaceError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(statuses
            .iter()
            .filter_map(|e| e.path().map(|p| p.to_string()))
            .collect())
    }

    /// Close a workspace.
    ///
    /// Uncommitted changes require an explicit disposition; unresolved merge
    /// conflicts are surfaced per-file and never silently discarded. Any
    /// live session bound to this workspace is redirected back to the root.
    pub fn close(
        &self,
        name: &str,
        dirty: DirtyDisposition,
        branch: BranchDisposition,
        sessions: &SessionEnvManager,
    ) -> Result<CloseOutcome, WorkspaceError> {
        let slug = Self::normalize_name(name)?;
        let repo = Repository::open(&self.root)?;
        let wt = repo
            .find_worktree(&slug)
            .map_err(|_| WorkspaceError::NotFound { name: slug.clone() })?;
        let path = wt.path().to_path_buf();
        let ws_repo = Repository::open(&path)?;

        let files = Self::dirty_files(&ws_repo)?;
        if !files.is_empty() {
            match dirty {
                DirtyDisposition::Abort => {
                    return Err(WorkspaceError::DirtyWorkspace { name: slug, files });
                }
                DirtyDisposition::Commit { ref message } => {
                    Self::commit_all(&ws_repo, message)?;
                }
                DirtyDisposition::Discard => {
                    let mut checkout = CheckoutBuilder::new();
                    checkout.force().remove_untracked(true);
                    ws_repo.checkout_head(Some(&mut checkout))?;
                }
            }
        }

        let mut outcome = CloseOutcome::default();
        let branch_name = Self::branch_name(&slug);

        if branch == BranchDisposition::Merge {
            self.merge_into_trunk(&repo, &slug, &branch_name)?;
            outcome.merged = true;
        }

        // Many filesystems refuse to remove a process's current directory;
        // removal is deferred when the caller is inside the workspace.
        let inside = std::env::current_dir()
            .map(|d| d.starts_with(&path))
            .unwrap_or(false);
        if inside {
            outcome.removal_deferred = true;
            if branch == BranchDisposition::Delete {
                outcome.branch_deletion_deferred = true;
            }
        } else {
            let mut prune = WorktreePruneOptions::new();
            prune.valid(true).working_tree(true);
            wt.prune(Some(&mut prune))?;
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
            outcome.dir_removed = true;

            if branch == BranchDisposition::Delete {
                let mut br = repo.find_branch(&branch_name, BranchType::Local)?;
                br.delete()?;
                outcome.branch_deleted = true;
            }
        }

        if let Some(marker) = registry::read_marker(&self.root)?
            && marker.name == slug
        {
            registry::remove_marker(&self.root)?;
        }
        sessions
            .redirect_from_workspace(&slug)
            .map_err(|e| WorkspaceError::Io(std::io::Error::other(e)))?;

        info!(workspace = %slug, ?outcome, "workspace closed");
        Ok(outcome)
    }

    fn commit_all(repo: &Repository, message: &str) -> Result<(), WorkspaceError> {
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Signature::now("stagecraft", "stagecraft@localhost")?;
        let parent = repo.head()?.peel_to_commit()?;
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
        Ok(())
    }

    fn merge_into_trunk(
        &self,
        repo: &Repository,
        slug: &str,
        branch_name: &str,
    ) -> Result<(), WorkspaceError> {
        let trunk = repo
            .find_branch("main", BranchType::Local)
            .or_else(|_| repo.find_branch("master", BranchType::Local))
            .map_err(|_| WorkspaceError::NoTrunk)?;
        let trunk_ref = trunk
            .get()
            .name()
            .ok_or(WorkspaceError::NoTrunk)?
            .to_string();
        let our = trunk.get().peel_to_commit()?;
        let their = repo
            .find_branch(branch_name, BranchType::Local)?
            .get()
            .peel_to_commit()?;

        if their.id() == our.id() {
            // Nothing to merge
            return Ok(());
        }

        let mut index = repo.merge_commits(&our, &their, None)?;
        if index.has_conflicts() {
            let files: Vec<String> = index
                .conflicts()?
                .flatten()
                .filter_map(|c| {
                    c.our
                        .or(c.their)
                        .map(|e| String::from_utf8_lossy(&e.path).to_string())
                })
                .collect();
            return Err(WorkspaceError::MergeConflict {
                name: slug.to_string(),
                files,
            });
        }

        let tree_id = index.write_tree_to(repo)?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Signature::now("stagecraft", "stagecraft@localhost")?;
        repo.commit(
            Some(&trunk_ref),
            &sig,
            &sig,
            &format!("Merge workspace '{slug}'"),
            &tree,
            &[&our, &their],
        )?;
        Ok(())
    }
}
