//! Typed error hierarchy for the stagecraft orchestrator.
//!
//! Three top-level enums cover the three subsystems:
//! - `StateError` — project state store conflicts and invariant violations
//! - `WorkspaceError` — workspace naming collisions, dirty state, merge conflicts
//! - `DispatchError` — dispatch contract violations (retry exhaustion is
//!   reported separately as an `Escalation`, see `dispatch::recovery`)
//!
//! Gate failures are deliberately absent: a failed gate is the expected
//! outcome of an under-specified artifact and is recorded as structured
//! issues, never raised as an error.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the workflow state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Concurrent mutation detected for project {project}: {detail}")]
    Conflict { project: String, detail: String },

    #[error("Stage {stage} is already claimed by open work unit {existing}")]
    WorkUnitOverlap { stage: String, existing: String },

    #[error("Unknown stage {id}")]
    UnknownStage { id: String },

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Stage {id} is inconsistent: {detail}")]
    InconsistentStage { id: String, detail: String },

    #[error("Project {id} not found in {dir}")]
    ProjectNotFound { id: String, dir: PathBuf },

    #[error("Failed to serialize project state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the workspace isolation manager.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace or branch '{name}' already exists")]
    Conflict { name: String },

    #[error("Workspace '{name}' not found")]
    NotFound { name: String },

    #[error("Invalid workspace name '{name}'")]
    InvalidName { name: String },

    #[error("Workspace '{name}' has uncommitted changes: {}", files.join(", "))]
    DirtyWorkspace { name: String, files: Vec<String> },

    #[error("Merge of '{name}' hit conflicts in: {}", files.join(", "))]
    MergeConflict { name: String, files: Vec<String> },

    #[error("Repository has no trunk branch (expected 'main' or 'master')")]
    NoTrunk,

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the dispatch coordinator's contract checks.
///
/// These are caller-side contract violations detected before any worker
/// runs. Worker failures themselves are classified and retried by the
/// recovery loop, then surfaced as an `Escalation`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Task {task} requires interactive input, which async dispatch cannot provide")]
    InteractiveNotAllowed { task: String },

    #[error("Capability {capability} requires live session brokering and is unavailable to async workers")]
    CapabilityUnavailable { capability: String },

    #[error("Convergent review requires 2-4 reviewers, got {given}")]
    ReviewerCount { given: usize },

    #[error("Convergent review requires one angle per reviewer ({workers} workers, {angles} angles)")]
    AngleMismatch { workers: usize, angles: usize },

    #[error("Session handoff slot is occupied; a previous external operation is still in flight")]
    HandoffBusy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_error_overlap_carries_both_parties() {
        let err = StateError::WorkUnitOverlap {
            stage: "03-architecture".into(),
            existing: "wu-1".into(),
        };
        assert!(err.to_string().contains("03-architecture"));
        assert!(err.to_string().contains("wu-1"));
    }

    #[test]
    fn workspace_error_merge_conflict_lists_files() {
        let err = WorkspaceError::MergeConflict {
            name: "alpha".into(),
            files: vec!["src/a.rs".into(), "src/b.rs".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("src/a.rs"));
        assert!(msg.contains("src/b.rs"));
    }

    #[test]
    fn dispatch_error_reviewer_count_is_matchable() {
        let err = DispatchError::ReviewerCount { given: 5 };
        assert!(matches!(err, DispatchError::ReviewerCount { given: 5 }));
        assert!(err.to_string().contains('5'));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StateError::UnknownStage { id: "x".into() });
        assert_std_error(&WorkspaceError::NotFound { name: "x".into() });
        assert_std_error(&DispatchError::HandoffBusy);
    }
}
