//! The task contract handed to a worker.
//!
//! A task description is self-contained: working path, primary artifact
//! paths, explicit constraints, and the expected output location/format.
//! The worker sees nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// How much a worker is allowed to do without asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Every state-changing action requires approval
    Strict,
    /// Routine edits allowed, destructive actions require approval
    Standard,
    /// No approval prompts
    Autonomous,
    /// No state-changing actions at all
    Readonly,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Strict => "strict",
            PermissionMode::Standard => "standard",
            PermissionMode::Autonomous => "autonomous",
            PermissionMode::Readonly => "readonly",
        }
    }

    /// The next less-restrictive mode, used by permission-failure recovery.
    /// `Autonomous` has nowhere left to go and stays put.
    pub fn relax(&self) -> PermissionMode {
        match self {
            PermissionMode::Strict => PermissionMode::Standard,
            PermissionMode::Standard => PermissionMode::Autonomous,
            PermissionMode::Autonomous => PermissionMode::Autonomous,
            PermissionMode::Readonly => PermissionMode::Standard,
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(PermissionMode::Strict),
            "standard" => Ok(PermissionMode::Standard),
            "autonomous" => Ok(PermissionMode::Autonomous),
            "readonly" => Ok(PermissionMode::Readonly),
            other => Err(format!("unknown permission mode: {other}")),
        }
    }
}

/// Capability classes a task may require from its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FileEdit,
    CommandExecution,
    NetworkAccess,
    /// Live brokering of an external interpreter session. Categorically
    /// unavailable to asynchronously dispatched workers.
    SessionBrokering,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::FileEdit => "file_edit",
            Capability::CommandExecution => "command_execution",
            Capability::NetworkAccess => "network_access",
            Capability::SessionBrokering => "session_brokering",
        }
    }

    /// Whether this capability can be granted to a worker the caller is not
    /// watching.
    pub fn available_async(&self) -> bool {
        !matches!(self, Capability::SessionBrokering)
    }
}

/// A self-contained unit of work for one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    /// Directory the worker operates in
    pub working_dir: PathBuf,
    /// Primary artifact paths the task concerns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
    /// Explicit constraints the worker must honor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    /// Where and in what form the result is expected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    pub permission_mode: PermissionMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
    /// Whether the worker may ask the caller questions mid-task
    #[serde(default)]
    pub interactive: bool,
    /// Auto-deny any would-be permission prompt instead of surfacing it.
    /// Forced on for asynchronous dispatch.
    #[serde(default)]
    pub auto_deny_prompts: bool,
}

impl TaskSpec {
    pub fn new(description: &str, working_dir: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            working_dir,
            artifacts: Vec::new(),
            constraints: Vec::new(),
            expected_output: None,
            permission_mode: PermissionMode::Standard,
            capabilities: Vec::new(),
            interactive: false,
            auto_deny_prompts: false,
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_constraint(mut self, constraint: &str) -> Self {
        self.constraints.push(constraint.to_string());
        self
    }

    pub fn with_expected_output(mut self, expected: &str) -> Self {
        self.expected_output = Some(expected.to_string());
        self
    }

    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Whether any requested capability is unavailable off the caller's
    /// thread of attention.
    pub fn needs_live_session(&self) -> bool {
        self.capabilities.iter().any(|c| !c.available_async())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_mode_roundtrip() {
        for mode in [
            PermissionMode::Strict,
            PermissionMode::Standard,
            PermissionMode::Autonomous,
            PermissionMode::Readonly,
        ] {
            assert_eq!(mode.as_str().parse::<PermissionMode>().unwrap(), mode);
        }
        assert!("yolo".parse::<PermissionMode>().is_err());
    }

    #[test]
    fn test_relax_ladder() {
        assert_eq!(PermissionMode::Strict.relax(), PermissionMode::Standard);
        assert_eq!(PermissionMode::Standard.relax(), PermissionMode::Autonomous);
        assert_eq!(
            PermissionMode::Autonomous.relax(),
            PermissionMode::Autonomous
        );
        assert_eq!(PermissionMode::Readonly.relax(), PermissionMode::Standard);
    }

    #[test]
    fn test_task_builders() {
        let task = TaskSpec::new("review the requirements doc", PathBuf::from("/work"))
            .with_artifacts(vec![PathBuf::from("docs/requirements.md")])
            .with_constraint("do not edit files outside docs/")
            .with_expected_output("verdict line on stdout")
            .with_permission_mode(PermissionMode::Readonly);
        assert!(!task.id.is_empty());
        assert_eq!(task.artifacts.len(), 1);
        assert_eq!(task.constraints.len(), 1);
        assert_eq!(task.permission_mode, PermissionMode::Readonly);
        assert!(!task.interactive);
    }

    #[test]
    fn test_needs_live_session() {
        let task = TaskSpec::new("t", PathBuf::from("/w"))
            .with_capabilities(vec![Capability::FileEdit, Capability::SessionBrokering]);
        assert!(task.needs_live_session());

        let task = TaskSpec::new("t", PathBuf::from("/w"))
            .with_capabilities(vec![Capability::FileEdit, Capability::CommandExecution]);
        assert!(!task.needs_live_session());
    }
}
