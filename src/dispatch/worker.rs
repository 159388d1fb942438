//! The worker seam.
//!
//! A worker is an external collaborator, typically a separate OS process,
//! that executes one [`TaskSpec`](crate::dispatch::task::TaskSpec) and
//! returns a result blob. Failure is a typed classification, not a string:
//! the recovery loop picks its strategy from the class alone.

use crate::dispatch::task::TaskSpec;
use crate::dispatch::verdict::GateVerdict;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Why a worker did not produce a usable result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkerFailure {
    /// An external capability errored or timed out
    #[error("tool failure: {0}")]
    Tool(String),

    /// The worker lacked information or ran on wrong assumptions
    #[error("context failure: {0}")]
    Context(String),

    /// The task was too large or hit a resource ceiling
    #[error("scope failure: {0}")]
    Scope(String),

    /// The worker stalled on an action its permission mode did not allow
    #[error("permission failure: stalled on {action}")]
    Permission { action: String },

    /// The worker stopped mid-task without failing; resumable
    #[error("interrupted after {progress}")]
    Interrupted { progress: String },
}

/// What a worker returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutcome {
    /// The result blob
    pub output: String,
    /// Parsed verdict line, present for gate-relevant dispatches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<GateVerdict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created_files: Vec<PathBuf>,
}

impl WorkerOutcome {
    pub fn from_output(output: &str) -> Self {
        Self {
            output: output.to_string(),
            verdict: GateVerdict::parse(output),
            created_files: GateVerdict::parse_created_files(output),
        }
    }
}

/// One external worker instance.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Execute the task from the beginning.
    async fn run(&self, task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure>;

    /// Continue an interrupted execution on the same instance. The default
    /// treats resume as a fresh run; workers that keep state override this.
    async fn resume(&self, task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
        self.run(task).await
    }
}
