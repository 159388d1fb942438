//! A worker backed by an external OS process.
//!
//! The task is serialized as JSON on the child's stdin; the result blob is
//! its stdout. Failure classification rides on the exit status and a
//! `class: message` prefix convention on stderr:
//!
//! ```text
//! context: the design doc moved
//! scope: diff exceeds budget
//! permission: rm -rf build/
//! interrupted: 2 of 5 sections drafted
//! ```
//!
//! Anything else (spawn errors, timeouts, unprefixed stderr) is a tool
//! failure.

use crate::dispatch::task::TaskSpec;
use crate::dispatch::worker::{Worker, WorkerFailure, WorkerOutcome};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Default ceiling on one worker invocation (30 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 1800;

pub struct ProcessWorker {
    cmd: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessWorker {
    pub fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn classify(status_code: Option<i32>, stderr: &str) -> WorkerFailure {
        let line = stderr.lines().next().unwrap_or("").trim();
        if let Some((class, message)) = line.split_once(':') {
            let message = message.trim().to_string();
            match class.trim() {
                "context" => return WorkerFailure::Context(message),
                "scope" => return WorkerFailure::Scope(message),
                "permission" => return WorkerFailure::Permission { action: message },
                "interrupted" => return WorkerFailure::Interrupted { progress: message },
                _ => {}
            }
        }
        WorkerFailure::Tool(format!(
            "worker exited with status {}: {line}",
            status_code.map_or_else(|| "signal".to_string(), |c| c.to_string())
        ))
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn run(&self, task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
        let payload = serde_json::to_string(task)
            .map_err(|e| WorkerFailure::Tool(format!("failed to encode task: {e}")))?;

        debug!(task = %task.id, cmd = %self.cmd, "spawning worker process");
        let mut child = Command::new(&self.cmd)
            .args(&self.args)
            .current_dir(&task.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out child must not outlive the dropped future
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerFailure::Tool(format!("failed to spawn {}: {e}", self.cmd)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| WorkerFailure::Tool(format!("failed to write task: {e}")))?;
            // Close stdin so the child sees EOF
            drop(stdin);
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                WorkerFailure::Tool(format!("worker timed out after {:?}", self.timeout))
            })?
            .map_err(|e| WorkerFailure::Tool(format!("failed to collect output: {e}")))?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(WorkerOutcome::from_output(&stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Self::classify(output.status.code(), &stderr))
        }
    }
}
