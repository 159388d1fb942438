//! Bounded failure recovery around a single task.
//!
//! Every failure is classified, the matching recovery is applied, and the
//! task is re-evaluated. After the initial attempt plus three retries the
//! coordinator stops and escalates with a record of every attempted
//! approach. It never loops indefinitely on one task.

use crate::dispatch::task::TaskSpec;
use crate::dispatch::worker::{Worker, WorkerFailure, WorkerOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Retries after the initial attempt; 4 evaluations total.
pub const MAX_RETRIES: u32 = 3;

/// The five failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Tool,
    Context,
    Scope,
    Permission,
    Interruption,
}

impl FailureClass {
    pub fn classify(failure: &WorkerFailure) -> FailureClass {
        match failure {
            WorkerFailure::Tool(_) => FailureClass::Tool,
            WorkerFailure::Context(_) => FailureClass::Context,
            WorkerFailure::Scope(_) => FailureClass::Scope,
            WorkerFailure::Permission { .. } => FailureClass::Permission,
            WorkerFailure::Interrupted { .. } => FailureClass::Interruption,
        }
    }

    /// The recovery this class calls for.
    pub fn recovery(&self) -> RecoveryAction {
        match self {
            FailureClass::Tool => RecoveryAction::RetryUnchanged,
            FailureClass::Context => RecoveryAction::EnrichContext,
            FailureClass::Scope => RecoveryAction::SplitTask,
            FailureClass::Permission => RecoveryAction::RelaxPermissions,
            FailureClass::Interruption => RecoveryAction::ResumeWorker,
        }
    }
}

/// What the recovery loop does to the task before re-evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// The external failure was transient; same task again
    RetryUnchanged,
    /// Fold the failure detail into the task description
    EnrichContext,
    /// Narrow the task to a first coherent portion, deferring the rest
    SplitTask,
    /// Move to the next less-restrictive permission mode
    RelaxPermissions,
    /// Continue the same worker instance instead of restarting
    ResumeWorker,
}

/// One failed evaluation and the recovery applied after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based evaluation number
    pub evaluation: u32,
    pub class: FailureClass,
    pub action: RecoveryAction,
    pub detail: String,
}

/// A task the coordinator gave up on, with every attempted approach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub task_id: String,
    pub attempts: Vec<AttemptRecord>,
}

impl fmt::Display for Escalation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "task {} escalated after {} evaluations:",
            self.task_id,
            self.attempts.len()
        )?;
        for a in &self.attempts {
            writeln!(
                f,
                "  #{} {:?} -> {:?}: {}",
                a.evaluation, a.class, a.action, a.detail
            )?;
        }
        Ok(())
    }
}

/// A task that eventually succeeded, with its recovery history.
#[derive(Debug)]
pub struct RecoveryOutcome {
    pub outcome: WorkerOutcome,
    pub attempts: Vec<AttemptRecord>,
    /// Total evaluations including the successful one
    pub evaluations: u32,
}

fn apply_recovery(task: &mut TaskSpec, action: RecoveryAction, detail: &str) {
    match action {
        RecoveryAction::RetryUnchanged | RecoveryAction::ResumeWorker => {}
        RecoveryAction::EnrichContext => {
            task.description = format!(
                "{}\n\nA prior attempt failed for lack of context: {detail}. \
                 Account for this before proceeding.",
                task.description
            );
        }
        RecoveryAction::SplitTask => {
            task.description = format!(
                "{}\n\nA prior attempt hit a resource ceiling ({detail}). \
                 Complete only the first coherent portion of this task and \
                 report exactly what remains.",
                task.description
            );
        }
        RecoveryAction::RelaxPermissions => {
            task.permission_mode = task.permission_mode.relax();
        }
    }
}

/// Evaluate `task` against `worker` under the bounded recovery policy.
pub async fn run_with_recovery(
    worker: &dyn Worker,
    task: TaskSpec,
) -> Result<RecoveryOutcome, Escalation> {
    let mut task = task;
    let mut attempts: Vec<AttemptRecord> = Vec::new();
    let mut resume_next = false;

    for evaluation in 1..=(1 + MAX_RETRIES) {
        let result = if resume_next {
            worker.resume(&task).await
        } else {
            worker.run(&task).await
        };

        match result {
            Ok(outcome) => {
                return Ok(RecoveryOutcome {
                    outcome,
                    attempts,
                    evaluations: evaluation,
                });
            }
            Err(failure) => {
                let class = FailureClass::classify(&failure);
                let action = class.recovery();
                warn!(
                    task = %task.id,
                    evaluation,
                    ?class,
                    ?action,
                    detail = %failure,
                    "worker evaluation failed"
                );
                attempts.push(AttemptRecord {
                    evaluation,
                    class,
                    action,
                    detail: failure.to_string(),
                });
                resume_next = action == RecoveryAction::ResumeWorker;
                apply_recovery(&mut task, action, &failure.to_string());
            }
        }
    }

    Err(Escalation {
        task_id: task.id.clone(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::task::PermissionMode;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFails {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Worker for AlwaysFails {
        async fn run(&self, _task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(WorkerFailure::Tool("network down".into()))
        }
    }

    struct FailsThenSucceeds {
        failures_left: AtomicU32,
        seen_tasks: Mutex<Vec<TaskSpec>>,
        failure: WorkerFailure,
        resumes: AtomicU32,
    }

    impl FailsThenSucceeds {
        fn new(failures: u32, failure: WorkerFailure) -> Self {
            Self {
                failures_left: AtomicU32::new(failures),
                seen_tasks: Mutex::new(Vec::new()),
                failure,
                resumes: AtomicU32::new(0),
            }
        }

        fn attempt(&self, task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
            self.seen_tasks.lock().unwrap().push(task.clone());
            if self.failures_left.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(self.failure.clone())
            } else {
                Ok(WorkerOutcome::from_output("done"))
            }
        }
    }

    #[async_trait]
    impl Worker for FailsThenSucceeds {
        async fn run(&self, task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
            self.attempt(task)
        }

        async fn resume(&self, task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
            self.resumes.fetch_add(1, Ordering::SeqCst);
            self.attempt(task)
        }
    }

    fn task() -> TaskSpec {
        TaskSpec::new("draft the architecture overview", PathBuf::from("/work"))
    }

    #[tokio::test]
    async fn test_escalates_on_exactly_the_fourth_evaluation() {
        let worker = AlwaysFails {
            calls: AtomicU32::new(0),
        };
        let escalation = run_with_recovery(&worker, task()).await.unwrap_err();
        assert_eq!(worker.calls.load(Ordering::SeqCst), 4);
        assert_eq!(escalation.attempts.len(), 4);
        assert_eq!(escalation.attempts[3].evaluation, 4);
        assert!(escalation.to_string().contains("after 4 evaluations"));
    }

    #[tokio::test]
    async fn test_succeeds_within_retry_budget() {
        let worker = FailsThenSucceeds::new(2, WorkerFailure::Tool("flaky".into()));
        let result = run_with_recovery(&worker, task()).await.unwrap();
        assert_eq!(result.evaluations, 3);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.outcome.output, "done");
    }

    #[tokio::test]
    async fn test_context_failure_enriches_description() {
        let worker = FailsThenSucceeds::new(
            1,
            WorkerFailure::Context("the design doc moved to docs/adr".into()),
        );
        run_with_recovery(&worker, task()).await.unwrap();

        let seen = worker.seen_tasks.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(!seen[0].description.contains("docs/adr"));
        assert!(seen[1].description.contains("the design doc moved to docs/adr"));
    }

    #[tokio::test]
    async fn test_permission_failure_relaxes_mode() {
        let worker = FailsThenSucceeds::new(
            1,
            WorkerFailure::Permission {
                action: "write docs/".into(),
            },
        );
        let strict = task().with_permission_mode(PermissionMode::Strict);
        run_with_recovery(&worker, strict).await.unwrap();

        let seen = worker.seen_tasks.lock().unwrap();
        assert_eq!(seen[0].permission_mode, PermissionMode::Strict);
        assert_eq!(seen[1].permission_mode, PermissionMode::Standard);
    }

    #[tokio::test]
    async fn test_interruption_resumes_same_worker() {
        let worker = FailsThenSucceeds::new(
            1,
            WorkerFailure::Interrupted {
                progress: "2 of 5 sections drafted".into(),
            },
        );
        run_with_recovery(&worker, task()).await.unwrap();
        assert_eq!(worker.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_classification_covers_every_variant() {
        assert_eq!(
            FailureClass::classify(&WorkerFailure::Tool("t".into())),
            FailureClass::Tool
        );
        assert_eq!(
            FailureClass::classify(&WorkerFailure::Scope("s".into())),
            FailureClass::Scope
        );
        assert_eq!(FailureClass::Scope.recovery(), RecoveryAction::SplitTask);
        assert_eq!(
            FailureClass::Interruption.recovery(),
            RecoveryAction::ResumeWorker
        );
    }
}
