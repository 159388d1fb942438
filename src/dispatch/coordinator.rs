//! The dispatch coordinator: five patterns over the worker seam.
//!
//! Pattern choice is a decision driven by data dependency and interactivity,
//! not a fixed rule:
//! - synchronous single: caller blocks, result needed before proceeding
//! - asynchronous single: caller continues and polls; no mid-task questions
//! - parallel fan-out: independent workers dispatched together
//! - sequential chain: each step sees only a distilled summary of the last
//! - convergent review: same artifact, different angles, no cross-visibility
//!
//! Every pattern runs its members under the bounded recovery loop. Each
//! pattern invocation first delivers a pre-external-operation lifecycle
//! event for the invoking session and, when a handoff slot is wired in,
//! publishes its session id there, so the external interpreter adapter can
//! attribute the operation.

use crate::dispatch::recovery::{AttemptRecord, Escalation, FailureClass, RecoveryAction,
    RecoveryOutcome, run_with_recovery};
use crate::dispatch::task::TaskSpec;
use crate::dispatch::worker::Worker;
use crate::errors::DispatchError;
use crate::gate::criteria::GateDecision;
use crate::session::events::{SessionEvent, SessionHookEvent};
use crate::session::handoff::SessionHandoff;
use futures::FutureExt;
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Per-task outcome: a result with its recovery history, or an escalation.
pub type TaskResult = Result<RecoveryOutcome, Escalation>;

/// One step of a sequential chain.
pub struct ChainStep {
    pub worker: Arc<dyn Worker>,
    pub task: TaskSpec,
}

/// One reviewer's perspective in a convergent review.
#[derive(Debug, Clone)]
pub struct ReviewAngle {
    pub name: String,
    pub instructions: String,
}

impl ReviewAngle {
    pub fn new(name: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

/// All perspectives from one convergent review, for caller synthesis.
#[derive(Debug)]
pub struct ConvergentReview {
    pub outcomes: Vec<(ReviewAngle, TaskResult)>,
}

impl ConvergentReview {
    /// Gate decisions per angle, where a reviewer produced one.
    pub fn decisions(&self) -> Vec<(&str, Option<GateDecision>)> {
        self.outcomes
            .iter()
            .map(|(angle, result)| {
                let decision = result
                    .as_ref()
                    .ok()
                    .and_then(|r| r.outcome.verdict.as_ref())
                    .map(|v| v.decision);
                (angle.name.as_str(), decision)
            })
            .collect()
    }

    /// The shared decision when every reviewer reported the same one.
    pub fn unanimous(&self) -> Option<GateDecision> {
        let decisions: Vec<GateDecision> = self
            .outcomes
            .iter()
            .filter_map(|(_, r)| {
                r.as_ref()
                    .ok()
                    .and_then(|o| o.outcome.verdict.as_ref())
                    .map(|v| v.decision)
            })
            .collect();
        match decisions.as_slice() {
            [] => None,
            [first, rest @ ..] if rest.iter().all(|d| d == first) => Some(*first),
            _ => None,
        }
    }
}

/// Handle to an asynchronously dispatched worker.
///
/// There is no push notification: the caller polls with [`poll`] or blocks
/// with [`join`].
///
/// [`poll`]: AsyncDispatch::poll
/// [`join`]: AsyncDispatch::join
#[derive(Debug)]
pub struct AsyncDispatch {
    pub task_id: String,
    handle: Option<JoinHandle<TaskResult>>,
    result: Option<TaskResult>,
}

impl AsyncDispatch {
    /// Non-blocking completion check. Returns the result once the worker
    /// has finished, `None` while it is still running.
    pub fn poll(&mut self) -> Option<&TaskResult> {
        if self.result.is_none()
            && let Some(handle) = self.handle.take()
        {
            if handle.is_finished() {
                if let Some(joined) = handle.now_or_never() {
                    self.result = Some(flatten_join(&self.task_id, joined));
                }
            } else {
                self.handle = Some(handle);
            }
        }
        self.result.as_ref()
    }

    /// Block until the worker finishes.
    pub async fn join(mut self) -> TaskResult {
        if let Some(result) = self.result.take() {
            return result;
        }
        match self.handle.take() {
            Some(handle) => flatten_join(&self.task_id, handle.await),
            None => unreachable!("async dispatch has either a handle or a result"),
        }
    }
}

fn flatten_join(task_id: &str, joined: Result<TaskResult, tokio::task::JoinError>) -> TaskResult {
    joined.unwrap_or_else(|e| {
        Err(Escalation {
            task_id: task_id.to_string(),
            attempts: vec![AttemptRecord {
                evaluation: 0,
                class: FailureClass::Tool,
                action: RecoveryAction::RetryUnchanged,
                detail: format!("worker task aborted: {e}"),
            }],
        })
    })
}

pub struct Coordinator {
    session_id: String,
    handoff: Option<Arc<SessionHandoff>>,
}

impl Coordinator {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            handoff: None,
        }
    }

    /// Wire in the handoff slot read by the external interpreter adapter.
    pub fn with_handoff(mut self, handoff: Arc<SessionHandoff>) -> Self {
        self.handoff = Some(handoff);
        self
    }

    /// Deliver the pre-external-operation lifecycle event and publish our
    /// session id immediately before an external operation.
    fn announce(&self) -> Result<SessionEvent, DispatchError> {
        let event = SessionEvent::new(&self.session_id, SessionHookEvent::PreExternalOperation);
        info!(
            session = %event.session_id,
            hook_event = %event.hook_event_name,
            timestamp = %event.timestamp.to_rfc3339(),
            "external operation starting"
        );
        if let Some(handoff) = &self.handoff {
            handoff.publish(&self.session_id)?;
        }
        Ok(event)
    }

    /// Synchronous single dispatch: block until the worker returns.
    pub async fn dispatch_sync(
        &self,
        worker: Arc<dyn Worker>,
        task: TaskSpec,
    ) -> Result<TaskResult, DispatchError> {
        self.announce()?;
        debug!(task = %task.id, "synchronous dispatch");
        Ok(run_with_recovery(worker.as_ref(), task).await)
    }

    /// Asynchronous single dispatch: the caller continues and polls later.
    ///
    /// The worker cannot ask questions mid-task and any would-be permission
    /// prompt is auto-denied, so interactive tasks and capabilities that
    /// need live session brokering are rejected up front.
    pub fn dispatch_async(
        &self,
        worker: Arc<dyn Worker>,
        mut task: TaskSpec,
    ) -> Result<AsyncDispatch, DispatchError> {
        if task.interactive {
            return Err(DispatchError::InteractiveNotAllowed {
                task: task.id.clone(),
            });
        }
        if let Some(capability) = task.capabilities.iter().find(|c| !c.available_async()) {
            return Err(DispatchError::CapabilityUnavailable {
                capability: capability.as_str().to_string(),
            });
        }
        self.announce()?;
        task.auto_deny_prompts = true;

        let task_id = task.id.clone();
        debug!(task = %task_id, "asynchronous dispatch");
        let handle = tokio::spawn(async move { run_with_recovery(worker.as_ref(), task).await });
        Ok(AsyncDispatch {
            task_id,
            handle: Some(handle),
            result: None,
        })
    }

    /// Parallel fan-out: all members dispatched before awaiting any, and the
    /// full set is awaited before returning.
    ///
    /// The contract that no two members target the same mutable artifact and
    /// none depends on another's output is the caller's to uphold; it is not
    /// generically detectable here.
    pub async fn dispatch_parallel(
        &self,
        members: Vec<(Arc<dyn Worker>, TaskSpec)>,
    ) -> Result<Vec<TaskResult>, DispatchError> {
        self.announce()?;
        info!(members = members.len(), "parallel fan-out dispatch");
        let futures = members
            .into_iter()
            .map(|(worker, task)| async move { run_with_recovery(worker.as_ref(), task).await });
        Ok(join_all(futures).await)
    }

    /// Sequential chain: each step's task is composed from a distilled
    /// summary of the previous step's result, never its raw output. Stops
    /// at the first escalation; completed steps' results are still returned.
    pub async fn dispatch_chain(
        &self,
        steps: Vec<ChainStep>,
        summarize: impl Fn(&RecoveryOutcome) -> String,
    ) -> Result<Vec<TaskResult>, DispatchError> {
        self.announce()?;
        let mut results: Vec<TaskResult> = Vec::with_capacity(steps.len());
        let mut carried_summary: Option<String> = None;

        for step in steps {
            let mut task = step.task;
            if let Some(summary) = &carried_summary {
                task.description = format!(
                    "{}\n\nSummary of the previous step's result: {summary}",
                    task.description
                );
            }
            debug!(task = %task.id, "chain step dispatch");
            let result = run_with_recovery(step.worker.as_ref(), task).await;
            match result {
                Ok(outcome) => {
                    carried_summary = Some(summarize(&outcome));
                    results.push(Ok(outcome));
                }
                Err(escalation) => {
                    results.push(Err(escalation));
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Convergent review: 2-4 workers receive the same input artifact but
    /// different review angles, with no visibility into each other. The
    /// caller synthesizes agreement afterward; one reviewer's output is
    /// never forwarded into another's input.
    pub async fn dispatch_convergent(
        &self,
        workers: Vec<Arc<dyn Worker>>,
        base_task: TaskSpec,
        angles: Vec<ReviewAngle>,
    ) -> Result<ConvergentReview, DispatchError> {
        if !(2..=4).contains(&workers.len()) {
            return Err(DispatchError::ReviewerCount {
                given: workers.len(),
            });
        }
        if workers.len() != angles.len() {
            return Err(DispatchError::AngleMismatch {
                workers: workers.len(),
                angles: angles.len(),
            });
        }
        self.announce()?;
        info!(reviewers = workers.len(), "convergent review dispatch");

        let futures = workers
            .into_iter()
            .zip(angles.iter().cloned())
            .map(|(worker, angle)| {
                let mut task = base_task.clone();
                task.id = uuid::Uuid::new_v4().to_string();
                task.description = format!(
                    "{}\n\nReview angle [{}]: {}",
                    task.description, angle.name, angle.instructions
                );
                async move {
                    let result = run_with_recovery(worker.as_ref(), task).await;
                    (angle, result)
                }
            });
        let outcomes = join_all(futures).await;
        Ok(ConvergentReview { outcomes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::worker::{WorkerFailure, WorkerOutcome};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    struct EchoWorker {
        output: String,
        seen: Mutex<Vec<TaskSpec>>,
    }

    impl EchoWorker {
        fn new(output: &str) -> Arc<Self> {
            Arc::new(Self {
                output: output.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Worker for EchoWorker {
        async fn run(&self, task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
            self.seen.lock().unwrap().push(task.clone());
            Ok(WorkerOutcome::from_output(&self.output))
        }
    }

    struct SlowWorker;

    #[async_trait]
    impl Worker for SlowWorker {
        async fn run(&self, _task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(WorkerOutcome::from_output("slow done"))
        }
    }

    fn task(description: &str) -> TaskSpec {
        TaskSpec::new(description, PathBuf::from("/work"))
    }

    #[tokio::test]
    async fn test_sync_dispatch_publishes_session_id() {
        let handoff = Arc::new(SessionHandoff::new());
        let coordinator = Coordinator::new("sess-a").with_handoff(handoff.clone());
        let worker = EchoWorker::new("ok");

        let result = coordinator
            .dispatch_sync(worker, task("write the overview"))
            .await
            .unwrap();
        assert_eq!(result.unwrap().outcome.output, "ok");
        assert_eq!(handoff.take().as_deref(), Some("sess-a"));
    }

    #[test]
    fn test_announce_delivers_lifecycle_event() {
        let coordinator = Coordinator::new("sess-a");
        let event = coordinator.announce().unwrap();
        assert_eq!(event.session_id, "sess-a");
        assert_eq!(
            event.hook_event_name,
            SessionHookEvent::PreExternalOperation
        );
    }

    #[tokio::test]
    async fn test_sync_dispatch_fails_fast_on_occupied_handoff() {
        let handoff = Arc::new(SessionHandoff::new());
        handoff.publish("sess-other").unwrap();
        let coordinator = Coordinator::new("sess-a").with_handoff(handoff);

        let err = coordinator
            .dispatch_sync(EchoWorker::new("ok"), task("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::HandoffBusy));
    }

    #[tokio::test]
    async fn test_async_dispatch_rejects_interactive() {
        let coordinator = Coordinator::new("sess-a");
        let err = coordinator
            .dispatch_async(EchoWorker::new("ok"), task("t").with_interactive(true))
            .unwrap_err();
        assert!(matches!(err, DispatchError::InteractiveNotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_async_dispatch_rejects_session_brokering() {
        use crate::dispatch::task::Capability;
        let coordinator = Coordinator::new("sess-a");
        let err = coordinator
            .dispatch_async(
                EchoWorker::new("ok"),
                task("t").with_capabilities(vec![Capability::SessionBrokering]),
            )
            .unwrap_err();
        match err {
            DispatchError::CapabilityUnavailable { capability } => {
                assert_eq!(capability, "session_brokering");
            }
            other => panic!("expected CapabilityUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_async_dispatch_forces_prompt_auto_deny() {
        let coordinator = Coordinator::new("sess-a");
        let worker = EchoWorker::new("ok");
        let dispatch = coordinator.dispatch_async(worker.clone(), task("t")).unwrap();
        dispatch.join().await.unwrap();

        let seen = worker.seen.lock().unwrap();
        assert!(seen[0].auto_deny_prompts);
    }

    #[tokio::test]
    async fn test_async_poll_is_non_blocking() {
        let coordinator = Coordinator::new("sess-a");
        let mut dispatch = coordinator
            .dispatch_async(Arc::new(SlowWorker), task("t"))
            .unwrap();
        // Still running: poll answers immediately with nothing
        assert!(dispatch.poll().is_none());

        let result = dispatch.join().await.unwrap();
        assert_eq!(result.outcome.output, "slow done");
    }

    #[tokio::test]
    async fn test_parallel_waits_for_full_set() {
        let coordinator = Coordinator::new("sess-a");
        let members: Vec<(Arc<dyn Worker>, TaskSpec)> = vec![
            (EchoWorker::new("one"), task("a")),
            (Arc::new(SlowWorker), task("b")),
            (EchoWorker::new("three"), task("c")),
        ];
        let results = coordinator.dispatch_parallel(members).await.unwrap();
        assert_eq!(results.len(), 3);
        // Member order is preserved regardless of completion order
        assert_eq!(results[0].as_ref().unwrap().outcome.output, "one");
        assert_eq!(results[1].as_ref().unwrap().outcome.output, "slow done");
        assert_eq!(results[2].as_ref().unwrap().outcome.output, "three");
    }

    #[tokio::test]
    async fn test_chain_forwards_summary_never_raw_output() {
        let coordinator = Coordinator::new("sess-a");
        let first = EchoWorker::new("RAW-FIRST-OUTPUT with every detail");
        let second = EchoWorker::new("done");

        let steps = vec![
            ChainStep {
                worker: first,
                task: task("survey the modules"),
            },
            ChainStep {
                worker: second.clone(),
                task: task("write the summary doc"),
            },
        ];
        let results = coordinator
            .dispatch_chain(steps, |_| "three modules, one risky".to_string())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);

        let seen = second.seen.lock().unwrap();
        assert!(seen[0].description.contains("three modules, one risky"));
        assert!(!seen[0].description.contains("RAW-FIRST-OUTPUT"));
    }

    #[tokio::test]
    async fn test_chain_stops_at_escalation() {
        struct AlwaysFails;

        #[async_trait]
        impl Worker for AlwaysFails {
            async fn run(&self, _task: &TaskSpec) -> Result<WorkerOutcome, WorkerFailure> {
                Err(WorkerFailure::Tool("down".into()))
            }
        }

        let coordinator = Coordinator::new("sess-a");
        let last = EchoWorker::new("never runs");
        let steps = vec![
            ChainStep {
                worker: Arc::new(AlwaysFails),
                task: task("a"),
            },
            ChainStep {
                worker: last.clone(),
                task: task("b"),
            },
        ];
        let results = coordinator
            .dispatch_chain(steps, |o| o.outcome.output.clone())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
        assert!(last.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_convergent_rejects_bad_reviewer_count() {
        let coordinator = Coordinator::new("sess-a");
        let workers: Vec<Arc<dyn Worker>> = vec![EchoWorker::new("ok")];
        let err = coordinator
            .dispatch_convergent(workers, task("review"), vec![ReviewAngle::new("a", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ReviewerCount { given: 1 }));
    }

    #[tokio::test]
    async fn test_convergent_rejects_angle_mismatch() {
        let coordinator = Coordinator::new("sess-a");
        let workers: Vec<Arc<dyn Worker>> =
            vec![EchoWorker::new("ok"), EchoWorker::new("ok")];
        let err = coordinator
            .dispatch_convergent(workers, task("review"), vec![ReviewAngle::new("a", "x")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::AngleMismatch {
                workers: 2,
                angles: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_convergent_reviewers_see_only_their_own_angle() {
        let coordinator = Coordinator::new("sess-a");
        let completeness = EchoWorker::new("<verdict>pass 3/3</verdict>");
        let consistency = EchoWorker::new("<verdict>pass 3/3</verdict>");
        let workers: Vec<Arc<dyn Worker>> = vec![completeness.clone(), consistency.clone()];

        let review = coordinator
            .dispatch_convergent(
                workers,
                task("review docs/requirements.md"),
                vec![
                    ReviewAngle::new("completeness", "is anything missing"),
                    ReviewAngle::new("consistency", "do sections contradict"),
                ],
            )
            .await
            .unwrap();

        let seen_a = completeness.seen.lock().unwrap();
        let seen_b = consistency.seen.lock().unwrap();
        assert!(seen_a[0].description.contains("completeness"));
        assert!(!seen_a[0].description.contains("consistency"));
        assert!(seen_b[0].description.contains("consistency"));
        assert!(!seen_b[0].description.contains("completeness"));
        // Distinct task ids per reviewer
        assert_ne!(seen_a[0].id, seen_b[0].id);

        assert_eq!(review.unanimous(), Some(GateDecision::Pass));
    }

    #[tokio::test]
    async fn test_convergent_disagreement_is_not_unanimous() {
        let coordinator = Coordinator::new("sess-a");
        let workers: Vec<Arc<dyn Worker>> = vec![
            EchoWorker::new("<verdict>pass 3/3</verdict>"),
            EchoWorker::new("<verdict>fail 1/3</verdict>"),
        ];
        let review = coordinator
            .dispatch_convergent(
                workers,
                task("review"),
                vec![
                    ReviewAngle::new("a", "x"),
                    ReviewAngle::new("b", "y"),
                ],
            )
            .await
            .unwrap();
        assert!(review.unanimous().is_none());
        let decisions = review.decisions();
        assert_eq!(decisions[0].1, Some(GateDecision::Pass));
        assert_eq!(decisions[1].1, Some(GateDecision::Fail));
    }
}
