//! Gate decision logic and its application to the project aggregate.
//!
//! `evaluate` is a pure function of (criteria results, quick-fix flag):
//! identical input always yields identical decision and criteria list.
//! `GateEvaluator::run` applies a decision to the project: status
//! transitions, issue creation, aggregate closure, cursor advancement, and
//! backward-loop proposals.

use crate::gate::criteria::{CriterionResult, GateDecision, GateResult, Verdict};
use crate::gate::loops::LoopTable;
use crate::pipeline::StageStatus;
use crate::state::project::{Issue, Project, WorkUnitStatus};
use tracing::info;

/// Compute the gate decision for a stage's criterion results.
///
/// Quick-fix reinterpretation: when `quick_fix` is true, every `warn` is
/// upgraded to `pass` with an annotation before the decision is computed.
/// `fail` still blocks. This is the only context in which criterion severity
/// is reinterpreted; work-unit and iteration passes evaluate at full
/// strictness.
pub fn evaluate(results: &[CriterionResult], quick_fix: bool) -> (GateDecision, Vec<CriterionResult>) {
    let criteria: Vec<CriterionResult> = results
        .iter()
        .map(|r| {
            if quick_fix && r.verdict == Verdict::Warn {
                CriterionResult {
                    criterion: r.criterion.clone(),
                    verdict: Verdict::Pass,
                    evidence: format!("{} [warning upgraded under quick-fix]", r.evidence),
                }
            } else {
                r.clone()
            }
        })
        .collect();

    let decision = if criteria.iter().any(|c| c.verdict == Verdict::Fail) {
        GateDecision::Fail
    } else {
        // Warnings never block an ordinary pass.
        GateDecision::Pass
    };

    (decision, criteria)
}

/// Applies gate decisions to the project aggregate.
pub struct GateEvaluator {
    loop_table: LoopTable,
}

impl GateEvaluator {
    pub fn new(loop_table: LoopTable) -> Self {
        Self { loop_table }
    }

    pub fn with_default_loops() -> Self {
        Self::new(LoopTable::default_rules())
    }

    /// Run the gate for `stage_id` against pre-checked criterion results.
    ///
    /// Only a stage with work in progress can be gated: active,
    /// review-pending, or reopened. A not-started or completed stage is
    /// rejected with `InvalidTransition` before anything is evaluated.
    ///
    /// On PASS the stage completes, its evolution context is cleared, any
    /// work unit or iteration it was the last open member of is closed, and
    /// the pipeline cursor advances (primary track only). On FAIL each
    /// failing criterion becomes a blocking issue and, for standard passes,
    /// the loop table may yield a backward proposal. The caller persists the
    /// mutated project through `ProjectStore::save`.
    pub fn run(
        &self,
        project: &mut Project,
        stage_id: &str,
        results: &[CriterionResult],
    ) -> Result<GateResult, crate::errors::StateError> {
        let stage = project
            .stage(stage_id)
            .ok_or_else(|| crate::errors::StateError::UnknownStage {
                id: stage_id.to_string(),
            })?;
        if matches!(
            stage.status,
            StageStatus::NotStarted | StageStatus::Completed
        ) {
            return Err(crate::errors::StateError::InvalidTransition {
                from: stage.status.to_string(),
                to: StageStatus::Completed.to_string(),
            });
        }
        let context = stage.evolution_context.clone();
        let is_evolution = context.is_some();
        let quick_fix = context.as_ref().is_some_and(|c| c.quick_fix);

        let (decision, criteria) = evaluate(results, quick_fix);
        info!(stage = %stage_id, decision = ?decision, evolution = is_evolution, "gate evaluated");

        let proposed_loop = match decision {
            GateDecision::Pass => {
                self.apply_pass(project, stage_id, is_evolution)?;
                None
            }
            GateDecision::Fail => self.apply_fail(project, stage_id, is_evolution, &criteria),
        };

        Ok(GateResult {
            stage: stage_id.to_string(),
            decision,
            criteria,
            proposed_loop,
        })
    }

    fn apply_pass(
        &self,
        project: &mut Project,
        stage_id: &str,
        is_evolution: bool,
    ) -> Result<(), crate::errors::StateError> {
        let stage = project.stage_mut(stage_id).expect("stage checked by run");
        stage.status = StageStatus::Completed;
        let context = stage.evolution_context.take();
        project.concurrent_reopenings.retain(|s| s != stage_id);
        project.record("gate_passed", stage_id);

        if let Some(ctx) = context {
            if let Some(wu_id) = ctx.work_unit {
                self.close_work_unit_if_done(project, &wu_id);
            }
            if let Some(it_id) = ctx.iteration {
                self.close_iteration_if_done(project, &it_id);
            }
        }

        // Evolution passes never move the primary cursor. An exhausted
        // pipeline yields Ok(None); an in-flight conflict propagates.
        if !is_evolution {
            project.advance_cursor()?;
        }
        Ok(())
    }

    fn close_work_unit_if_done(&self, project: &mut Project, wu_id: &str) {
        let done = project
            .work_units
            .iter()
            .find(|wu| wu.id == wu_id)
            .is_some_and(|wu| {
                wu.affected_stages.iter().all(|s| {
                    project
                        .stage(s)
                        .is_some_and(|st| st.status == StageStatus::Completed)
                })
            });
        if done && let Some(wu) = project.work_units.iter_mut().find(|wu| wu.id == wu_id) {
            wu.status = WorkUnitStatus::Closed;
            let desc = wu.description.clone();
            project.record("work_unit_closed", &desc);
        }
    }

    fn close_iteration_if_done(&self, project: &mut Project, it_id: &str) {
        let done = project
            .iterations
            .iter()
            .find(|it| it.id == it_id)
            .is_some_and(|it| {
                it.reopened_stages.iter().all(|s| {
                    project
                        .stage(s)
                        .is_some_and(|st| st.status == StageStatus::Completed)
                })
            });
        if done && let Some(it) = project.iterations.iter_mut().find(|it| it.id == it_id) {
            it.status = WorkUnitStatus::Closed;
            let reason = it.reason.clone();
            project.record("iteration_closed", &reason);
        }
    }

    fn apply_fail(
        &self,
        project: &mut Project,
        stage_id: &str,
        is_evolution: bool,
        criteria: &[CriterionResult],
    ) -> Option<crate::gate::loops::LoopProposal> {
        let failures: Vec<(&str, &str)> = criteria
            .iter()
            .filter(|c| c.verdict == Verdict::Fail)
            .map(|c| (c.criterion.as_str(), c.evidence.as_str()))
            .collect();

        for (criterion, evidence) in &failures {
            project.issues.push(Issue::blocking(
                stage_id,
                &format!("{criterion}: {evidence}"),
            ));
        }
        project.record("gate_failed", stage_id);

        // A review-pending stage goes back to work; its reopening status is
        // restored from the evolution context.
        let stage = project.stage_mut(stage_id).expect("stage checked by run");
        if stage.status == StageStatus::ReviewPending {
            stage.status = match &stage.evolution_context {
                Some(ctx) if ctx.quick_fix => StageStatus::QuickFix,
                Some(_) => StageStatus::Evolution,
                None => StageStatus::Active,
            };
        }

        if is_evolution {
            None
        } else {
            self.loop_table.lookup(stage_id, &failures)
        }
    }
}
