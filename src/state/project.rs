//! The `Project` root aggregate and its owned records.
//!
//! A project is mutated only by the gate evaluator and the dispatch-adjacent
//! commands; every mutation is followed by a persisted save through
//! `ProjectStore`. The aggregate enforces the single-in-flight-stage
//! invariant: at most one stage on the primary track may be active or
//! review-pending at a time. Work-unit reopenings are the sole exception and
//! are tracked as distinct concurrent reopenings, never silently overlapping
//! the primary track.

use crate::errors::StateError;
use crate::pipeline::{EvolutionContext, Stage, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of an open issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Blocks stage advancement
    Blocking,
    /// Noted but does not block
    Advisory,
}

/// An open problem blocking (or annotating) progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub stage: String,
    pub detail: String,
    pub severity: IssueSeverity,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed: bool,
}

impl Issue {
    pub fn blocking(stage: &str, detail: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            stage: stage.to_string(),
            detail: detail.to_string(),
            severity: IssueSeverity::Blocking,
            opened_at: Utc::now(),
            closed: false,
        }
    }
}

/// Kind of a scoped change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkUnitKind {
    WorkUnit,
    QuickFix,
}

/// Open/closed state of a work unit or iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkUnitStatus {
    Open,
    Closed,
}

/// A scoped change request tracked independently of the primary pipeline cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: String,
    pub description: String,
    pub affected_stages: Vec<String>,
    pub kind: WorkUnitKind,
    pub status: WorkUnitStatus,
    pub opened_at: DateTime<Utc>,
}

/// A broad reopening cycle across multiple stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationCycle {
    pub id: String,
    pub reason: String,
    pub reopened_stages: Vec<String>,
    pub status: WorkUnitStatus,
    pub opened_at: DateTime<Utc>,
}

/// An immutable checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
}

/// The higher-level mode currently engaged, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveWorkflow {
    pub id: String,
    pub name: String,
    pub started: DateTime<Utc>,
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

/// Root aggregate for one project's workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub work_units: Vec<WorkUnit>,
    #[serde(default)]
    pub iterations: Vec<IterationCycle>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub active_workflow: Option<ActiveWorkflow>,
    /// Stage ids reopened by work units, running alongside the primary track
    #[serde(default)]
    pub concurrent_reopenings: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Project {
    /// Create a project over the given stage graph, cursor at the first stage.
    pub fn new(id: &str, stages: Vec<Stage>) -> Self {
        Self {
            id: id.to_string(),
            stages,
            issues: Vec::new(),
            work_units: Vec::new(),
            iterations: Vec::new(),
            milestones: Vec::new(),
            active_workflow: None,
            concurrent_reopenings: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_mut(&mut self, id: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == id)
    }

    /// The primary-track stage currently in flight, if any.
    ///
    /// Reopened stages are excluded: a work-unit evolution pass runs
    /// concurrently with the primary track and does not hold the cursor.
    pub fn in_flight_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.status.is_in_flight() && !self.concurrent_reopenings.contains(&s.id))
    }

    /// Append an audit record. The caller persists via `ProjectStore::save`.
    pub fn record(&mut self, action: &str, detail: &str) {
        self.history.push(HistoryEntry {
            action: action.to_string(),
            detail: detail.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Move the pipeline cursor onto the first not-started stage.
    ///
    /// Returns the activated stage id, or `None` when every stage has been
    /// reached already.
    pub fn advance_cursor(&mut self) -> Result<Option<String>, StateError> {
        if let Some(current) = self.in_flight_stage() {
            return Err(StateError::Conflict {
                project: self.id.clone(),
                detail: format!("stage {} is still in flight", current.id),
            });
        }
        let next = self
            .stages
            .iter_mut()
            .find(|s| s.status == StageStatus::NotStarted);
        match next {
            Some(stage) => {
                stage.status = StageStatus::Active;
                let id = stage.id.clone();
                self.record("stage_activated", &id);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Mark the in-flight stage as awaiting its gate.
    pub fn submit_for_review(&mut self, stage_id: &str) -> Result<(), StateError> {
        let stage = self
            .stage_mut(stage_id)
            .ok_or_else(|| StateError::UnknownStage {
                id: stage_id.to_string(),
            })?;
        if !stage.status.can_transition_to(StageStatus::ReviewPending) {
            return Err(StateError::InvalidTransition {
                from: stage.status.to_string(),
                to: StageStatus::ReviewPending.to_string(),
            });
        }
        stage.status = StageStatus::ReviewPending;
        self.record("stage_review_pending", stage_id);
        Ok(())
    }

    /// Open a work unit over a set of completed stages, reopening each.
    ///
    /// Two open work units may not claim the same stage: overlap is rejected
    /// rather than merged or queued.
    pub fn open_work_unit(
        &mut self,
        description: &str,
        affected_stages: &[String],
        kind: WorkUnitKind,
    ) -> Result<String, StateError> {
        for stage_id in affected_stages {
            if self.stage(stage_id).is_none() {
                return Err(StateError::UnknownStage {
                    id: stage_id.clone(),
                });
            }
            if let Some(existing) = self.work_units.iter().find(|wu| {
                wu.status == WorkUnitStatus::Open && wu.affected_stages.contains(stage_id)
            }) {
                return Err(StateError::WorkUnitOverlap {
                    stage: stage_id.clone(),
                    existing: existing.id.clone(),
                });
            }
        }

        let id = Uuid::new_v4().to_string();
        let quick_fix = kind == WorkUnitKind::QuickFix;
        for stage_id in affected_stages {
            let stage = self.stage_mut(stage_id).expect("checked above");
            if !stage
                .status
                .can_transition_to(if quick_fix {
                    StageStatus::QuickFix
                } else {
                    StageStatus::Evolution
                })
            {
                return Err(StateError::InvalidTransition {
                    from: stage.status.to_string(),
                    to: if quick_fix {
                        StageStatus::QuickFix.to_string()
                    } else {
                        StageStatus::Evolution.to_string()
                    },
                });
            }
            stage.status = if quick_fix {
                StageStatus::QuickFix
            } else {
                StageStatus::Evolution
            };
            stage.evolution_context = Some(EvolutionContext::for_work_unit(&id, quick_fix));
            if !self.concurrent_reopenings.contains(stage_id) {
                self.concurrent_reopenings.push(stage_id.clone());
            }
        }

        self.work_units.push(WorkUnit {
            id: id.clone(),
            description: description.to_string(),
            affected_stages: affected_stages.to_vec(),
            kind,
            status: WorkUnitStatus::Open,
            opened_at: Utc::now(),
        });
        self.record("work_unit_opened", description);
        Ok(id)
    }

    /// Open an iteration cycle reopening several completed stages for rework.
    pub fn open_iteration(
        &mut self,
        reason: &str,
        reopened_stages: &[String],
    ) -> Result<String, StateError> {
        let id = Uuid::new_v4().to_string();
        for stage_id in reopened_stages {
            let stage = self
                .stage_mut(stage_id)
                .ok_or_else(|| StateError::UnknownStage {
                    id: stage_id.clone(),
                })?;
            if !stage.status.can_transition_to(StageStatus::Evolution) {
                return Err(StateError::InvalidTransition {
                    from: stage.status.to_string(),
                    to: StageStatus::Evolution.to_string(),
                });
            }
            stage.status = StageStatus::Evolution;
            stage.evolution_context =
                Some(EvolutionContext::for_iteration(&id, Some(reason.to_string())));
            if !self.concurrent_reopenings.contains(stage_id) {
                self.concurrent_reopenings.push(stage_id.clone());
            }
        }
        self.iterations.push(IterationCycle {
            id: id.clone(),
            reason: reason.to_string(),
            reopened_stages: reopened_stages.to_vec(),
            status: WorkUnitStatus::Open,
            opened_at: Utc::now(),
        });
        self.record("iteration_opened", reason);
        Ok(id)
    }

    /// Record an immutable checkpoint.
    pub fn add_milestone(&mut self, label: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.milestones.push(Milestone {
            id: id.clone(),
            label: label.to_string(),
            created_at: Utc::now(),
        });
        self.record("milestone_added", label);
        id
    }

    /// Validate the aggregate's invariants.
    ///
    /// Called by `ProjectStore::save` before anything reaches disk, so a torn
    /// write can never persist a stage status inconsistent with its
    /// evolution context, nor two primary-track stages in flight.
    pub fn validate(&self) -> Result<(), StateError> {
        for stage in &self.stages {
            if !stage.is_consistent() {
                return Err(StateError::InconsistentStage {
                    id: stage.id.clone(),
                    detail: format!(
                        "status {} with evolution_context {}",
                        stage.status,
                        if stage.evolution_context.is_some() {
                            "present"
                        } else {
                            "absent"
                        }
                    ),
                });
            }
        }

        let in_flight: Vec<&Stage> = self
            .stages
            .iter()
            .filter(|s| s.status.is_in_flight() && !self.concurrent_reopenings.contains(&s.id))
            .collect();
        if in_flight.len() > 1 {
            return Err(StateError::Conflict {
                project: self.id.clone(),
                detail: format!(
                    "multiple primary-track stages in flight: {}",
                    in_flight
                        .iter()
                        .map(|s| s.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::default_stages;

    fn project() -> Project {
        Project::new("demo", default_stages())
    }

    fn complete_stage(p: &mut Project, id: &str) {
        let stage = p.stage_mut(id).unwrap();
        stage.status = StageStatus::Completed;
        stage.evolution_context = None;
    }

    #[test]
    fn test_advance_cursor_activates_first_stage() {
        let mut p = project();
        let activated = p.advance_cursor().unwrap();
        assert_eq!(activated.as_deref(), Some("01-discovery"));
        assert_eq!(p.stage("01-discovery").unwrap().status, StageStatus::Active);
        assert_eq!(p.in_flight_stage().unwrap().id, "01-discovery");
    }

    #[test]
    fn test_advance_cursor_refuses_while_in_flight() {
        let mut p = project();
        p.advance_cursor().unwrap();
        let err = p.advance_cursor().unwrap_err();
        assert!(matches!(err, StateError::Conflict { .. }));
    }

    #[test]
    fn test_advance_cursor_exhausted_pipeline() {
        let mut p = project();
        let ids: Vec<String> = p.stages.iter().map(|s| s.id.clone()).collect();
        for id in &ids {
            complete_stage(&mut p, id);
        }
        assert_eq!(p.advance_cursor().unwrap(), None);
    }

    #[test]
    fn test_submit_for_review_requires_active() {
        let mut p = project();
        let err = p.submit_for_review("01-discovery").unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));

        p.advance_cursor().unwrap();
        p.submit_for_review("01-discovery").unwrap();
        assert_eq!(
            p.stage("01-discovery").unwrap().status,
            StageStatus::ReviewPending
        );
    }

    #[test]
    fn test_open_work_unit_reopens_stages() {
        let mut p = project();
        complete_stage(&mut p, "01-discovery");
        complete_stage(&mut p, "02-requirements");

        let wu = p
            .open_work_unit(
                "rename the tenant model",
                &["02-requirements".to_string()],
                WorkUnitKind::WorkUnit,
            )
            .unwrap();

        let stage = p.stage("02-requirements").unwrap();
        assert_eq!(stage.status, StageStatus::Evolution);
        let ctx = stage.evolution_context.as_ref().unwrap();
        assert_eq!(ctx.work_unit.as_deref(), Some(wu.as_str()));
        assert!(!ctx.quick_fix);
        assert!(p.concurrent_reopenings.contains(&"02-requirements".to_string()));
    }

    #[test]
    fn test_open_work_unit_quick_fix_sets_flag() {
        let mut p = project();
        complete_stage(&mut p, "01-discovery");

        p.open_work_unit(
            "typo in glossary",
            &["01-discovery".to_string()],
            WorkUnitKind::QuickFix,
        )
        .unwrap();

        let stage = p.stage("01-discovery").unwrap();
        assert_eq!(stage.status, StageStatus::QuickFix);
        assert!(stage.evolution_context.as_ref().unwrap().quick_fix);
    }

    #[test]
    fn test_work_unit_overlap_rejected() {
        let mut p = project();
        complete_stage(&mut p, "01-discovery");

        p.open_work_unit(
            "first",
            &["01-discovery".to_string()],
            WorkUnitKind::WorkUnit,
        )
        .unwrap();

        // The stage is now reopened, but even after completing it again the
        // open work unit still claims it.
        complete_stage(&mut p, "01-discovery");
        let err = p
            .open_work_unit(
                "second",
                &["01-discovery".to_string()],
                WorkUnitKind::WorkUnit,
            )
            .unwrap_err();
        assert!(matches!(err, StateError::WorkUnitOverlap { .. }));
    }

    #[test]
    fn test_work_unit_on_unstarted_stage_rejected() {
        let mut p = project();
        let err = p
            .open_work_unit(
                "too early",
                &["03-architecture".to_string()],
                WorkUnitKind::WorkUnit,
            )
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
    }

    #[test]
    fn test_work_unit_runs_alongside_primary_track() {
        let mut p = project();
        complete_stage(&mut p, "01-discovery");
        p.advance_cursor().unwrap(); // 02 active

        p.open_work_unit(
            "revisit discovery",
            &["01-discovery".to_string()],
            WorkUnitKind::WorkUnit,
        )
        .unwrap();

        // Reopened stage moves to review without disturbing the cursor.
        p.stage_mut("01-discovery").unwrap().status = StageStatus::ReviewPending;
        assert_eq!(p.in_flight_stage().unwrap().id, "02-requirements");
        p.validate().unwrap();
    }

    #[test]
    fn test_open_iteration() {
        let mut p = project();
        complete_stage(&mut p, "01-discovery");
        complete_stage(&mut p, "02-requirements");

        let it = p
            .open_iteration(
                "new compliance requirement",
                &["01-discovery".to_string(), "02-requirements".to_string()],
            )
            .unwrap();

        for id in ["01-discovery", "02-requirements"] {
            let stage = p.stage(id).unwrap();
            assert_eq!(stage.status, StageStatus::Evolution);
            assert_eq!(
                stage.evolution_context.as_ref().unwrap().iteration.as_deref(),
                Some(it.as_str())
            );
        }
        assert_eq!(p.iterations.len(), 1);
        assert!(p.concurrent_reopenings.contains(&"01-discovery".to_string()));
    }

    #[test]
    fn test_validate_rejects_two_primary_in_flight() {
        let mut p = project();
        p.stage_mut("01-discovery").unwrap().status = StageStatus::Active;
        p.stage_mut("02-requirements").unwrap().status = StageStatus::ReviewPending;
        assert!(matches!(
            p.validate().unwrap_err(),
            StateError::Conflict { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_inconsistent_stage() {
        let mut p = project();
        p.stage_mut("01-discovery").unwrap().status = StageStatus::Evolution;
        assert!(matches!(
            p.validate().unwrap_err(),
            StateError::InconsistentStage { .. }
        ));
    }

    #[test]
    fn test_history_records_mutations() {
        let mut p = project();
        p.advance_cursor().unwrap();
        p.add_milestone("kickoff");
        assert!(p.history.iter().any(|h| h.action == "stage_activated"));
        assert!(p.history.iter().any(|h| h.action == "milestone_added"));
    }
}
