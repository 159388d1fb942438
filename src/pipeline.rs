//! Stage definitions and JSON loading for the stagecraft pipeline.
//!
//! This module provides:
//! - `Stage` struct representing one node in the fixed pipeline graph
//! - `StageStatus` lifecycle states and the legal transitions between them
//! - `EvolutionContext` recording why a completed stage was reopened
//! - `PipelineFile` for JSON-based pipeline configuration
//! - The default 7-stage reference pipeline as a fallback
//!
//! The pipeline graph is statically ordered: stages advance in ordinal
//! order and never fork. Its size is a configuration value, not a constant.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lifecycle status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not yet reached by the pipeline cursor
    NotStarted,
    /// Currently being worked on by the primary track
    Active,
    /// Work finished, awaiting its gate verdict
    ReviewPending,
    /// Gate passed
    Completed,
    /// Reopened for rework (work unit or iteration)
    Evolution,
    /// Reopened for a narrowly scoped quick fix
    QuickFix,
}

impl StageStatus {
    /// Whether this status occupies the primary pipeline track.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, StageStatus::Active | StageStatus::ReviewPending)
    }

    /// Whether this status represents a reopened stage.
    pub fn is_reopened(&self) -> bool {
        matches!(self, StageStatus::Evolution | StageStatus::QuickFix)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::Active => "active",
            StageStatus::ReviewPending => "review_pending",
            StageStatus::Completed => "completed",
            StageStatus::Evolution => "evolution",
            StageStatus::QuickFix => "quick_fix",
        }
    }

    /// Check whether `to` is a legal next status.
    ///
    /// Forward path: not_started -> active -> review_pending -> completed.
    /// Rework path: completed -> evolution | quick_fix -> review_pending -> completed.
    pub fn can_transition_to(&self, to: StageStatus) -> bool {
        use StageStatus::*;
        matches!(
            (self, to),
            (NotStarted, Active)
                | (Active, ReviewPending)
                | (ReviewPending, Completed)
                | (ReviewPending, Active)
                | (Completed, Evolution)
                | (Completed, QuickFix)
                | (Evolution, ReviewPending)
                | (QuickFix, ReviewPending)
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a completed stage was reopened, and what to restore on gate pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionContext {
    /// Work unit that reopened this stage, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_unit: Option<String>,
    /// True when this is a quick-fix reopening (gate warnings upgrade to pass)
    #[serde(default)]
    pub quick_fix: bool,
    /// Iteration cycle that reopened this stage, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<String>,
    /// Free-text scope of the rework
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Status the stage held before reopening
    pub prior_status: StageStatus,
}

impl EvolutionContext {
    /// Context for a work-unit reopening.
    pub fn for_work_unit(work_unit: &str, quick_fix: bool) -> Self {
        Self {
            work_unit: Some(work_unit.to_string()),
            quick_fix,
            iteration: None,
            scope: None,
            prior_status: StageStatus::Completed,
        }
    }

    /// Context for an iteration reopening.
    pub fn for_iteration(iteration: &str, scope: Option<String>) -> Self {
        Self {
            work_unit: None,
            quick_fix: false,
            iteration: Some(iteration.to_string()),
            scope,
            prior_status: StageStatus::Completed,
        }
    }
}

/// One node in the fixed, statically-ordered pipeline graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    /// Stage identifier (e.g., "01-discovery")
    pub id: String,
    /// Position in the fixed dependency order
    pub ordinal: u32,
    /// Human-readable name
    pub name: String,
    /// Current lifecycle status
    pub status: StageStatus,
    /// Present iff the stage has been reopened; cleared on gate pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evolution_context: Option<EvolutionContext>,
}

impl Stage {
    pub fn new(id: &str, ordinal: u32, name: &str) -> Self {
        Self {
            id: id.to_string(),
            ordinal,
            name: name.to_string(),
            status: StageStatus::NotStarted,
            evolution_context: None,
        }
    }

    /// Whether the stage's status and evolution context are mutually consistent.
    ///
    /// A reopened status requires a context; a context on a non-reopened,
    /// non-review status means a torn write.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            StageStatus::Evolution | StageStatus::QuickFix => self.evolution_context.is_some(),
            StageStatus::ReviewPending => true,
            _ => self.evolution_context.is_none(),
        }
    }
}

/// Stage definition as it appears in a pipeline configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageSpec {
    pub id: String,
    pub name: String,
}

/// The full pipeline.json file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    /// Timestamp when the pipeline was generated
    pub generated_at: String,
    /// Ordered list of stage definitions
    pub stages: Vec<StageSpec>,
}

impl PipelineFile {
    /// Load a pipeline definition from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        let pipeline: PipelineFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline JSON: {}", path.display()))?;

        Ok(pipeline)
    }

    /// Save the pipeline definition to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize pipeline to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write pipeline file: {}", path.display()))?;

        Ok(())
    }

    /// Materialize stages in `not_started` status, ordinals assigned by position.
    pub fn to_stages(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .enumerate()
            .map(|(i, spec)| Stage::new(&spec.id, i as u32, &spec.name))
            .collect()
    }
}

/// The default 7-stage reference pipeline.
pub fn default_stages() -> Vec<Stage> {
    [
        ("01-discovery", "Discovery"),
        ("02-requirements", "Requirements"),
        ("03-architecture", "Architecture"),
        ("04-data-design", "Data design"),
        ("05-interface-design", "Interface design"),
        ("06-delivery-planning", "Delivery planning"),
        ("07-validation", "Validation"),
    ]
    .iter()
    .enumerate()
    .map(|(i, (id, name))| Stage::new(id, i as u32, name))
    .collect()
}

/// Try to load stages from a file, falling back to the default pipeline.
pub fn load_stages_or_default(pipeline_file: Option<&Path>) -> Result<Vec<Stage>> {
    match pipeline_file {
        Some(path) if path.exists() => {
            let pf = PipelineFile::load(path)?;
            Ok(pf.to_stages())
        }
        _ => Ok(default_stages()),
    }
}
