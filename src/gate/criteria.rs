//! Criteria definitions and gate result types.
//!
//! The criteria table is external, statically configured per stage: an
//! ordered list of (criterion text, blocking|warning). Checks themselves run
//! elsewhere (a worker's verdict line, or manual judgment); the evaluator
//! consumes their per-criterion results.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::gate::loops::LoopProposal;

/// Whether an unmet criterion blocks the gate or merely warns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionSeverity {
    Blocking,
    Warning,
}

/// One acceptance criterion from the per-stage table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Criterion {
    pub text: String,
    pub severity: CriterionSeverity,
}

/// Verdict for a single checked criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Warn,
}

/// Result of checking one criterion against a stage's artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion: String,
    pub verdict: Verdict,
    pub evidence: String,
}

impl CriterionResult {
    pub fn new(criterion: &str, verdict: Verdict, evidence: &str) -> Self {
        Self {
            criterion: criterion.to_string(),
            verdict,
            evidence: evidence.to_string(),
        }
    }
}

/// Overall gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    Pass,
    Fail,
}

/// Ephemeral record produced by one gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub stage: String,
    pub decision: GateDecision,
    /// Per-criterion results in table order, after any quick-fix upgrades
    pub criteria: Vec<CriterionResult>,
    /// Backward iteration loop proposed on a standard-pass failure, if a
    /// rule matched. Proposed only, never auto-applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_loop: Option<LoopProposal>,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.decision == GateDecision::Pass
    }

    pub fn failing(&self) -> Vec<&CriterionResult> {
        self.criteria
            .iter()
            .filter(|c| c.verdict == Verdict::Fail)
            .collect()
    }
}

/// Per-stage acceptance criteria, loaded from TOML.
///
/// ```toml
/// [stages.01-discovery]
/// criteria = [
///     { text = "Problem statement names the user and the pain", severity = "blocking" },
///     { text = "Out-of-scope list present", severity = "warning" },
/// ]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriteriaTable {
    #[serde(default)]
    pub stages: HashMap<String, StageCriteria>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageCriteria {
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl CriteriaTable {
    /// Load the criteria table from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read criteria table: {}", path.display()))?;
        let table: CriteriaTable = toml::from_str(&content)
            .with_context(|| format!("Failed to parse criteria TOML: {}", path.display()))?;
        Ok(table)
    }

    /// Ordered criteria for a stage; empty when the stage has no entry.
    pub fn for_stage(&self, stage_id: &str) -> &[Criterion] {
        self.stages
            .get(stage_id)
            .map(|s| s.criteria.as_slice())
            .unwrap_or(&[])
    }
}
