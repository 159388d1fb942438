//! Data-driven iteration-loop proposal table.
//!
//! When a standard (non-evolution) gate pass fails, the evaluator consults
//! this table of (stage, failure-signature) rules. A match yields a proposal
//! to reopen an earlier stage with a payload carried backward. New loops are
//! additive configuration, not code changes.

use serde::{Deserialize, Serialize};

/// One rule: if `stage` fails with a failing criterion matching
/// `signature` (case-insensitive substring), propose looping back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopRule {
    /// Stage whose gate failed
    pub stage: String,
    /// Substring matched against failing criterion text and evidence
    pub signature: String,
    /// Earlier stage to reopen
    pub target_stage: String,
    /// Payload template carried backward to the target stage
    pub payload: String,
}

/// A proposed backward iteration loop. Never auto-applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopProposal {
    pub target_stage: String,
    pub reason: String,
    pub payload: String,
}

/// The rule table, queried in order; first match wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopTable {
    #[serde(default)]
    pub rules: Vec<LoopRule>,
}

impl LoopTable {
    pub fn new(rules: Vec<LoopRule>) -> Self {
        Self { rules }
    }

    /// The default reference loops for the 7-stage pipeline.
    pub fn default_rules() -> Self {
        Self::new(vec![
            LoopRule {
                stage: "03-architecture".into(),
                signature: "requirement".into(),
                target_stage: "02-requirements".into(),
                payload: "Architecture gate failed on a requirements gap; revisit the requirement set".into(),
            },
            LoopRule {
                stage: "04-data-design".into(),
                signature: "entity".into(),
                target_stage: "03-architecture".into(),
                payload: "Data design exposed a missing architectural entity; revisit component boundaries".into(),
            },
            LoopRule {
                stage: "07-validation".into(),
                signature: "acceptance".into(),
                target_stage: "02-requirements".into(),
                payload: "Validation failed acceptance coverage; revisit requirement testability".into(),
            },
        ])
    }

    /// Find the first rule matching the failed stage and any failing
    /// criterion's text or evidence.
    pub fn lookup(&self, stage: &str, failures: &[(&str, &str)]) -> Option<LoopProposal> {
        for rule in &self.rules {
            if rule.stage != stage {
                continue;
            }
            let sig = rule.signature.to_lowercase();
            let matched = failures.iter().find(|(criterion, evidence)| {
                criterion.to_lowercase().contains(&sig) || evidence.to_lowercase().contains(&sig)
            });
            if let Some((criterion, _)) = matched {
                return Some(LoopProposal {
                    target_stage: rule.target_stage.clone(),
                    reason: format!("{stage} failed: {criterion}"),
                    payload: rule.payload.clone(),
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LoopTable {
        LoopTable::new(vec![LoopRule {
            stage: "03-architecture".into(),
            signature: "requirement".into(),
            target_stage: "02-requirements".into(),
            payload: "revisit requirements".into(),
        }])
    }

    #[test]
    fn test_lookup_matches_criterion_text() {
        let proposal = table()
            .lookup(
                "03-architecture",
                &[("Every requirement maps to a component", "R-7 unmapped")],
            )
            .unwrap();
        assert_eq!(proposal.target_stage, "02-requirements");
        assert!(proposal.reason.contains("03-architecture"));
    }

    #[test]
    fn test_lookup_matches_evidence() {
        let proposal = table().lookup(
            "03-architecture",
            &[("Component diagram complete", "missing Requirement R-3 linkage")],
        );
        assert!(proposal.is_some());
    }

    #[test]
    fn test_lookup_no_match_for_other_stage() {
        assert!(
            table()
                .lookup("02-requirements", &[("requirement coverage", "gap")])
                .is_none()
        );
    }

    #[test]
    fn test_lookup_no_match_for_unrelated_failure() {
        assert!(
            table()
                .lookup("03-architecture", &[("diagram legible", "blurry")])
                .is_none()
        );
    }

    #[test]
    fn test_first_match_wins() {
        let mut t = table();
        t.rules.push(LoopRule {
            stage: "03-architecture".into(),
            signature: "requirement".into(),
            target_stage: "01-discovery".into(),
            payload: "never reached".into(),
        });
        let proposal = t
            .lookup("03-architecture", &[("requirement coverage", "gap")])
            .unwrap();
        assert_eq!(proposal.target_stage, "02-requirements");
    }

    #[test]
    fn test_default_rules_cover_reference_pipeline() {
        let t = LoopTable::default_rules();
        assert!(!t.rules.is_empty());
        assert!(
            t.lookup("07-validation", &[("acceptance coverage", "3 of 9 untested")])
                .is_some()
        );
    }
}
