//! Parsing the machine-readable verdict a gate-relevant worker emits.
//!
//! The contract is a small tag vocabulary inside otherwise free-form
//! output:
//!
//! ```text
//! <verdict>pass 5/6</verdict>
//! <criterion-fail>Each requirement is testable :: REQ-4 has no check</criterion-fail>
//! <criterion-warn>Out-of-scope list present :: section is empty</criterion-warn>
//! <created>docs/requirements.md</created>
//! ```
//!
//! Tags may appear anywhere in the output and in any order. A missing
//! `<verdict>` tag means the dispatch was not gate-relevant.

use crate::gate::criteria::GateDecision;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

static VERDICT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<verdict>\s*(pass|fail)\s+(\d+)\s*/\s*(\d+)\s*</verdict>")
        .expect("verdict regex compiles")
});

static FAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<criterion-fail>(.*?)</criterion-fail>").expect("criterion-fail regex compiles")
});

static WARN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<criterion-warn>(.*?)</criterion-warn>").expect("criterion-warn regex compiles")
});

static CREATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<created>(.*?)</created>").expect("created regex compiles"));

/// A per-criterion note extracted from a fail/warn tag. The criterion text
/// and optional evidence are separated by `::`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionNote {
    pub criterion: String,
    pub evidence: String,
}

impl CriterionNote {
    fn parse(body: &str) -> Self {
        match body.split_once("::") {
            Some((criterion, evidence)) => Self {
                criterion: criterion.trim().to_string(),
                evidence: evidence.trim().to_string(),
            },
            None => Self {
                criterion: body.trim().to_string(),
                evidence: String::new(),
            },
        }
    }
}

/// The structured verdict a worker reported for a gate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub decision: GateDecision,
    pub criteria_met: u32,
    pub criteria_total: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<CriterionNote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CriterionNote>,
}

impl GateVerdict {
    /// Extract a verdict from worker output. `None` when no verdict tag is
    /// present or the counts do not parse.
    pub fn parse(output: &str) -> Option<GateVerdict> {
        let caps = VERDICT_RE.captures(output)?;
        let decision = match &caps[1] {
            "pass" => GateDecision::Pass,
            _ => GateDecision::Fail,
        };
        let criteria_met: u32 = caps[2].parse().ok()?;
        let criteria_total: u32 = caps[3].parse().ok()?;

        let failures = FAIL_RE
            .captures_iter(output)
            .map(|c| CriterionNote::parse(&c[1]))
            .collect();
        let warnings = WARN_RE
            .captures_iter(output)
            .map(|c| CriterionNote::parse(&c[1]))
            .collect();

        Some(GateVerdict {
            decision,
            criteria_met,
            criteria_total,
            failures,
            warnings,
        })
    }

    /// Extract the created-file list, independent of any verdict tag.
    pub fn parse_created_files(output: &str) -> Vec<PathBuf> {
        CREATED_RE
            .captures_iter(output)
            .map(|c| PathBuf::from(c[1].trim()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passing_verdict() {
        let output = "All criteria satisfied.\n<verdict>pass 6/6</verdict>\n";
        let verdict = GateVerdict::parse(output).unwrap();
        assert_eq!(verdict.decision, GateDecision::Pass);
        assert_eq!(verdict.criteria_met, 6);
        assert_eq!(verdict.criteria_total, 6);
        assert!(verdict.failures.is_empty());
    }

    #[test]
    fn test_parse_failing_verdict_with_notes() {
        let output = "\
Review complete.
<verdict>fail 4/6</verdict>
<criterion-fail>Each requirement is testable :: REQ-4 has no check</criterion-fail>
<criterion-fail>Acceptance owner named</criterion-fail>
<criterion-warn>Out-of-scope list present :: section is empty</criterion-warn>
";
        let verdict = GateVerdict::parse(output).unwrap();
        assert_eq!(verdict.decision, GateDecision::Fail);
        assert_eq!(verdict.criteria_met, 4);
        assert_eq!(verdict.failures.len(), 2);
        assert_eq!(verdict.failures[0].criterion, "Each requirement is testable");
        assert_eq!(verdict.failures[0].evidence, "REQ-4 has no check");
        assert_eq!(verdict.failures[1].evidence, "");
        assert_eq!(verdict.warnings.len(), 1);
        assert_eq!(verdict.warnings[0].evidence, "section is empty");
    }

    #[test]
    fn test_parse_no_verdict_tag() {
        assert!(GateVerdict::parse("just some chatter").is_none());
        assert!(GateVerdict::parse("<verdict>maybe 1/2</verdict>").is_none());
    }

    #[test]
    fn test_parse_created_files() {
        let output = "\
<created>docs/architecture.md</created>
done
<created>docs/adr/0001-storage.md</created>
";
        let files = GateVerdict::parse_created_files(output);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], PathBuf::from("docs/architecture.md"));
    }
}
