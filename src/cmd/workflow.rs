//! Pipeline advancement, review, gate, work unit, and iteration commands.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use stagecraft::gate::{CriterionResult, GateEvaluator, GateResult};
use stagecraft::state::WorkUnitKind;

use super::project::open_store;

fn split_stages(stages: &str) -> Vec<String> {
    stages
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn cmd_advance(project_dir: &Path, project: Option<&str>) -> Result<()> {
    let (_, store, project_id) = open_store(project_dir, project)?;
    let activated = store.update(&project_id, |p| p.advance_cursor())?;
    match activated {
        Some(stage) => println!("Activated stage {stage}"),
        None => println!("All stages are completed."),
    }
    Ok(())
}

pub fn cmd_review(project_dir: &Path, project: Option<&str>, stage: &str) -> Result<()> {
    let (_, store, project_id) = open_store(project_dir, project)?;
    store.update(&project_id, |p| p.submit_for_review(stage))?;
    println!("Stage {stage} submitted for review.");
    Ok(())
}

pub fn cmd_gate(
    project_dir: &Path,
    project: Option<&str>,
    stage: &str,
    results_path: &Path,
) -> Result<()> {
    let content = std::fs::read_to_string(results_path)
        .with_context(|| format!("Failed to read results: {}", results_path.display()))?;
    let results: Vec<CriterionResult> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse results: {}", results_path.display()))?;

    let (_, store, project_id) = open_store(project_dir, project)?;
    let evaluator = GateEvaluator::with_default_loops();
    let result = store.update(&project_id, |p| evaluator.run(p, stage, &results))?;
    print_gate_result(&result);
    Ok(())
}

fn print_gate_result(result: &GateResult) {
    println!();
    if result.passed() {
        println!("Gate {}: {}", result.stage, style("PASS").green().bold());
    } else {
        println!("Gate {}: {}", result.stage, style("FAIL").red().bold());
        for failing in result.failing() {
            println!("  {} :: {}", failing.criterion, failing.evidence);
        }
    }
    if let Some(proposal) = &result.proposed_loop {
        println!();
        println!(
            "Proposed loop back to {}: {}",
            style(&proposal.target_stage).yellow(),
            proposal.reason
        );
        println!("  {}", proposal.payload);
    }
    println!();
}

pub fn cmd_work_unit(
    project_dir: &Path,
    project: Option<&str>,
    description: &str,
    stages: &str,
    quick_fix: bool,
) -> Result<()> {
    let affected = split_stages(stages);
    if affected.is_empty() {
        anyhow::bail!("--stages must name at least one stage");
    }
    let kind = if quick_fix {
        WorkUnitKind::QuickFix
    } else {
        WorkUnitKind::WorkUnit
    };

    let (_, store, project_id) = open_store(project_dir, project)?;
    let id = store.update(&project_id, |p| p.open_work_unit(description, &affected, kind))?;
    println!("Opened work unit {id} across {}", affected.join(", "));
    Ok(())
}

pub fn cmd_iterate(
    project_dir: &Path,
    project: Option<&str>,
    reason: &str,
    stages: &str,
) -> Result<()> {
    let reopened = split_stages(stages);
    if reopened.is_empty() {
        anyhow::bail!("--stages must name at least one stage");
    }

    let (_, store, project_id) = open_store(project_dir, project)?;
    let id = store.update(&project_id, |p| p.open_iteration(reason, &reopened))?;
    println!("Opened iteration {id} reopening {}", reopened.join(", "));
    Ok(())
}

pub fn cmd_milestone(project_dir: &Path, project: Option<&str>, label: &str) -> Result<()> {
    let (_, store, project_id) = open_store(project_dir, project)?;
    let id = store.update(&project_id, |p| Ok(p.add_milestone(label)))?;
    println!("Milestone recorded: {label} ({id})");
    Ok(())
}
