//! Project initialization and status commands.

use anyhow::{Context, Result};
use chrono::Utc;
use console::style;
use std::path::Path;

use stagecraft::config::StagecraftConfig;
use stagecraft::pipeline::{self, PipelineFile, StageSpec};
use stagecraft::state::{Project, ProjectStore, WorkUnitStatus};

/// Load config, open the state store, and resolve the project id.
pub(crate) fn open_store(
    project_dir: &Path,
    project: Option<&str>,
) -> Result<(StagecraftConfig, ProjectStore, String)> {
    let config = StagecraftConfig::load(project_dir)?;
    let store = ProjectStore::open(&config.state_dir())?;
    let project_id = project
        .map(|p| p.to_string())
        .unwrap_or_else(|| config.project_name());
    Ok((config, store, project_id))
}

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    let config = StagecraftConfig::load(project_dir)?;
    config.ensure_directories()?;

    let pipeline_path = config.pipeline_path();
    if !pipeline_path.exists() {
        let stages = pipeline::default_stages();
        let file = PipelineFile {
            generated_at: Utc::now().to_rfc3339(),
            stages: stages
                .iter()
                .map(|s| StageSpec {
                    id: s.id.clone(),
                    name: s.name.clone(),
                })
                .collect(),
        };
        file.save(&pipeline_path)?;
        println!("Wrote {}", pipeline_path.display());
    }

    let criteria_path = config.criteria_path();
    if !criteria_path.exists() {
        std::fs::write(&criteria_path, SAMPLE_CRITERIA)
            .with_context(|| format!("Failed to write {}", criteria_path.display()))?;
        println!("Wrote {}", criteria_path.display());
    }

    let store = ProjectStore::open(&config.state_dir())?;
    let project_id = config.project_name();
    if store.load(&project_id).is_err() {
        let stages = pipeline::load_stages_or_default(Some(&pipeline_path))?;
        let project = Project::new(&project_id, stages);
        store.save(&project)?;
        println!("Created project '{project_id}'");
    }

    println!();
    println!("Initialized. Run 'stagecraft advance' to activate the first stage.");
    Ok(())
}

pub fn cmd_status(project_dir: &Path, project: Option<&str>) -> Result<()> {
    let (_, store, project_id) = open_store(project_dir, project)?;
    let project = store
        .load(&project_id)
        .with_context(|| format!("Project '{project_id}' not found; run 'stagecraft init'"))?;

    println!();
    println!("Project: {project_id}");
    println!();
    println!("{:<4} {:<22} {:<26} Status", "#", "Stage", "Name");
    for stage in &project.stages {
        let status = stage.status.as_str();
        let styled = match status {
            "completed" => style(status).green(),
            "active" | "review_pending" => style(status).yellow(),
            "evolution" | "quick_fix" => style(status).magenta(),
            _ => style(status).dim(),
        };
        println!(
            "{:<4} {:<22} {:<26} {}",
            stage.ordinal, stage.id, stage.name, styled
        );
    }

    let open_issues: Vec<_> = project.issues.iter().filter(|i| !i.closed).collect();
    if !open_issues.is_empty() {
        println!();
        println!("Open issues:");
        for issue in open_issues {
            println!(
                "  [{}] {}: {}",
                style(format!("{:?}", issue.severity).to_lowercase()).red(),
                issue.stage,
                issue.detail
            );
        }
    }

    let open_units: Vec<_> = project
        .work_units
        .iter()
        .filter(|wu| wu.status == WorkUnitStatus::Open)
        .collect();
    if !open_units.is_empty() {
        println!();
        println!("Open work units:");
        for wu in open_units {
            println!(
                "  {} ({:?}) -> {}",
                wu.description,
                wu.kind,
                wu.affected_stages.join(", ")
            );
        }
    }

    if !project.milestones.is_empty() {
        println!();
        println!("Milestones:");
        for m in &project.milestones {
            println!("  {} ({})", m.label, m.created_at.format("%Y-%m-%d"));
        }
    }
    println!();
    Ok(())
}

const SAMPLE_CRITERIA: &str = r#"# Per-stage gate criteria.
# severity is "blocking" (unmet fails the gate) or "warning" (advisory).

[stages.01-discovery]
criteria = [
    { text = "Problem statement names the user and the pain", severity = "blocking" },
    { text = "Out-of-scope list present", severity = "warning" },
]

[stages.02-requirements]
criteria = [
    { text = "Each requirement is testable", severity = "blocking" },
    { text = "Requirements trace back to the problem statement", severity = "blocking" },
]
"#;
