//! Synchronous single dispatch from the command line.

use anyhow::Result;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stagecraft::config::StagecraftConfig;
use stagecraft::dispatch::{Coordinator, TaskSpec};
use stagecraft::session::SessionEnvManager;

pub async fn cmd_dispatch(
    project_dir: &Path,
    session_id: &str,
    description: &str,
    artifacts: &[PathBuf],
    constraints: &[String],
) -> Result<()> {
    let config = StagecraftConfig::load(project_dir)?;
    let sessions = SessionEnvManager::new(project_dir)?;
    // Run in the session's resolved directory, which may be a workspace
    let env = sessions.load(session_id);

    let mut task = TaskSpec::new(description, env.active_dir.clone())
        .with_artifacts(artifacts.to_vec())
        .with_permission_mode(config.permission_mode());
    for constraint in constraints {
        task = task.with_constraint(constraint);
    }

    let coordinator = Coordinator::new(session_id);
    let worker = Arc::new(config.worker());
    match coordinator.dispatch_sync(worker, task).await? {
        Ok(result) => {
            if !result.attempts.is_empty() {
                eprintln!(
                    "{}",
                    style(format!(
                        "recovered after {} failed evaluation(s)",
                        result.attempts.len()
                    ))
                    .yellow()
                );
            }
            print!("{}", result.outcome.output);
            if let Some(verdict) = &result.outcome.verdict {
                eprintln!(
                    "verdict: {:?} ({}/{})",
                    verdict.decision, verdict.criteria_met, verdict.criteria_total
                );
            }
            Ok(())
        }
        Err(escalation) => {
            eprintln!("{}", style("dispatch escalated").red().bold());
            eprintln!("{escalation}");
            anyhow::bail!("task {} escalated after retries", escalation.task_id)
        }
    }
}
