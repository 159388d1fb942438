//! Workspace create, list, and close commands.

use anyhow::Result;
use console::style;
use std::path::Path;

use stagecraft::session::SessionEnvManager;
use stagecraft::workspace::{
    BranchDisposition, DirtyDisposition, WorkspaceManager,
};

use crate::WorkspaceCommands;

pub fn cmd_workspace(
    project_dir: &Path,
    session_id: &str,
    command: &WorkspaceCommands,
) -> Result<()> {
    let manager = WorkspaceManager::new(project_dir)?;
    let sessions = SessionEnvManager::new(project_dir)?;

    match command {
        WorkspaceCommands::Create { name } => {
            let binding = manager.create(name, &sessions, session_id)?;
            println!(
                "Created workspace '{}' on branch {} at {}",
                binding.name,
                binding.branch,
                binding.path.display()
            );
        }
        WorkspaceCommands::List => {
            let workspaces = manager.list()?;
            if workspaces.is_empty() {
                println!("No workspaces.");
                return Ok(());
            }
            println!();
            println!("{:<20} {:<24} {:<8} Path", "Workspace", "Branch", "State");
            for ws in workspaces {
                let state = if ws.dirty {
                    style("dirty").yellow()
                } else {
                    style("clean").green()
                };
                println!(
                    "{:<20} {:<24} {:<8} {}",
                    ws.name,
                    ws.branch,
                    state,
                    ws.path.display()
                );
            }
            println!();
        }
        WorkspaceCommands::Close {
            name,
            commit,
            discard,
            merge,
            delete_branch,
        } => {
            let dirty = match (commit, discard) {
                (Some(message), _) => DirtyDisposition::Commit {
                    message: message.clone(),
                },
                (None, true) => DirtyDisposition::Discard,
                (None, false) => DirtyDisposition::Abort,
            };
            let branch = if *merge {
                BranchDisposition::Merge
            } else if *delete_branch {
                BranchDisposition::Delete
            } else {
                BranchDisposition::Keep
            };

            let outcome = manager.close(name, dirty, branch, &sessions)?;
            if outcome.merged {
                println!("Merged '{name}' into the trunk.");
            }
            if outcome.removal_deferred {
                println!(
                    "Workspace '{name}' closed; directory removal deferred \
                     (current directory is inside it)."
                );
                if outcome.branch_deletion_deferred {
                    println!(
                        "Branch deletion deferred as well; close again after \
                         leaving the workspace."
                    );
                }
            } else {
                println!("Workspace '{name}' closed.");
            }
        }
    }
    Ok(())
}
