//! Session lifecycle hook commands, invoked by the external environment.

use anyhow::{Context, Result};
use std::path::Path;

use stagecraft::session::{SessionEnvManager, SessionEvent, SessionHookEvent};

use crate::SessionCommands;

pub fn cmd_session(project_dir: &Path, session_id: &str, command: &SessionCommands) -> Result<()> {
    let manager = SessionEnvManager::new(project_dir)?;
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    match command {
        SessionCommands::Start => {
            let env = manager.on_session_start(session_id, &cwd)?;
            let event = SessionEvent::new(session_id, SessionHookEvent::SessionStart);
            println!("{}", serde_json::to_string(&event)?);
            println!("active_dir: {}", env.active_dir.display());
        }
        SessionCommands::Refresh => {
            let env = manager.refresh(session_id, &cwd)?;
            println!("active_dir: {}", env.active_dir.display());
        }
        SessionCommands::Show => {
            let env = manager.load(session_id);
            println!("{}", serde_json::to_string_pretty(&env)?);
        }
        SessionCommands::End => {
            manager.on_session_end(session_id)?;
            let event = SessionEvent::new(session_id, SessionHookEvent::SessionEnd);
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    Ok(())
}
