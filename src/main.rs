use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "stagecraft")]
#[command(version, about = "Workflow orchestration core - gated stage pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Project id inside the state store (defaults to the configured name)
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Session id of the caller (defaults to $STAGECRAFT_SESSION, else "cli")
    #[arg(long, global = true)]
    pub session: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a stagecraft project: pipeline, criteria table, state store
    Init,
    /// Show the pipeline, open issues, work units, and iterations
    Status,
    /// Activate the next not-started stage
    Advance,
    /// Submit an active stage for gate review
    Review {
        /// Stage id (e.g. 02-requirements)
        stage: String,
    },
    /// Run the gate for a stage against checked criterion results
    Gate {
        /// Stage id
        stage: String,
        /// JSON file of per-criterion results
        #[arg(long)]
        results: PathBuf,
    },
    /// Open a work unit reopening completed stages for a scoped change
    WorkUnit {
        /// What the change is
        description: String,
        /// Comma-separated affected stage ids
        #[arg(long)]
        stages: String,
        /// Narrow change: warnings are reinterpreted as passes at the gate
        #[arg(long)]
        quick_fix: bool,
    },
    /// Open an iteration cycle reopening several stages for broad rework
    Iterate {
        /// Why the rework is needed
        reason: String,
        /// Comma-separated stage ids to reopen
        #[arg(long)]
        stages: String,
    },
    /// Record a milestone
    Milestone { label: String },
    /// Dispatch one task synchronously to the configured worker command
    Dispatch {
        /// What the worker should do
        description: String,
        /// Primary artifact paths
        #[arg(long)]
        artifact: Vec<PathBuf>,
        /// Explicit constraints
        #[arg(long)]
        constraint: Vec<String>,
    },
    /// Manage isolated parallel workspaces
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },
    /// Session lifecycle hooks (invoked by the external environment)
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// Create a workspace and bind the calling session to it
    Create { name: String },
    /// List workspaces with their clean/dirty status
    List,
    /// Close a workspace
    Close {
        name: String,
        /// Commit uncommitted changes with this message before closing
        #[arg(long, conflicts_with = "discard")]
        commit: Option<String>,
        /// Discard uncommitted changes
        #[arg(long)]
        discard: bool,
        /// Merge the workspace branch into the trunk
        #[arg(long, conflicts_with = "delete_branch")]
        merge: bool,
        /// Delete the workspace branch without merging
        #[arg(long)]
        delete_branch: bool,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Resolve and persist this session's environment
    Start,
    /// Re-resolve the environment (e.g. after a workspace change)
    Refresh,
    /// Print the resolved environment
    Show,
    /// Drop this session's record
    End,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "stagecraft=debug"
    } else {
        "stagecraft=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let session_id = cli
        .session
        .clone()
        .or_else(|| std::env::var("STAGECRAFT_SESSION").ok())
        .unwrap_or_else(|| "cli".to_string());

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Status => cmd::cmd_status(&project_dir, cli.project.as_deref())?,
        Commands::Advance => cmd::cmd_advance(&project_dir, cli.project.as_deref())?,
        Commands::Review { stage } => cmd::cmd_review(&project_dir, cli.project.as_deref(), stage)?,
        Commands::Gate { stage, results } => {
            cmd::cmd_gate(&project_dir, cli.project.as_deref(), stage, results)?
        }
        Commands::WorkUnit {
            description,
            stages,
            quick_fix,
        } => cmd::cmd_work_unit(
            &project_dir,
            cli.project.as_deref(),
            description,
            stages,
            *quick_fix,
        )?,
        Commands::Iterate { reason, stages } => {
            cmd::cmd_iterate(&project_dir, cli.project.as_deref(), reason, stages)?
        }
        Commands::Milestone { label } => {
            cmd::cmd_milestone(&project_dir, cli.project.as_deref(), label)?
        }
        Commands::Dispatch {
            description,
            artifact,
            constraint,
        } => {
            cmd::cmd_dispatch(&project_dir, &session_id, description, artifact, constraint).await?
        }
        Commands::Workspace { command } => {
            cmd::cmd_workspace(&project_dir, &session_id, command)?
        }
        Commands::Session { command } => cmd::cmd_session(&project_dir, &session_id, command)?,
    }

    Ok(())
}
