use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use adw::config::AdwConfig;
use adw::state::WorkflowType;

mod cmd;

#[derive(Parser)]
#[command(name = "adw")]
#[command(version, about = "Automated developer workflow orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository the workflows operate on (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trigger a workflow for a tracker issue
    Trigger {
        /// Issue number to work on
        #[arg(short, long)]
        issue: u64,

        /// Workflow strategy: plan-build, sdlc, zte (defaults to issue
        /// labels, then sdlc)
        #[arg(short, long)]
        workflow: Option<String>,

        /// Let the agent attempt to fix failing tests and review findings
        #[arg(long)]
        auto_resolve: bool,

        /// Approve and merge the PR without a human in the loop
        #[arg(long)]
        auto_ship: bool,
    },
    /// Resume an interrupted workflow from its persisted state
    Resume {
        /// Workflow id, e.g. abc12345
        adw_id: String,
    },
    /// Print a workflow's state record
    Status {
        /// Workflow id, e.g. abc12345
        adw_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let repo_dir = match cli.repo_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = AdwConfig::load(&repo_dir)?;

    match &cli.command {
        Commands::Trigger {
            issue,
            workflow,
            auto_resolve,
            auto_ship,
        } => {
            let workflow_type: Option<WorkflowType> = workflow
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            cmd::cmd_trigger(config, *issue, workflow_type, *auto_resolve, *auto_ship).await?;
        }
        Commands::Resume { adw_id } => cmd::cmd_resume(config, adw_id).await?,
        Commands::Status { adw_id } => cmd::cmd_status(config, adw_id)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
