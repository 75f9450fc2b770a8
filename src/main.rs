use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cockpit::config::{CliOverrides, CockpitConfig, LoggingSection};
use cockpit::logging;

mod cmd;

#[derive(Parser)]
#[command(name = "cockpit")]
#[command(
    version,
    about = "Inspect, follow, and branch LLM orchestration sessions"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Skip confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    /// Path to cockpit.toml. Defaults to .cockpit/cockpit.toml, then the user config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Orchestration API base URL. Overrides the config file and COCKPIT_BASE_URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the reconstructed timeline of a session
    Timeline {
        session_id: String,
        /// Print the phase groups as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the checkpoints of a session
    Checkpoints { session_id: String },
    /// Respond to a pending checkpoint
    Respond {
        checkpoint_id: String,
        /// Response payload: JSON, or plain text sent as a string
        #[arg(short, long)]
        response: String,
    },
    /// Show saved research sessions as a lineage tree
    Sessions {
        /// Maximum number of sessions to fetch
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Fork a research session from one of its responded checkpoints
    Branch {
        research_session_id: String,
        /// Index of the checkpoint to branch from
        #[arg(short, long)]
        checkpoint: usize,
        /// Replacement response for that checkpoint: JSON or plain text
        #[arg(short, long)]
        response: String,
    },
    /// Follow a running session live until interrupted
    Watch { session_id: String },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default cockpit.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        base_url: cli.base_url.clone(),
    };

    // Config commands must work even when the config file is broken.
    if let Commands::Config { command } = &cli.command {
        let _guard = logging::init_logging(cli.verbose, &LoggingSection::default());
        return cmd::cmd_config(&project_dir, &overrides, command.clone());
    }

    let (config, _) = CockpitConfig::resolve(&project_dir, &overrides)?;
    let _guard = logging::init_logging(cli.verbose, &config.logging);

    match &cli.command {
        Commands::Timeline { session_id, json } => {
            cmd::cmd_timeline(&config, session_id, *json).await?
        }
        Commands::Checkpoints { session_id } => cmd::cmd_checkpoints(&config, session_id).await?,
        Commands::Respond {
            checkpoint_id,
            response,
        } => cmd::cmd_respond(&config, checkpoint_id, response).await?,
        Commands::Sessions { limit } => cmd::cmd_sessions(&config, *limit).await?,
        Commands::Branch {
            research_session_id,
            checkpoint,
            response,
        } => {
            cmd::cmd_branch(&config, research_session_id, *checkpoint, response, cli.yes).await?
        }
        Commands::Watch { session_id } => cmd::cmd_watch(&config, session_id).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}
