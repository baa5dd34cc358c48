use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use seoflow::config::{CliOverrides, Config, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "seoflow")]
#[command(version, about = "Campaign keyword analysis pipeline")]
pub struct Cli {
    /// Print a digest of each phase payload as it completes
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress the progress display
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON instead of a summary
    #[arg(long, global = true)]
    pub json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Storage root for sessions, reports, profiles and logs. Overrides seoflow.toml.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Log filter directive (e.g. "debug" or "seoflow=trace")
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format: pretty, json
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Do not write the rotating log file
    #[arg(long, global = true)]
    pub no_log_file: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a fresh run of every phase for a subject
    Run { subject: String },
    /// Continue a subject's run after its last completed phase
    Resume { subject: String },
    /// Continue a subject's run starting at a given phase
    From {
        subject: String,
        /// Phase name, alias or number (e.g. phase3_gsc, gsc, 3)
        phase: String,
    },
    /// Execute exactly one phase of an existing run
    Phase { subject: String, phase: String },
    /// Show a subject's workflow progress
    Status { subject: String },
    /// List the canonical phases and whether each has a handler
    Phases,
    /// List saved reports for a subject, most recent first
    Reports { subject: String },
    /// Run a predefined chain outside the persisted workflow
    Chain {
        /// market_to_gsc, analysis_to_action or quick_analysis
        kind: String,

        /// Subject to read profile and keywords from
        #[arg(short, long, default_value = "adhoc")]
        subject: String,

        /// Comma-separated keywords; defaults to the subject's selected keywords
        #[arg(short, long, value_delimiter = ',')]
        keywords: Vec<String>,

        #[arg(long)]
        website_url: Option<String>,

        /// JSON file with the market payload (analysis_to_action)
        #[arg(long)]
        market: Option<PathBuf>,

        /// JSON file with the search-console payload (analysis_to_action)
        #[arg(long)]
        gsc: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default seoflow.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&project_dir, command.clone());
    }

    let config = Config::new(
        project_dir,
        CliOverrides {
            root: cli.root.clone(),
            log_level: cli.log_level.clone(),
            log_format: cli.log_format,
            no_log_file: cli.no_log_file,
        },
    )?;
    config.ensure_directories()?;
    let _log_guard = seoflow::logging::init(&config)?;

    match &cli.command {
        Commands::Run { subject } => {
            cmd::run_workflow(&cli, &config, subject, cmd::RunMode::Complete).await?
        }
        Commands::Resume { subject } => {
            cmd::run_workflow(&cli, &config, subject, cmd::RunMode::Resume).await?
        }
        Commands::From { subject, phase } => {
            cmd::run_workflow(&cli, &config, subject, cmd::RunMode::From(phase.clone())).await?
        }
        Commands::Phase { subject, phase } => {
            cmd::run_workflow(&cli, &config, subject, cmd::RunMode::Single(phase.clone())).await?
        }
        Commands::Status { subject } => cmd::cmd_status(&cli, &config, subject).await?,
        Commands::Phases => cmd::cmd_phases(&config),
        Commands::Reports { subject } => cmd::cmd_reports(&cli, &config, subject)?,
        Commands::Chain {
            kind,
            subject,
            keywords,
            website_url,
            market,
            gsc,
        } => {
            cmd::cmd_chain(
                &config,
                cmd::ChainArgs {
                    kind,
                    subject,
                    keywords,
                    website_url: website_url.as_deref(),
                    market: market.as_deref(),
                    gsc: gsc.as_deref(),
                },
            )
            .await?
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
