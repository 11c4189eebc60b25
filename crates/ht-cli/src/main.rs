//! hopterm CLI
//!
//! Operator console for running commands across hosts that are only
//! reachable through chains of jump hosts:
//! - `run` streams one command's output from many hosts at once
//! - `check` verifies a chain hop by hop
//! - `hosts` lists the configured inventory
//! - `config` manages the configuration file

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hopterm::commands::{self, RunOptions};
use hopterm::output::print_error;

#[derive(Parser)]
#[command(name = "hopterm")]
#[command(author, version, about = "Run commands across hosts behind jump-host chains")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "HOPTERM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command on several hosts and stream their output
    Run {
        /// Chain to run on, e.g. "bastion/web-1:2222" (repeatable; overrides the inventory)
        #[arg(short = 'H', long = "host")]
        hosts: Vec<String>,
        /// Only inventory hosts with this tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Print matches of this regex per host instead of the raw output
        #[arg(short, long)]
        grep: Option<String>,
        /// Print a per-host summary when done
        #[arg(short, long)]
        summary: bool,
        /// Command to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Connect through a chain and report every hop
    Check {
        /// Chain specification, e.g. "bastion/db-1"
        chain: String,
    },

    /// List the configured hosts
    Hosts {
        /// Only hosts with this tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show the configuration file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    // stderr only: stdout carries host output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = dispatch(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            hosts,
            tags,
            grep,
            summary,
            command,
        } => {
            let config = commands::load_console_config(config_path)?;
            commands::run_command(
                &config,
                RunOptions {
                    hosts,
                    tags,
                    grep,
                    command,
                    summary,
                },
            )
            .await
        }
        Commands::Check { chain } => {
            let config = commands::load_console_config(config_path)?;
            commands::check_command(&config, &chain).await
        }
        Commands::Hosts { tags, json } => {
            let config = commands::load_console_config(config_path)?;
            commands::hosts_command(&config, &tags, json)
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path),
            ConfigAction::Path => commands::config_path(config_path),
            ConfigAction::Init { force } => commands::config_init(config_path, force),
        },
    }
}
