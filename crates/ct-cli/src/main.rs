//! cluster-term CLI
//!
//! Type once, run everywhere:
//! - connect: one interactive terminal over many SSH shells (default)
//! - check: report which hosts accept the connection
//! - config: inspect or create the configuration file

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cluster_term::commands::{self, ConnectArgs};

#[derive(Parser)]
#[command(name = "cluster-term")]
#[command(author, version, about = "One interactive terminal over many SSH shells")]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    connect: ConnectArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open one terminal that types into every host (default)
    Connect(ConnectArgs),

    /// Connect to every host, print the results and disconnect
    Check(ConnectArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.quiet, cli.verbose, cli.log_file.as_ref())?;

    match cli.command {
        None => {
            let config = commands::load_client_config(cli.config.as_ref())?;
            commands::connect_command(&cli.connect, &config).await?;
        }

        Some(Commands::Connect(args)) => {
            let config = commands::load_client_config(cli.config.as_ref())?;
            commands::connect_command(&args, &config).await?;
        }

        Some(Commands::Check(args)) => {
            let config = commands::load_client_config(cli.config.as_ref())?;
            commands::check_command(&args, &config).await?;
        }

        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => {
                commands::config_show(cli.config.as_ref())?;
            }
            ConfigAction::Path => {
                commands::config_path(cli.config.as_ref())?;
            }
            ConfigAction::Init { force } => {
                commands::config_init(cli.config.as_ref(), force)?;
            }
        },
    }

    Ok(())
}

/// Setup logging based on verbosity, honoring `RUST_LOG` when set
fn init_logging(quiet: bool, verbose: u8, log_file: Option<&PathBuf>) -> Result<()> {
    let log_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()));

    match log_file {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create log file: {:?}", path))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }

    Ok(())
}
