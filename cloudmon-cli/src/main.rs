// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! `CloudMon` CLI - cloud cost and quota monitoring from the command line.
//!
//! # Examples
//!
//! ```bash
//! # List supported providers
//! cloudmon providers
//!
//! # Add a DigitalOcean account (token read from the environment)
//! CLOUDMON_DIGITALOCEAN_API_TOKEN=dop_v1_... cloudmon accounts add digitalocean personal
//!
//! # Add an AWS account with explicit secrets
//! cloudmon accounts add aws prod --region us-east-1 \
//!     --secret access_key_id=AKIA... --secret secret_access_key=...
//!
//! # Poll one account now
//! cloudmon poll aws prod --query cost
//!
//! # JSON output
//! cloudmon --format json --pretty poll aws prod
//!
//! # Live dashboard
//! cloudmon watch
//! ```

mod app;
mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{accounts, poll, providers, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// `CloudMon` CLI - multi-cloud cost and quota monitoring.
#[derive(Parser)]
#[command(name = "cloudmon")]
#[command(about = "Multi-cloud cost and quota monitoring CLI")]
#[command(long_about = r"
CloudMon aggregates cost and quota data from several cloud providers.

Supported providers:
  • Amazon Web Services (aws)
  • Microsoft Azure (azure)
  • Google Cloud (gcp)
  • DigitalOcean (digitalocean)
  • Google Gemini API (gemini)
  • Zhipu AI (zhipu)

Secrets are stored in the OS keychain, never in the config file.

Examples:
  cloudmon providers                     # Supported providers
  cloudmon accounts add aws prod ...     # Add an account
  cloudmon accounts update aws prod ...  # Change settings or rotate secrets
  cloudmon poll aws prod                 # Fetch now
  cloudmon watch                         # Live dashboard
")]
#[command(version)]
#[command(author = "CloudMon Contributors")]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Path to the config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the snapshot database.
    #[arg(long, global = true)]
    pub snapshot: Option<PathBuf>,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// List supported providers.
    #[command(visible_alias = "p")]
    Providers,

    /// Manage configured accounts.
    #[command(visible_alias = "a")]
    Accounts(accounts::AccountsArgs),

    /// Fetch one account now, bypassing the cache.
    Poll(poll::PollArgs),

    /// Poll every account on its schedule and show a live dashboard.
    #[command(visible_alias = "w")]
    Watch(watch::WatchArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// Credentials were rejected or could not be stored.
    Credentials = 2,
    /// At least one fetch failed.
    FetchFailed = 3,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("cloudmon=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Providers => providers::run(&cli),
        Commands::Accounts(args) => accounts::run(args, &cli).await,
        Commands::Poll(args) => poll::run(args, &cli).await,
        Commands::Watch(args) => watch::run(args, &cli).await,
    };

    match result {
        Ok(ExitCode::Success) => Ok(()),
        Ok(code) => std::process::exit(code as i32),
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            let code = if e
                .downcast_ref::<cloudmon_manager::ManagerError>()
                .is_some_and(cloudmon_manager::ManagerError::is_credential_error)
            {
                ExitCode::Credentials
            } else {
                ExitCode::Error
            };
            std::process::exit(code as i32);
        }
    }
}
