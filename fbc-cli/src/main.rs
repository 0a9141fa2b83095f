//! fbcctl
//!
//! Diagnostic companion for the NvFBC capture source.
//!
//! # Usage
//!
//! ```bash
//! # List outputs the driver can capture
//! fbcctl outputs
//!
//! # Resolve a tracking selector to an output id
//! fbcctl resolve "DP-1"
//!
//! # Print the stock source settings as JSON
//! fbcctl defaults
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// fbcctl - diagnostics for NvFBC capture
#[derive(Parser)]
#[command(name = "fbcctl")]
#[command(version)]
#[command(about = "Diagnostics for the NvFBC capture source", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List outputs attached to the GPU
    #[command(alias = "ls")]
    Outputs,

    /// Resolve a tracking selector to a backend output id
    Resolve(commands::ResolveArgs),

    /// Print the default source settings as JSON
    Defaults,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("fbc={}", level).parse().unwrap()),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Outputs => commands::outputs()?,
        Commands::Resolve(args) => commands::resolve(args)?,
        Commands::Defaults => commands::defaults()?,
    }

    Ok(())
}
