//! Load-test coordinator CLI
//!
//! Runs a configured experiment against a cluster of load agents,
//! checks configurations, and queries individual agents.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{run, status, validate};

/// Load-test coordinator CLI
#[derive(Parser)]
#[command(name = "ltc")]
#[command(author, version, about = "CLI for the distributed load-test coordinator", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an experiment until convergence or interrupt
    Run {
        /// Path to the coordinator configuration file
        #[arg(long, short, env = "LTC_CONFIG")]
        config: PathBuf,
    },

    /// Fetch the status of a single load agent
    Status {
        /// Base URL of the agent's HTTP API
        #[arg(long, env = "LTC_AGENT_URL")]
        api_url: String,

        /// Agent id
        id: String,
    },

    /// Validate a coordinator configuration file
    Validate {
        /// Path to the coordinator configuration file
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            run::run_experiment(&config, cli.format).await?;
        }
        Commands::Status { api_url, id } => {
            status::show_status(&api_url, &id, cli.format).await?;
        }
        Commands::Validate { config } => {
            validate::check_config(&config)?;
        }
    }

    Ok(())
}
