//! Replica autoscaler CLI
//!
//! A command-line tool for inspecting autoscaler status, the current
//! metrics snapshot and the scaling history.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{history, status};

/// Replica autoscaler CLI
#[derive(Parser)]
#[command(name = "scalectl")]
#[command(author, version, about = "CLI for the Replica Autoscaler", long_about = None)]
pub struct Cli {
    /// Status API URL (can also be set via SCALECTL_API_URL env var)
    #[arg(long, env = "SCALECTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show overall status and per-service replicas
    Status,

    /// Show the latest metrics snapshot
    Metrics,

    /// Show scaling history
    History {
        /// Only show actions for this service
        #[arg(long, short)]
        service: Option<String>,

        /// Show at most this many of the most recent actions
        #[arg(long, short)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Metrics => status::show_metrics(&client, cli.format).await?,
        Commands::History { service, limit } => {
            history::show_history(&client, service, limit, cli.format).await?;
        }
    }

    Ok(())
}
