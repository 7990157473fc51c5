//! DealPulse CLI - Command-line interface for operating the pipeline.
//!
//! Provides commands for queue statistics, brief generation, source sync,
//! and health checks against a running DealPulse server.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{briefs, health, stats, sync};
use output::OutputFormat;

/// DealPulse - deal intelligence pipeline CLI
#[derive(Parser)]
#[command(
    name = "dealpulse",
    version = "0.1.0",
    about = "DealPulse - deal intelligence pipeline",
    long_about = "CLI tool for operating the DealPulse job pipeline: queue introspection, brief generation, and source sync triggers.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "DEALPULSE_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show job queue statistics
    Stats(stats::StatsArgs),

    /// Daily brief operations
    #[command(subcommand)]
    Briefs(briefs::BriefCommands),

    /// Trigger a source sync
    Sync(sync::SyncArgs),

    /// Check server health
    Health(health::HealthArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let client = client::ApiClient::new(&api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Stats(args) => stats::execute(args, &client, format).await,
        Commands::Briefs(cmd) => briefs::execute(cmd, &client, format).await,
        Commands::Sync(args) => sync::execute(args, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
