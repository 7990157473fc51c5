//! Daily brief commands.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum BriefCommands {
    /// Fan out one daily-brief job per active deal
    Trigger,

    /// Enqueue brief generation for a single deal
    Generate(GenerateArgs),
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Deal to generate a brief for
    #[arg(long)]
    deal_id: Uuid,

    /// Brief date (defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct FanOutEntry {
    deal_id: Uuid,
    deal_name: String,
    job_id: Uuid,
    deduplicated: bool,
}

#[derive(Debug, Deserialize)]
struct FanOutFailure {
    deal_name: String,
    error: String,
}

#[derive(Debug, Deserialize)]
struct FanOutReport {
    queued: Vec<FanOutEntry>,
    failed: Vec<FanOutFailure>,
}

#[derive(Tabled, Serialize)]
struct QueuedRow {
    deal: String,
    deal_id: Uuid,
    job_id: Uuid,
    deduplicated: bool,
}

#[derive(Debug, Deserialize, Serialize)]
struct JobHandle {
    id: Uuid,
    deduplicated: bool,
}

pub async fn execute(cmd: BriefCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        BriefCommands::Trigger => {
            let report: FanOutReport = client.post_empty("/api/v1/briefs/trigger").await?;

            let rows: Vec<QueuedRow> = report
                .queued
                .iter()
                .map(|e| QueuedRow {
                    deal: e.deal_name.clone(),
                    deal_id: e.deal_id,
                    job_id: e.job_id,
                    deduplicated: e.deduplicated,
                })
                .collect();
            output::print_list(&rows, format);

            for failure in &report.failed {
                output::print_error(&format!("{}: {}", failure.deal_name, failure.error));
            }
            output::print_success(&format!(
                "Queued briefs for {}/{} deals",
                report.queued.len(),
                report.queued.len() + report.failed.len()
            ));
        }
        BriefCommands::Generate(args) => {
            let handle: JobHandle = client
                .post(
                    "/api/v1/briefs/generate",
                    &serde_json::json!({
                        "deal_id": args.deal_id,
                        "date": args.date,
                    }),
                )
                .await?;

            if handle.deduplicated {
                output::print_success(&format!(
                    "Brief already queued for this deal and date (job {})",
                    handle.id
                ));
            } else {
                output::print_success(&format!("Brief queued (job {})", handle.id));
            }
        }
    }

    Ok(())
}
