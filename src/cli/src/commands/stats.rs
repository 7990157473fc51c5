//! Queue statistics command.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct StatsArgs {}

#[derive(Debug, Deserialize)]
struct QueueCounts {
    waiting: u64,
    active: u64,
    completed: u64,
    failed: u64,
}

#[derive(Debug, Deserialize)]
struct AllStats {
    daily_brief: QueueCounts,
    document_processing: QueueCounts,
    email_processing: QueueCounts,
    source_sync: QueueCounts,
}

#[derive(Tabled, Serialize)]
struct StatsRow {
    queue: String,
    waiting: u64,
    active: u64,
    completed: u64,
    failed: u64,
}

impl StatsRow {
    fn from_counts(queue: &str, counts: &QueueCounts) -> Self {
        Self {
            queue: queue.to_string(),
            waiting: counts.waiting,
            active: counts.active,
            completed: counts.completed,
            failed: counts.failed,
        }
    }
}

pub async fn execute(_args: StatsArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: AllStats = client.get("/api/v1/queues/stats").await?;

    let rows = vec![
        StatsRow::from_counts("daily-brief", &stats.daily_brief),
        StatsRow::from_counts("document-processing", &stats.document_processing),
        StatsRow::from_counts("email-processing", &stats.email_processing),
        StatsRow::from_counts("source-sync", &stats.source_sync),
    ];

    output::print_list(&rows, format);
    Ok(())
}
