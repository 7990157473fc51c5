//! Source sync trigger command.

use anyhow::Result;
use clap::{Args, ValueEnum};
use serde::Deserialize;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Source {
    Gdrive,
    Gmail,
    Sharepoint,
    Outlook,
}

impl Source {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Gdrive => "gdrive",
            Self::Gmail => "gmail",
            Self::Sharepoint => "sharepoint",
            Self::Outlook => "outlook",
        }
    }
}

#[derive(Args)]
pub struct SyncArgs {
    /// Deal to sync
    #[arg(long)]
    deal_id: Uuid,

    /// Source to pull from
    #[arg(long, value_enum)]
    source: Source,

    /// Run a full sync instead of an incremental one
    #[arg(long)]
    full: bool,
}

#[derive(Debug, Deserialize)]
struct JobHandle {
    id: Uuid,
}

pub async fn execute(args: SyncArgs, client: &ApiClient, _format: OutputFormat) -> Result<()> {
    let sync_type = if args.full { "full" } else { "incremental" };

    let handle: JobHandle = client
        .post(
            "/api/v1/sync/trigger",
            &serde_json::json!({
                "deal_id": args.deal_id,
                "source_type": args.source.as_str(),
                "sync_type": sync_type,
            }),
        )
        .await?;

    output::print_success(&format!(
        "{} sync queued for deal {} (job {})",
        args.source.as_str(),
        args.deal_id,
        handle.id
    ));
    Ok(())
}
