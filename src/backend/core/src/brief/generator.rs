//! Brief generation service: fetch, aggregate, persist.
//!
//! Generation is atomic: if any input fetch fails the whole generation
//! fails and is retried as a unit. No partial brief is ever persisted.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::aggregator::aggregate;
use super::types::{BriefData, ProgressSnapshot};
use crate::db::Database;
use crate::error::Result;

/// Generates and persists daily briefs.
pub struct BriefGenerator {
    db: Arc<Database>,
}

impl BriefGenerator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Compose the brief for a deal as of now.
    pub async fn generate(&self, deal_id: Uuid, date: NaiveDate) -> Result<BriefData> {
        let (documents, communications, workstreams, previous) = tokio::try_join!(
            self.db.documents_for_deal(deal_id),
            self.db.communications_for_deal(deal_id),
            self.db.workstreams_for_deal(deal_id),
            self.db.latest_brief_before(deal_id, date),
        )?;

        // A prior brief whose snapshot no longer deserializes is treated as
        // absent rather than failing generation.
        let previous_snapshot: Option<ProgressSnapshot> = previous
            .as_ref()
            .and_then(|b| serde_json::from_value(b.progress_snapshot.clone()).ok());

        Ok(aggregate(
            &documents,
            &communications,
            &workstreams,
            previous_snapshot.as_ref(),
            Utc::now(),
        ))
    }

    /// Persist a brief, replacing any prior brief for the same (deal, date).
    pub async fn save(&self, deal_id: Uuid, date: NaiveDate, data: &BriefData) -> Result<Uuid> {
        let brief_id = self.db.upsert_brief(deal_id, date, data).await?;
        tracing::info!(deal_id = %deal_id, brief_date = %date, brief_id = %brief_id, "Brief saved");
        Ok(brief_id)
    }
}
