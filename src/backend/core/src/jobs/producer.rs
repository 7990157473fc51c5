//! Typed job producers.
//!
//! `JobQueues` is the explicitly constructed bundle of the four family
//! queues. It is built once at process start and handed to whoever needs to
//! submit work; there is no global queue state.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{
    DailyBriefPayload, DocumentOperation, DocumentPayload, EmailOperation, EmailPayload,
    JobHandle, JobMetadata, JobQueue, QueueName, QueueStats, SourceSyncPayload, SyncType,
};
use crate::error::Result;
use crate::sources::SourceType;

/// Statistics for all four queues.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AllQueueStats {
    pub daily_brief: QueueStats,
    pub document_processing: QueueStats,
    pub email_processing: QueueStats,
    pub source_sync: QueueStats,
}

/// The four job-family queues.
pub struct JobQueues {
    daily_brief: JobQueue,
    document_processing: JobQueue,
    email_processing: JobQueue,
    source_sync: JobQueue,
}

impl JobQueues {
    /// Create Redis-backed queues sharing one client.
    pub fn redis(client: redis::Client) -> Self {
        Self {
            daily_brief: JobQueue::redis(QueueName::DailyBrief, client.clone()),
            document_processing: JobQueue::redis(QueueName::DocumentProcessing, client.clone()),
            email_processing: JobQueue::redis(QueueName::EmailProcessing, client.clone()),
            source_sync: JobQueue::redis(QueueName::SourceSync, client),
        }
    }

    /// Create in-memory queues (for testing).
    pub fn in_memory() -> Self {
        Self {
            daily_brief: JobQueue::in_memory(QueueName::DailyBrief),
            document_processing: JobQueue::in_memory(QueueName::DocumentProcessing),
            email_processing: JobQueue::in_memory(QueueName::EmailProcessing),
            source_sync: JobQueue::in_memory(QueueName::SourceSync),
        }
    }

    /// Get the queue for a family.
    pub fn queue(&self, name: QueueName) -> &JobQueue {
        match name {
            QueueName::DailyBrief => &self.daily_brief,
            QueueName::DocumentProcessing => &self.document_processing,
            QueueName::EmailProcessing => &self.email_processing,
            QueueName::SourceSync => &self.source_sync,
        }
    }

    /// Queue a daily brief generation job.
    ///
    /// One logical job exists per (deal, date): the dedup key collapses the
    /// scheduler's submission and any manual trigger into a single run.
    pub async fn enqueue_daily_brief(
        &self,
        deal_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<JobHandle> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let payload = DailyBriefPayload { deal_id, date };

        let metadata = JobMetadata::new(QueueName::DailyBrief, "generate-brief")
            .with_dedup_key(format!("brief-{}-{}", deal_id, date));

        let handle = self
            .daily_brief
            .submit(metadata, serde_json::to_value(&payload)?)
            .await?;

        tracing::info!(
            deal_id = %deal_id,
            date = %date,
            job_id = %handle.id,
            deduplicated = handle.deduplicated,
            "Queued daily brief"
        );
        Ok(handle)
    }

    /// Queue a document enrichment job.
    pub async fn enqueue_document_processing(
        &self,
        document_id: Uuid,
        deal_id: Uuid,
        operation: DocumentOperation,
    ) -> Result<JobHandle> {
        let payload = DocumentPayload {
            document_id,
            deal_id,
            operation,
        };

        let metadata = JobMetadata::new(
            QueueName::DocumentProcessing,
            format!("doc-{}", operation.as_str()),
        );

        let handle = self
            .document_processing
            .submit(metadata, serde_json::to_value(&payload)?)
            .await?;

        tracing::info!(
            document_id = %document_id,
            operation = operation.as_str(),
            job_id = %handle.id,
            "Queued document processing"
        );
        Ok(handle)
    }

    /// Queue an email enrichment job.
    pub async fn enqueue_email_processing(
        &self,
        email_id: Uuid,
        deal_id: Uuid,
        operation: EmailOperation,
    ) -> Result<JobHandle> {
        let payload = EmailPayload {
            email_id,
            deal_id,
            operation,
        };

        let metadata = JobMetadata::new(
            QueueName::EmailProcessing,
            format!("email-{}", operation.as_str()),
        );

        let handle = self
            .email_processing
            .submit(metadata, serde_json::to_value(&payload)?)
            .await?;

        tracing::info!(
            email_id = %email_id,
            operation = operation.as_str(),
            job_id = %handle.id,
            "Queued email processing"
        );
        Ok(handle)
    }

    /// Queue a source sync job.
    ///
    /// The timestamped dedup key suppresses accidental double submission
    /// within the same second without blocking back-to-back syncs.
    pub async fn enqueue_source_sync(
        &self,
        deal_id: Uuid,
        source_type: SourceType,
        sync_type: SyncType,
    ) -> Result<JobHandle> {
        let payload = SourceSyncPayload {
            deal_id,
            source_type,
            sync_type,
        };

        let metadata = JobMetadata::new(
            QueueName::SourceSync,
            format!("sync-{}", source_type.as_str()),
        )
        .with_dedup_key(format!(
            "sync-{}-{}-{}",
            deal_id,
            source_type.as_str(),
            Utc::now().timestamp()
        ));

        let handle = self
            .source_sync
            .submit(metadata, serde_json::to_value(&payload)?)
            .await?;

        tracing::info!(
            deal_id = %deal_id,
            source_type = source_type.as_str(),
            job_id = %handle.id,
            "Queued source sync"
        );
        Ok(handle)
    }

    /// Get statistics for all queues.
    pub async fn stats(&self) -> Result<AllQueueStats> {
        let (daily_brief, document_processing, email_processing, source_sync) = tokio::try_join!(
            self.daily_brief.stats(),
            self.document_processing.stats(),
            self.email_processing.stats(),
            self.source_sync.stats(),
        )?;

        Ok(AllQueueStats {
            daily_brief,
            document_processing,
            email_processing,
            source_sync,
        })
    }

    /// Shut the queue bundle down.
    ///
    /// Connections are per-call, so this is a lifecycle marker rather than a
    /// teardown; it exists so the owner has an explicit close to pair with
    /// construction.
    pub async fn close(&self) {
        tracing::info!("Job queues closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daily_brief_dedup_key_is_per_deal_and_date() {
        let queues = JobQueues::in_memory();
        let deal = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();

        let first = queues.enqueue_daily_brief(deal, Some(date)).await.unwrap();
        let second = queues.enqueue_daily_brief(deal, Some(date)).await.unwrap();

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(second.id, first.id);

        // A different date is a different logical job
        let other_date = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let third = queues
            .enqueue_daily_brief(deal, Some(other_date))
            .await
            .unwrap();
        assert!(!third.deduplicated);
    }

    #[tokio::test]
    async fn test_enrichment_jobs_have_no_dedup() {
        let queues = JobQueues::in_memory();
        let doc = Uuid::new_v4();
        let deal = Uuid::new_v4();

        let first = queues
            .enqueue_document_processing(doc, deal, DocumentOperation::Summarize)
            .await
            .unwrap();
        let second = queues
            .enqueue_document_processing(doc, deal, DocumentOperation::Summarize)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);

        let stats = queues.stats().await.unwrap();
        assert_eq!(stats.document_processing.waiting, 2);
    }
}
