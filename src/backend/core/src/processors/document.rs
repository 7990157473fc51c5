//! Document processing processor.
//!
//! Single-item AI enrichment: summarization, workstream classification,
//! and risk extraction. Only enrichment fields are written; ingestion
//! fields are never touched, so re-running any operation converges.

use async_trait::async_trait;
use std::sync::Arc;

use crate::ai::AiCapability;
use crate::db::Database;
use crate::error::PulseError;
use crate::jobs::{DocumentOperation, DocumentPayload, JobContext, JobResult, Processor};

/// Handles document summarization, classification, and risk extraction.
pub struct DocumentProcessor {
    db: Arc<Database>,
    ai: Arc<dyn AiCapability>,
}

impl DocumentProcessor {
    pub fn new(db: Arc<Database>, ai: Arc<dyn AiCapability>) -> Self {
        Self { db, ai }
    }
}

#[async_trait]
impl Processor for DocumentProcessor {
    type Payload = DocumentPayload;

    fn name(&self) -> &'static str {
        "document-processing"
    }

    async fn process(&self, payload: Self::Payload, ctx: &JobContext) -> JobResult {
        ctx.log_info(&format!(
            "Processing document {}: {}",
            payload.document_id,
            payload.operation.as_str()
        ));
        ctx.report_progress(30, None).await;

        let document = self
            .db
            .get_document(payload.document_id)
            .await?
            .ok_or_else(|| {
                PulseError::not_found("Document", payload.document_id.to_string())
            })?;

        // Source content is not mirrored locally; enrichment works from the
        // document name and whatever summary context already exists.
        let content = document.summary.as_deref().unwrap_or("");

        match payload.operation {
            DocumentOperation::Summarize => {
                let summary = self.ai.summarize(&document.name, content).await?;
                self.db
                    .set_document_summary(document.id, &summary)
                    .await?;
                ctx.log_info("Summary updated");
            }
            DocumentOperation::Classify => {
                if document.workstream_id.is_some() {
                    // A deliberate prior assignment outranks AI re-classification
                    ctx.log_info("Document already classified, skipping");
                    ctx.report_progress(100, Some("Already classified".to_string())).await;
                    return Ok(());
                }

                let classification = self.ai.classify(&document.name, content).await?;
                match self
                    .db
                    .workstream_by_name(document.deal_id, &classification.workstream)
                    .await?
                {
                    Some(workstream) => {
                        self.db
                            .assign_workstream(document.id, workstream.id)
                            .await?;
                        ctx.log_info(&format!(
                            "Classified into workstream {} (confidence {})",
                            workstream.name, classification.confidence
                        ));
                    }
                    None => {
                        ctx.log_warn(&format!(
                            "No workstream named '{}' on this deal, leaving unassigned",
                            classification.workstream
                        ));
                    }
                }
            }
            DocumentOperation::ExtractRisks => {
                let risks = self.ai.extract_risks(&document.name, content).await?;
                let notes = serde_json::to_value(&risks).map_err(PulseError::from)?;
                self.db.set_document_risks(document.id, &notes).await?;
                ctx.log_info(&format!("{} risks recorded", risks.len()));
            }
        }

        ctx.report_progress(100, None).await;
        Ok(())
    }
}
