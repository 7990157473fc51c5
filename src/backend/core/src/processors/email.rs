//! Email processing processor.
//!
//! Sentiment analysis and blocker detection for a single email. Blocker
//! detection escalates to the full thread when one exists; on a positive
//! thread-level signal only the triggering email is updated. Sibling
//! messages keep their own analysis, which is the granularity per-message
//! jobs give us.

use async_trait::async_trait;
use std::sync::Arc;

use crate::ai::{AiCapability, ThreadMessage};
use crate::db::{CommunicationRow, Database, Sentiment};
use crate::error::PulseError;
use crate::jobs::{EmailOperation, EmailPayload, JobContext, JobResult, Processor};

/// Handles email sentiment analysis and blocker detection.
pub struct EmailProcessor {
    db: Arc<Database>,
    ai: Arc<dyn AiCapability>,
}

impl EmailProcessor {
    pub fn new(db: Arc<Database>, ai: Arc<dyn AiCapability>) -> Self {
        Self { db, ai }
    }

    async fn analyze_standalone(&self, email: &CommunicationRow, ctx: &JobContext) -> JobResult {
        let content = email
            .body
            .as_deref()
            .or(email.snippet.as_deref())
            .unwrap_or("");

        let analysis = self
            .ai
            .analyze_sentiment(&email.subject, content, &email.sender)
            .await?;

        self.db
            .set_communication_analysis(email.id, analysis.sentiment, analysis.is_blocker)
            .await?;

        ctx.log_info(&format!(
            "Sentiment recorded: {} (blocker: {})",
            analysis.sentiment.as_str(),
            analysis.is_blocker
        ));
        Ok(())
    }

    async fn detect_blocker(&self, email: &CommunicationRow, ctx: &JobContext) -> JobResult {
        let Some(thread_id) = email.thread_id.as_deref() else {
            // No thread context; fall back to standalone analysis
            return self.analyze_standalone(email, ctx).await;
        };

        let messages = self.db.thread_messages(email.deal_id, thread_id).await?;
        let thread: Vec<ThreadMessage> = messages
            .iter()
            .map(|m| ThreadMessage {
                subject: m.subject.clone(),
                sender: m.sender.clone(),
                snippet: m.snippet.clone().unwrap_or_default(),
                date: m.received_at,
            })
            .collect();

        let detection = self.ai.detect_thread_blocker(&thread).await?;

        if detection.has_blocker {
            self.db
                .set_communication_analysis(email.id, Sentiment::Blocker, true)
                .await?;
            ctx.log_info(&format!(
                "Thread blocker detected: {}",
                detection.blocker_title.as_deref().unwrap_or("(untitled)")
            ));
        } else {
            ctx.log_info("No blocker found in thread");
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for EmailProcessor {
    type Payload = EmailPayload;

    fn name(&self) -> &'static str {
        "email-processing"
    }

    async fn process(&self, payload: Self::Payload, ctx: &JobContext) -> JobResult {
        ctx.log_info(&format!(
            "Processing email {}: {}",
            payload.email_id,
            payload.operation.as_str()
        ));
        ctx.report_progress(30, None).await;

        let email = self
            .db
            .get_communication(payload.email_id)
            .await?
            .ok_or_else(|| PulseError::not_found("Email", payload.email_id.to_string()))?;

        match payload.operation {
            EmailOperation::AnalyzeSentiment => self.analyze_standalone(&email, ctx).await?,
            EmailOperation::DetectBlocker => self.detect_blocker(&email, ctx).await?,
        }

        ctx.report_progress(100, None).await;
        Ok(())
    }
}
