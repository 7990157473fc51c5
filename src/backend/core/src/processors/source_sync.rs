//! Source sync processor.
//!
//! Per invocation: resolve the (deal, source) connection, list changed
//! items through the normalized adapter contract, upsert them by
//! source-native id, and fan out enrichment jobs for anything new or
//! updated. A missing or inactive connection is a legitimate zero-item
//! success, not an error.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::{Database, DocumentUpsert, SourceConnectionRow};
use crate::error::{ErrorCode, PulseError};
use crate::jobs::{
    DocumentOperation, EmailOperation, JobContext, JobError, JobQueues, JobResult, Processor,
    SourceSyncPayload, SyncType,
};
use crate::sources::{
    AuthCircuitBreaker, ConnectionSettings, ItemDetail, SourceAdapters, TokenProvider,
};

/// Counts for one sync pass.
#[derive(Debug, Default)]
struct SyncOutcome {
    scanned: usize,
    new_documents: usize,
    updated_documents: usize,
    new_emails: usize,
}

/// Handles syncing from external sources.
pub struct SourceSyncProcessor {
    db: Arc<Database>,
    queues: Arc<JobQueues>,
    adapters: Arc<SourceAdapters>,
    tokens: Arc<dyn TokenProvider>,
    circuit: Arc<AuthCircuitBreaker>,
}

impl SourceSyncProcessor {
    pub fn new(
        db: Arc<Database>,
        queues: Arc<JobQueues>,
        adapters: Arc<SourceAdapters>,
        tokens: Arc<dyn TokenProvider>,
        circuit: Arc<AuthCircuitBreaker>,
    ) -> Self {
        Self {
            db,
            queues,
            adapters,
            tokens,
            circuit,
        }
    }

    /// Record a credential failure; when the breaker trips, deactivate the
    /// connection so we stop hammering a dead credential.
    async fn handle_auth_failure(&self, connection: &SourceConnectionRow, error: &PulseError) {
        if self.circuit.record_failure(connection.id) {
            if let Err(e) = self.db.deactivate_connection(connection.id).await {
                tracing::error!(
                    connection_id = %connection.id,
                    error = %e,
                    "Failed to deactivate connection after repeated auth failures"
                );
            } else {
                tracing::warn!(
                    connection_id = %connection.id,
                    source_type = %connection.source_type,
                    "Connection deactivated after repeated auth failures"
                );
            }
            self.circuit.reset(connection.id);
        }
        tracing::warn!(connection_id = %connection.id, error = %error, "Credential failure during sync");
    }
}

#[async_trait]
impl Processor for SourceSyncProcessor {
    type Payload = SourceSyncPayload;

    fn name(&self) -> &'static str {
        "source-sync"
    }

    async fn process(&self, payload: Self::Payload, ctx: &JobContext) -> JobResult {
        let source = payload.source_type;
        ctx.log_info(&format!(
            "Syncing {} for deal {}",
            source, payload.deal_id
        ));

        let Some(connection) = self
            .db
            .active_connection(payload.deal_id, source.as_str())
            .await?
        else {
            // Connections are optionally configured per deal
            ctx.log_info(&format!(
                "No active {} connection for deal {}, nothing to sync",
                source, payload.deal_id
            ));
            ctx.report_progress(100, Some("No connection".to_string())).await;
            return Ok(());
        };

        ctx.report_progress(10, None).await;

        let token = match self.tokens.access_token(&connection).await {
            Ok(token) => {
                self.circuit.record_success(connection.id);
                token
            }
            Err(e) if e.code() == ErrorCode::NoActiveConnection => {
                ctx.log_info("Connection reported inactive, nothing to sync");
                return Ok(());
            }
            Err(e) if e.code() == ErrorCode::CredentialRefreshFailed => {
                self.handle_auth_failure(&connection, &e).await;
                return Err(JobError::fatal(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let settings = ConnectionSettings::from_value(&connection.settings);
        let since = match payload.sync_type {
            SyncType::Incremental => connection.last_synced_at,
            SyncType::Full => None,
        };

        let adapter = self.adapters.get(source);
        let items = match adapter
            .list_changed_items(&settings, &token, since)
            .await
        {
            Ok(items) => items,
            Err(e) if e.code() == ErrorCode::CredentialRefreshFailed => {
                self.handle_auth_failure(&connection, &e).await;
                return Err(JobError::fatal(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        ctx.report_progress(40, Some(format!("{} items listed", items.len()))).await;

        let mut outcome = SyncOutcome {
            scanned: items.len(),
            ..Default::default()
        };

        for item in items {
            match item.detail {
                ItemDetail::Document => {
                    let upsert = self
                        .db
                        .upsert_document(
                            payload.deal_id,
                            &item.title,
                            source.as_str(),
                            &item.source_id,
                            item.url.as_deref(),
                            item.modified_at,
                        )
                        .await?;

                    match upsert {
                        DocumentUpsert::Inserted(_) => outcome.new_documents += 1,
                        DocumentUpsert::Updated(_) => outcome.updated_documents += 1,
                        DocumentUpsert::Unchanged(_) => {}
                    }

                    if upsert.needs_processing() {
                        self.queues
                            .enqueue_document_processing(
                                upsert.id(),
                                payload.deal_id,
                                DocumentOperation::Summarize,
                            )
                            .await?;
                    }
                }
                ItemDetail::Email {
                    thread_id,
                    sender,
                    snippet,
                    body,
                } => {
                    let inserted = self
                        .db
                        .insert_communication_if_absent(
                            payload.deal_id,
                            &item.title,
                            &sender,
                            snippet.as_deref(),
                            body.as_deref(),
                            thread_id.as_deref(),
                            source.as_str(),
                            &item.source_id,
                            item.modified_at,
                        )
                        .await?;

                    if let Some(email_id) = inserted {
                        outcome.new_emails += 1;
                        self.queues
                            .enqueue_email_processing(
                                email_id,
                                payload.deal_id,
                                EmailOperation::AnalyzeSentiment,
                            )
                            .await?;
                    }
                }
            }
        }

        self.db.touch_last_synced(connection.id).await?;
        ctx.report_progress(100, None).await;

        ctx.log_info(&format!(
            "{} sync complete: {} scanned, {} new documents, {} updated documents, {} new emails",
            source,
            outcome.scanned,
            outcome.new_documents,
            outcome.updated_documents,
            outcome.new_emails
        ));
        Ok(())
    }
}
