//! Database layer for DealPulse.
//!
//! Uses PostgreSQL for persistent storage with sqlx. All writes are scoped
//! by deal id; ingestion upserts go through natural keys
//! (`(deal_id, source_id)` for documents and communications,
//! `(deal_id, brief_date)` for briefs) so that re-execution converges
//! instead of duplicating rows.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// Status Vocabularies
// ═══════════════════════════════════════════════════════════════════════════════

/// Deal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealStatus {
    Active,
    Paused,
    Closed,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Closed => "closed",
        }
    }
}

/// Document lifecycle status.
///
/// Sync owns `new` and `updated`; only an explicit user action (outside
/// this service) sets `reviewed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    New,
    Updated,
    Reviewed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Reviewed => "reviewed",
        }
    }
}

/// Communication sentiment assigned by the email processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Risk,
    Blocker,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Risk => "risk",
            Self::Blocker => "blocker",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types (for sqlx queries)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct DealRow {
    pub id: Uuid,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkstreamRow {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub name: String,
    pub status: String,
}

/// A document joined with its workstream name (if assigned).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub workstream_id: Option<Uuid>,
    pub workstream_name: Option<String>,
    pub name: String,
    pub status: String,
    pub source_type: String,
    pub source_id: String,
    pub source_url: Option<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_ingested_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommunicationRow {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub subject: String,
    pub sender: String,
    pub snippet: Option<String>,
    pub body: Option<String>,
    pub thread_id: Option<String>,
    pub source_type: String,
    pub source_id: String,
    pub sentiment: Option<String>,
    pub is_blocker: bool,
    pub status: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceConnectionRow {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub source_type: String,
    pub is_active: bool,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub settings: serde_json::Value,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BriefRow {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub brief_date: NaiveDate,
    pub status: String,
    pub progress_snapshot: serde_json::Value,
    pub changes: serde_json::Value,
    pub blockers: serde_json::Value,
    pub risks: serde_json::Value,
    pub communications: serde_json::Value,
    pub published_at: Option<DateTime<Utc>>,
}

/// Outcome of a document ingestion upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentUpsert {
    /// A new document row was created.
    Inserted(Uuid),
    /// The source item is newer than the stored row; status moved to `updated`.
    Updated(Uuid),
    /// The stored row is current; only the ingestion timestamp was touched.
    Unchanged(Uuid),
}

impl DocumentUpsert {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Inserted(id) | Self::Updated(id) | Self::Unchanged(id) => *id,
        }
    }

    /// True when the item should flow on to enrichment.
    pub fn needs_processing(&self) -> bool {
        matches!(self, Self::Inserted(_) | Self::Updated(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Database
// ═══════════════════════════════════════════════════════════════════════════════

/// Database connection and operations.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::PulseError::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Deal Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// All deals the scheduler fans out over.
    pub async fn active_deals(&self) -> Result<Vec<DealRow>> {
        let rows = sqlx::query_as::<_, DealRow>(
            r#"
            SELECT id, name, status
            FROM deals
            WHERE status = 'active'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_deal(&self, deal_id: Uuid) -> Result<Option<DealRow>> {
        let row = sqlx::query_as::<_, DealRow>(
            "SELECT id, name, status FROM deals WHERE id = $1",
        )
        .bind(deal_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Workstream Operations
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn workstreams_for_deal(&self, deal_id: Uuid) -> Result<Vec<WorkstreamRow>> {
        let rows = sqlx::query_as::<_, WorkstreamRow>(
            r#"
            SELECT id, deal_id, name, status
            FROM workstreams
            WHERE deal_id = $1
            ORDER BY name
            "#,
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Look up a workstream by (case-insensitive) name, for mapping AI
    /// classification labels onto the deal's actual workstreams.
    pub async fn workstream_by_name(
        &self,
        deal_id: Uuid,
        name: &str,
    ) -> Result<Option<WorkstreamRow>> {
        let row = sqlx::query_as::<_, WorkstreamRow>(
            r#"
            SELECT id, deal_id, name, status
            FROM workstreams
            WHERE deal_id = $1 AND LOWER(name) = LOWER($2)
            "#,
        )
        .bind(deal_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Document Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// All documents for a deal, joined with workstream names.
    pub async fn documents_for_deal(&self, deal_id: Uuid) -> Result<Vec<DocumentRow>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT d.id, d.deal_id, d.workstream_id, w.name AS workstream_name,
                   d.name, d.status, d.source_type, d.source_id, d.source_url,
                   d.summary, d.created_at, d.updated_at, d.last_ingested_at
            FROM documents d
            LEFT JOIN workstreams w ON w.id = d.workstream_id
            WHERE d.deal_id = $1
            ORDER BY d.updated_at DESC
            "#,
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_document(&self, document_id: Uuid) -> Result<Option<DocumentRow>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT d.id, d.deal_id, d.workstream_id, w.name AS workstream_name,
                   d.name, d.status, d.source_type, d.source_id, d.source_url,
                   d.summary, d.created_at, d.updated_at, d.last_ingested_at
            FROM documents d
            LEFT JOIN workstreams w ON w.id = d.workstream_id
            WHERE d.id = $1
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Ingestion upsert by `(deal_id, source_id)`.
    ///
    /// New items insert with status `new`; known items whose source
    /// modification time is newer than the stored `updated_at` move to
    /// `updated`; otherwise only `last_ingested_at` is touched. Concurrent
    /// syncs converge on the unique constraint.
    pub async fn upsert_document(
        &self,
        deal_id: Uuid,
        name: &str,
        source_type: &str,
        source_id: &str,
        source_url: Option<&str>,
        modified_at: DateTime<Utc>,
    ) -> Result<DocumentUpsert> {
        let existing = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            "SELECT id, updated_at FROM documents WHERE deal_id = $1 AND source_id = $2",
        )
        .bind(deal_id)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id, updated_at)) = existing {
            if modified_at > updated_at {
                sqlx::query(
                    r#"
                    UPDATE documents
                    SET status = 'updated', updated_at = now(), last_ingested_at = now()
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .execute(&self.pool)
                .await?;

                return Ok(DocumentUpsert::Updated(id));
            }

            sqlx::query("UPDATE documents SET last_ingested_at = now() WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            return Ok(DocumentUpsert::Unchanged(id));
        }

        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO documents (deal_id, name, status, source_type, source_id, source_url, last_ingested_at)
            VALUES ($1, $2, 'new', $3, $4, $5, now())
            ON CONFLICT (deal_id, source_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(deal_id)
        .bind(name)
        .bind(source_type)
        .bind(source_id)
        .bind(source_url)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some((id,)) => Ok(DocumentUpsert::Inserted(id)),
            // Lost an insert race to a concurrent sync; the winner's row stands.
            None => {
                let (id,): (Uuid,) = sqlx::query_as(
                    "SELECT id FROM documents WHERE deal_id = $1 AND source_id = $2",
                )
                .bind(deal_id)
                .bind(source_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(DocumentUpsert::Unchanged(id))
            }
        }
    }

    /// Persist an AI summary. Enrichment only; ingestion fields untouched.
    pub async fn set_document_summary(&self, document_id: Uuid, summary: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET summary = $2 WHERE id = $1")
            .bind(document_id)
            .bind(summary)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Assign a workstream. Enrichment only; ingestion fields untouched.
    pub async fn assign_workstream(&self, document_id: Uuid, workstream_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE documents SET workstream_id = $2 WHERE id = $1")
            .bind(document_id)
            .bind(workstream_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persist AI-extracted risk notes.
    pub async fn set_document_risks(
        &self,
        document_id: Uuid,
        risks: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query("UPDATE documents SET risk_notes = $2 WHERE id = $1")
            .bind(document_id)
            .bind(risks)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Communication Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// All communications for a deal, newest first.
    pub async fn communications_for_deal(&self, deal_id: Uuid) -> Result<Vec<CommunicationRow>> {
        let rows = sqlx::query_as::<_, CommunicationRow>(
            r#"
            SELECT id, deal_id, subject, sender, snippet, body, thread_id,
                   source_type, source_id, sentiment, is_blocker, status, received_at
            FROM communications
            WHERE deal_id = $1
            ORDER BY received_at DESC
            "#,
        )
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn get_communication(
        &self,
        communication_id: Uuid,
    ) -> Result<Option<CommunicationRow>> {
        let row = sqlx::query_as::<_, CommunicationRow>(
            r#"
            SELECT id, deal_id, subject, sender, snippet, body, thread_id,
                   source_type, source_id, sentiment, is_blocker, status, received_at
            FROM communications
            WHERE id = $1
            "#,
        )
        .bind(communication_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Insert a synced email; returns `None` when the `(deal_id, source_id)`
    /// pair already exists. Delivered email never changes, so there is no
    /// update arm.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_communication_if_absent(
        &self,
        deal_id: Uuid,
        subject: &str,
        sender: &str,
        snippet: Option<&str>,
        body: Option<&str>,
        thread_id: Option<&str>,
        source_type: &str,
        source_id: &str,
        received_at: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO communications
                (deal_id, subject, sender, snippet, body, thread_id,
                 source_type, source_id, status, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'new', $9)
            ON CONFLICT (deal_id, source_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(deal_id)
        .bind(subject)
        .bind(sender)
        .bind(snippet)
        .bind(body)
        .bind(thread_id)
        .bind(source_type)
        .bind(source_id)
        .bind(received_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.map(|(id,)| id))
    }

    /// Persist sentiment/blocker analysis. Enrichment only.
    pub async fn set_communication_analysis(
        &self,
        communication_id: Uuid,
        sentiment: Sentiment,
        is_blocker: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE communications
            SET sentiment = $2, is_blocker = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(communication_id)
        .bind(sentiment.as_str())
        .bind(is_blocker)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All messages in a thread, oldest first (the order blocker detection
    /// reads them in).
    pub async fn thread_messages(
        &self,
        deal_id: Uuid,
        thread_id: &str,
    ) -> Result<Vec<CommunicationRow>> {
        let rows = sqlx::query_as::<_, CommunicationRow>(
            r#"
            SELECT id, deal_id, subject, sender, snippet, body, thread_id,
                   source_type, source_id, sentiment, is_blocker, status, received_at
            FROM communications
            WHERE deal_id = $1 AND thread_id = $2
            ORDER BY received_at ASC
            "#,
        )
        .bind(deal_id)
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Source Connection Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// The active connection for a (deal, source type), if configured.
    pub async fn active_connection(
        &self,
        deal_id: Uuid,
        source_type: &str,
    ) -> Result<Option<SourceConnectionRow>> {
        let row = sqlx::query_as::<_, SourceConnectionRow>(
            r#"
            SELECT id, deal_id, source_type, is_active, access_token,
                   refresh_token, token_expires_at, settings, last_synced_at
            FROM source_connections
            WHERE deal_id = $1 AND source_type = $2 AND is_active = true
            "#,
        )
        .bind(deal_id)
        .bind(source_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Flip a connection inactive (auth circuit breaker tripped, or the
    /// refresh token is gone for good).
    pub async fn deactivate_connection(&self, connection_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE source_connections SET is_active = false, updated_at = now() WHERE id = $1",
        )
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist rotated tokens after a successful refresh.
    pub async fn update_connection_tokens(
        &self,
        connection_id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE source_connections
            SET access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                token_expires_at = $4,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(connection_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a completed sync pass.
    pub async fn touch_last_synced(&self, connection_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE source_connections SET last_synced_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Brief Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Insert or fully replace the brief for `(deal_id, brief_date)`.
    ///
    /// Regeneration replaces; the unique constraint guarantees one brief per
    /// deal per day no matter how many times generation runs.
    pub async fn upsert_brief(
        &self,
        deal_id: Uuid,
        brief_date: NaiveDate,
        payload: &crate::brief::BriefData,
    ) -> Result<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO briefs
                (deal_id, brief_date, status, progress_snapshot, changes,
                 blockers, risks, communications, published_at)
            VALUES ($1, $2, 'published', $3, $4, $5, $6, $7, now())
            ON CONFLICT (deal_id, brief_date) DO UPDATE SET
                status = EXCLUDED.status,
                progress_snapshot = EXCLUDED.progress_snapshot,
                changes = EXCLUDED.changes,
                blockers = EXCLUDED.blockers,
                risks = EXCLUDED.risks,
                communications = EXCLUDED.communications,
                published_at = now()
            RETURNING id
            "#,
        )
        .bind(deal_id)
        .bind(brief_date)
        .bind(serde_json::to_value(&payload.progress_snapshot)?)
        .bind(serde_json::to_value(&payload.changes)?)
        .bind(serde_json::to_value(&payload.blockers)?)
        .bind(serde_json::to_value(&payload.risks)?)
        .bind(serde_json::to_value(&payload.communications)?)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// The most recent brief strictly before `date` (for progress deltas).
    pub async fn latest_brief_before(
        &self,
        deal_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<BriefRow>> {
        let row = sqlx::query_as::<_, BriefRow>(
            r#"
            SELECT id, deal_id, brief_date, status, progress_snapshot, changes,
                   blockers, risks, communications, published_at
            FROM briefs
            WHERE deal_id = $1 AND brief_date < $2
            ORDER BY brief_date DESC
            LIMIT 1
            "#,
        )
        .bind(deal_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
