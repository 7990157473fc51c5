//! Job definitions and types.
//!
//! This module provides the core abstractions for background jobs:
//!
//! - **QueueName**: the four job families and their retry/concurrency profiles
//! - **Typed payloads**: one payload struct per family, with sum-typed operations
//! - **JobStatus**: enumeration of queue states
//! - **JobContext**: context passed to processors during execution
//! - **RetryPolicy**: retry behavior with backoff strategies

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{ErrorCode, PulseError};
use crate::sources::SourceType;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queue Families
// ═══════════════════════════════════════════════════════════════════════════════

/// The four job families, each with its own queue.
///
/// The per-family retry and concurrency profiles are deliberate: sync jobs
/// talk to flaky third-party APIs and are cheap to retry aggressively, while
/// brief generation is the most expensive and least parallel-safe per deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    DailyBrief,
    DocumentProcessing,
    EmailProcessing,
    SourceSync,
}

impl QueueName {
    pub const ALL: [QueueName; 4] = [
        Self::DailyBrief,
        Self::DocumentProcessing,
        Self::EmailProcessing,
        Self::SourceSync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyBrief => "daily-brief",
            Self::DocumentProcessing => "document-processing",
            Self::EmailProcessing => "email-processing",
            Self::SourceSync => "source-sync",
        }
    }

    /// Default retry policy for jobs on this queue.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::DailyBrief | Self::DocumentProcessing | Self::EmailProcessing => RetryPolicy {
                max_attempts: 3,
                backoff: BackoffStrategy::exponential(5),
            },
            Self::SourceSync => RetryPolicy {
                max_attempts: 5,
                backoff: BackoffStrategy::exponential(10),
            },
        }
    }

    /// Concurrent execution slots for this queue's worker pool.
    pub fn concurrency(&self) -> usize {
        match self {
            Self::DailyBrief => 2,
            Self::DocumentProcessing => 5,
            Self::EmailProcessing => 10,
            Self::SourceSync => 3,
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Typed Payloads
// ═══════════════════════════════════════════════════════════════════════════════

/// Document enrichment operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOperation {
    Summarize,
    ExtractRisks,
    Classify,
}

impl DocumentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::ExtractRisks => "extract_risks",
            Self::Classify => "classify",
        }
    }
}

/// Email enrichment operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailOperation {
    AnalyzeSentiment,
    DetectBlocker,
}

impl EmailOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalyzeSentiment => "analyze_sentiment",
            Self::DetectBlocker => "detect_blocker",
        }
    }
}

/// Sync scope for a source-sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Full,
    Incremental,
}

/// Payload for a daily-brief job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBriefPayload {
    pub deal_id: Uuid,
    pub date: NaiveDate,
}

/// Payload for a document-processing job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPayload {
    pub document_id: Uuid,
    pub deal_id: Uuid,
    pub operation: DocumentOperation,
}

/// Payload for an email-processing job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailPayload {
    pub email_id: Uuid,
    pub deal_id: Uuid,
    pub operation: EmailOperation,
}

/// Payload for a source-sync job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSyncPayload {
    pub deal_id: Uuid,
    pub source_type: SourceType,
    pub sync_type: SyncType,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue (possibly with a retry delay)
    Waiting,
    /// Job is currently being executed
    Active,
    /// Job completed successfully
    Completed,
    /// Job failed after exhausting retries (terminal)
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for job execution failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Error message
    pub message: String,
    /// Whether this error is retryable
    pub retryable: bool,
}

impl JobError {
    /// Create a new retryable error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a new non-retryable (fatal) error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for JobError {}

impl From<PulseError> for JobError {
    fn from(error: PulseError) -> Self {
        // RecordNotFound stays retryable here: enrichment jobs can race the
        // sync transaction that creates their row, and max-attempts bounds
        // the cost of retrying a row that never appears.
        let retryable =
            error.is_retryable() || matches!(error.code(), ErrorCode::RecordNotFound);
        Self {
            message: error.to_string(),
            retryable,
        }
    }
}

/// Result type for job execution.
pub type JobResult = std::result::Result<(), JobError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Backoff Strategy
// ═══════════════════════════════════════════════════════════════════════════════

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed { delay_secs: u64 },
    /// Exponential increase in delay (initial * multiplier^attempt)
    Exponential {
        initial_delay_secs: u64,
        max_delay_secs: u64,
        multiplier: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::exponential(5)
    }
}

impl BackoffStrategy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = match self {
            Self::Fixed { delay_secs } => *delay_secs,
            Self::Exponential {
                initial_delay_secs,
                max_delay_secs,
                multiplier,
            } => {
                let delay = (*initial_delay_secs as f64) * multiplier.powi(attempt as i32);
                delay.min(*max_delay_secs as f64) as u64
            }
        };

        Duration::from_secs(secs)
    }

    /// Create a fixed backoff strategy.
    pub fn fixed(delay_secs: u64) -> Self {
        Self::Fixed { delay_secs }
    }

    /// Create an exponential backoff strategy with the given base delay.
    pub fn exponential(initial_delay_secs: u64) -> Self {
        Self::Exponential {
            initial_delay_secs,
            max_delay_secs: 3600,
            multiplier: 2.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Retry Policy
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration for job retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of execution attempts (including the first)
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Check whether a job that has run `attempts` times and failed with
    /// `error` should go back on the queue.
    pub fn should_retry(&self, attempts: u32, error: &JobError) -> bool {
        error.retryable && attempts < self.max_attempts
    }

    /// Delay before the next retry for a job that has run `attempts` times.
    pub fn next_retry_delay(&self, attempts: u32) -> Duration {
        self.backoff.delay_for_attempt(attempts.saturating_sub(1))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Metadata associated with a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Unique job identifier
    pub id: JobId,
    /// The queue this job belongs to
    pub queue: QueueName,
    /// Job type name (e.g. "generate-brief", "doc-summarize")
    pub job_type: String,
    /// Deduplication key; submissions sharing a key collapse while the
    /// holder is in a non-terminal state
    pub dedup_key: Option<String>,
    /// Current status
    pub status: JobStatus,
    /// Number of execution attempts so far
    pub attempts: u32,
    /// Maximum attempts allowed
    pub max_attempts: u32,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job becomes due (retry backoff); `None` means immediately
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When the current/last attempt started
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Last error message (if any attempt failed)
    pub last_error: Option<String>,
}

impl JobMetadata {
    /// Create new metadata for a job on the given queue, inheriting the
    /// family's retry profile.
    pub fn new(queue: QueueName, job_type: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            queue,
            job_type: job_type.into(),
            dedup_key: None,
            status: JobStatus::Waiting,
            attempts: 0,
            max_attempts: queue.retry_policy().max_attempts,
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    /// Set the deduplication key.
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Override the maximum attempts.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Mark as running (consumes an attempt).
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Active;
        self.started_at = Some(Utc::now());
        self.attempts += 1;
    }

    /// Mark as completed.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Mark as waiting for a retry.
    pub fn mark_retrying(&mut self, error: &str) {
        self.status = JobStatus::Waiting;
        self.last_error = Some(error.to_string());
    }

    /// Mark as terminally failed.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = JobStatus::Failed;
        self.finished_at = Some(Utc::now());
        self.last_error = Some(error.to_string());
    }

    /// Check if the job can be retried.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Progress update from a job.
///
/// Purely observational; progress has no bearing on job correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    /// Job ID
    pub job_id: JobId,
    /// Progress percentage (0-100)
    pub percent: u8,
    /// Status message
    pub message: Option<String>,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

/// Context passed to processors during execution.
pub struct JobContext {
    /// Job metadata
    pub metadata: JobMetadata,
    /// Progress callback
    progress_sender: Option<tokio::sync::mpsc::Sender<JobProgress>>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(metadata: JobMetadata) -> Self {
        Self {
            metadata,
            progress_sender: None,
        }
    }

    /// Set a progress sender.
    pub fn with_progress_sender(
        mut self,
        sender: tokio::sync::mpsc::Sender<JobProgress>,
    ) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    /// Get the job ID.
    pub fn job_id(&self) -> JobId {
        self.metadata.id
    }

    /// Get the current attempt number (1-indexed).
    pub fn attempt(&self) -> u32 {
        self.metadata.attempts
    }

    /// Report progress.
    pub async fn report_progress(&self, percent: u8, message: Option<String>) {
        tracing::debug!(
            job_id = %self.metadata.id,
            job_type = %self.metadata.job_type,
            percent = percent.min(100),
            "Job progress"
        );
        if let Some(ref sender) = self.progress_sender {
            let progress = JobProgress {
                job_id: self.metadata.id,
                percent: percent.min(100),
                message,
                timestamp: Utc::now(),
            };
            let _ = sender.send(progress).await;
        }
    }

    /// Log a message associated with this job.
    pub fn log_info(&self, message: &str) {
        tracing::info!(
            job_id = %self.metadata.id,
            job_type = %self.metadata.job_type,
            attempt = self.metadata.attempts,
            message
        );
    }

    /// Log a warning associated with this job.
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(
            job_id = %self.metadata.id,
            job_type = %self.metadata.job_type,
            attempt = self.metadata.attempts,
            message
        );
    }

    /// Log an error associated with this job.
    pub fn log_error(&self, message: &str) {
        tracing::error!(
            job_id = %self.metadata.id,
            job_type = %self.metadata.job_type,
            attempt = self.metadata.attempts,
            message
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_family_profiles() {
        assert_eq!(QueueName::DailyBrief.concurrency(), 2);
        assert_eq!(QueueName::DocumentProcessing.concurrency(), 5);
        assert_eq!(QueueName::EmailProcessing.concurrency(), 10);
        assert_eq!(QueueName::SourceSync.concurrency(), 3);

        assert_eq!(QueueName::DailyBrief.retry_policy().max_attempts, 3);
        assert_eq!(QueueName::SourceSync.retry_policy().max_attempts, 5);

        // Sync retries from a 10s base, the rest from 5s
        assert_eq!(
            QueueName::SourceSync.retry_policy().backoff.delay_for_attempt(0),
            Duration::from_secs(10)
        );
        assert_eq!(
            QueueName::DailyBrief.retry_policy().backoff.delay_for_attempt(0),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Waiting.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
    }

    #[test]
    fn test_backoff_fixed() {
        let backoff = BackoffStrategy::fixed(10);
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(5), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_exponential() {
        let backoff = BackoffStrategy::Exponential {
            initial_delay_secs: 5,
            max_delay_secs: 100,
            multiplier: 2.0,
        };
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(10));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_secs(20));
        // Should cap at max
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(100));
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: BackoffStrategy::fixed(1),
        };

        let retryable_error = JobError::retryable("temporary failure");
        let fatal_error = JobError::fatal("permanent failure");

        assert!(policy.should_retry(1, &retryable_error));
        assert!(policy.should_retry(2, &retryable_error));
        assert!(!policy.should_retry(3, &retryable_error)); // max attempts reached

        // Fatal errors never retry
        assert!(!policy.should_retry(1, &fatal_error));
    }

    #[test]
    fn test_job_error_from_pulse_error() {
        let network = PulseError::new(ErrorCode::NetworkError, "connection reset");
        assert!(JobError::from(network).retryable);

        let credential =
            PulseError::new(ErrorCode::CredentialRefreshFailed, "refresh token revoked");
        assert!(!JobError::from(credential).retryable);

        // Missing rows retry until attempts run out
        let missing = PulseError::not_found("Document", "abc");
        assert!(JobError::from(missing).retryable);
    }

    #[test]
    fn test_job_metadata_lifecycle() {
        let mut metadata = JobMetadata::new(QueueName::DailyBrief, "generate-brief")
            .with_dedup_key("brief-x-2026-08-06");

        assert_eq!(metadata.status, JobStatus::Waiting);
        assert_eq!(metadata.max_attempts, 3);

        metadata.mark_running();
        assert_eq!(metadata.status, JobStatus::Active);
        assert_eq!(metadata.attempts, 1);

        metadata.mark_retrying("transient");
        assert_eq!(metadata.status, JobStatus::Waiting);

        metadata.mark_running();
        metadata.mark_completed();
        assert_eq!(metadata.status, JobStatus::Completed);
        assert_eq!(metadata.attempts, 2);
        assert!(metadata.finished_at.is_some());
    }

    #[test]
    fn test_operation_serialization() {
        // Wire format used in job payloads
        assert_eq!(
            serde_json::to_value(DocumentOperation::ExtractRisks).unwrap(),
            serde_json::json!("extract_risks")
        );
        assert_eq!(
            serde_json::to_value(EmailOperation::AnalyzeSentiment).unwrap(),
            serde_json::json!("analyze_sentiment")
        );
        assert_eq!(
            serde_json::to_value(QueueName::DailyBrief).unwrap(),
            serde_json::json!("daily-brief")
        );
    }
}
