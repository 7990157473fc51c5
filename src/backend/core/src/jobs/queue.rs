//! Durable job queue with idempotent submission and retry delays.
//!
//! Each queue tracks jobs through `waiting -> active -> completed | failed`
//! and holds a dedup registry: a submission whose dedup key is already held
//! by a non-terminal job is a no-op that returns the existing handle. This
//! is what prevents duplicate daily-brief generation when the scheduler and
//! a manual trigger race for the same deal and date.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JobId, JobMetadata, QueueName};
use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// Queue Types
// ═══════════════════════════════════════════════════════════════════════════════

/// A job in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Job metadata
    pub metadata: JobMetadata,
    /// Serialized job payload
    pub data: serde_json::Value,
}

/// Handle returned from a job submission.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    /// The job's stable identifier
    pub id: JobId,
    /// The queue it lives on
    pub queue: QueueName,
    /// True when the submission collapsed into an existing job via dedup key
    pub deduplicated: bool,
}

/// Queue statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting to run (including delayed retries)
    pub waiting: u64,
    /// Jobs currently executing
    pub active: u64,
    /// Jobs completed successfully (total)
    pub completed: u64,
    /// Jobs terminally failed (total)
    pub failed: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queue Backend Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage backend for a single queue.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append a job, due immediately.
    async fn enqueue(&self, job: QueuedJob) -> Result<()>;

    /// Pop the next job that is due at `now`, marking it active.
    async fn dequeue_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>>;

    /// Put a previously-active job back with a retry delay. The dedup key
    /// (if any) stays held: the job is still non-terminal.
    async fn requeue(&self, job: QueuedJob, delay: Duration) -> Result<()>;

    /// Record successful completion of an active job, releasing its dedup key.
    async fn complete(&self, job: &QueuedJob) -> Result<()>;

    /// Record terminal failure of an active job, releasing its dedup key.
    async fn fail(&self, job: &QueuedJob) -> Result<()>;

    /// Reserve a dedup key for `job_id`. Returns the holder's id when the
    /// key is already held by a non-terminal job.
    async fn try_reserve_dedup(&self, key: &str, job_id: JobId) -> Result<Option<JobId>>;

    /// Release a dedup key without recording an outcome (enqueue failed
    /// after the reservation).
    async fn release_dedup(&self, key: &str) -> Result<()>;

    /// Get queue statistics.
    async fn stats(&self) -> Result<QueueStats>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct InMemoryState {
    ready: VecDeque<QueuedJob>,
    delayed: Vec<QueuedJob>,
    dedup: HashMap<String, JobId>,
    active: u64,
    completed: u64,
    failed: u64,
}

/// In-memory queue backend for testing and development.
pub struct InMemoryQueueBackend {
    state: Mutex<InMemoryState>,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
        }
    }
}

impl Default for InMemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn enqueue(&self, job: QueuedJob) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ready.push_back(job);
        Ok(())
    }

    async fn dequeue_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>> {
        let mut state = self.state.lock().await;

        // Promote delayed jobs that have come due, preserving due order.
        let mut due: Vec<QueuedJob> = Vec::new();
        state.delayed.retain(|job| {
            let is_due = job.metadata.scheduled_at.map_or(true, |at| at <= now);
            if is_due {
                due.push(job.clone());
            }
            !is_due
        });
        due.sort_by_key(|job| job.metadata.scheduled_at);
        for job in due {
            state.ready.push_back(job);
        }

        let job = state.ready.pop_front();
        if job.is_some() {
            state.active += 1;
        }
        Ok(job)
    }

    async fn requeue(&self, mut job: QueuedJob, delay: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        job.metadata.scheduled_at =
            Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        state.active = state.active.saturating_sub(1);
        state.delayed.push(job);
        Ok(())
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        let mut state = self.state.lock().await;
        state.active = state.active.saturating_sub(1);
        state.completed += 1;
        if let Some(ref key) = job.metadata.dedup_key {
            state.dedup.remove(key);
        }
        Ok(())
    }

    async fn fail(&self, job: &QueuedJob) -> Result<()> {
        let mut state = self.state.lock().await;
        state.active = state.active.saturating_sub(1);
        state.failed += 1;
        if let Some(ref key) = job.metadata.dedup_key {
            state.dedup.remove(key);
        }
        Ok(())
    }

    async fn try_reserve_dedup(&self, key: &str, job_id: JobId) -> Result<Option<JobId>> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.dedup.get(key) {
            return Ok(Some(*existing));
        }
        state.dedup.insert(key.to_string(), job_id);
        Ok(None)
    }

    async fn release_dedup(&self, key: &str) -> Result<()> {
        self.state.lock().await.dedup.remove(key);
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            waiting: (state.ready.len() + state.delayed.len()) as u64,
            active: state.active,
            completed: state.completed,
            failed: state.failed,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis-backed queue backend for production use.
///
/// Layout under the key prefix (`dealpulse:{queue}`):
/// - `:ready` - list of serialized jobs due now
/// - `:delayed` - sorted set of serialized jobs, scored by due epoch
/// - `:dedup` - hash of dedup key -> job id
/// - `:active` / `:completed` / `:failed` - counters
pub struct RedisQueueBackend {
    client: redis::Client,
    prefix: String,
}

impl RedisQueueBackend {
    /// Create a new Redis queue backend for one queue.
    pub fn new(client: redis::Client, queue: QueueName) -> Self {
        Self {
            client,
            prefix: format!("dealpulse:{}", queue.as_str()),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn enqueue(&self, job: QueuedJob) -> Result<()> {
        let serialized = serde_json::to_string(&job)?;
        let mut conn = self.get_conn().await?;

        redis::cmd("RPUSH")
            .arg(self.key("ready"))
            .arg(&serialized)
            .query_async::<_, i64>(&mut conn)
            .await?;

        tracing::debug!(queue = %self.prefix, job_id = %job.metadata.id, "Job enqueued");
        Ok(())
    }

    async fn dequeue_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>> {
        let mut conn = self.get_conn().await?;

        // Promote due delayed jobs into the ready list.
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.key("delayed"))
            .arg("-inf")
            .arg(now.timestamp())
            .arg("LIMIT")
            .arg(0)
            .arg(16)
            .query_async(&mut conn)
            .await?;

        for member in &due {
            let removed: i64 = redis::cmd("ZREM")
                .arg(self.key("delayed"))
                .arg(member)
                .query_async(&mut conn)
                .await?;
            // Another worker may have promoted it between the range read and
            // the remove; only the one that removed the member owns it.
            if removed == 1 {
                redis::cmd("RPUSH")
                    .arg(self.key("ready"))
                    .arg(member)
                    .query_async::<_, i64>(&mut conn)
                    .await?;
            }
        }

        let value: Option<String> = redis::cmd("LPOP")
            .arg(self.key("ready"))
            .query_async(&mut conn)
            .await?;

        match value {
            Some(value) => {
                let job: QueuedJob = serde_json::from_str(&value)?;
                redis::cmd("INCR")
                    .arg(self.key("active"))
                    .query_async::<_, i64>(&mut conn)
                    .await?;
                tracing::debug!(queue = %self.prefix, job_id = %job.metadata.id, "Job dequeued");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn requeue(&self, mut job: QueuedJob, delay: Duration) -> Result<()> {
        let due = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        job.metadata.scheduled_at = Some(due);
        let serialized = serde_json::to_string(&job)?;

        let mut conn = self.get_conn().await?;
        redis::cmd("DECR")
            .arg(self.key("active"))
            .query_async::<_, i64>(&mut conn)
            .await?;
        redis::cmd("ZADD")
            .arg(self.key("delayed"))
            .arg(due.timestamp())
            .arg(&serialized)
            .query_async::<_, i64>(&mut conn)
            .await?;

        tracing::debug!(
            queue = %self.prefix,
            job_id = %job.metadata.id,
            delay_secs = delay.as_secs(),
            "Job requeued with backoff"
        );
        Ok(())
    }

    async fn complete(&self, job: &QueuedJob) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("DECR")
            .arg(self.key("active"))
            .query_async::<_, i64>(&mut conn)
            .await?;
        redis::cmd("INCR")
            .arg(self.key("completed"))
            .query_async::<_, i64>(&mut conn)
            .await?;
        if let Some(ref key) = job.metadata.dedup_key {
            redis::cmd("HDEL")
                .arg(self.key("dedup"))
                .arg(key)
                .query_async::<_, i64>(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn fail(&self, job: &QueuedJob) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("DECR")
            .arg(self.key("active"))
            .query_async::<_, i64>(&mut conn)
            .await?;
        redis::cmd("INCR")
            .arg(self.key("failed"))
            .query_async::<_, i64>(&mut conn)
            .await?;
        if let Some(ref key) = job.metadata.dedup_key {
            redis::cmd("HDEL")
                .arg(self.key("dedup"))
                .arg(key)
                .query_async::<_, i64>(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn try_reserve_dedup(&self, key: &str, job_id: JobId) -> Result<Option<JobId>> {
        let mut conn = self.get_conn().await?;

        let reserved: i64 = redis::cmd("HSETNX")
            .arg(self.key("dedup"))
            .arg(key)
            .arg(job_id.to_string())
            .query_async(&mut conn)
            .await?;

        if reserved == 1 {
            return Ok(None);
        }

        let holder: Option<String> = redis::cmd("HGET")
            .arg(self.key("dedup"))
            .arg(key)
            .query_async(&mut conn)
            .await?;

        Ok(holder
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(JobId))
    }

    async fn release_dedup(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("HDEL")
            .arg(self.key("dedup"))
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut conn = self.get_conn().await?;

        let ready: u64 = redis::cmd("LLEN")
            .arg(self.key("ready"))
            .query_async(&mut conn)
            .await?;
        let delayed: u64 = redis::cmd("ZCARD")
            .arg(self.key("delayed"))
            .query_async(&mut conn)
            .await?;
        let active: Option<i64> = redis::cmd("GET")
            .arg(self.key("active"))
            .query_async(&mut conn)
            .await?;
        let completed: Option<u64> = redis::cmd("GET")
            .arg(self.key("completed"))
            .query_async(&mut conn)
            .await?;
        let failed: Option<u64> = redis::cmd("GET")
            .arg(self.key("failed"))
            .query_async(&mut conn)
            .await?;

        Ok(QueueStats {
            waiting: ready + delayed,
            active: active.unwrap_or(0).max(0) as u64,
            completed: completed.unwrap_or(0),
            failed: failed.unwrap_or(0),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Queue
// ═══════════════════════════════════════════════════════════════════════════════

/// One job family's queue.
#[derive(Clone)]
pub struct JobQueue {
    name: QueueName,
    backend: Arc<dyn QueueBackend>,
}

impl JobQueue {
    /// Create a queue over the given backend.
    pub fn new(name: QueueName, backend: Arc<dyn QueueBackend>) -> Self {
        Self { name, backend }
    }

    /// Create an in-memory queue (for testing).
    pub fn in_memory(name: QueueName) -> Self {
        Self::new(name, Arc::new(InMemoryQueueBackend::new()))
    }

    /// Create a Redis-backed queue.
    pub fn redis(name: QueueName, client: redis::Client) -> Self {
        Self::new(name, Arc::new(RedisQueueBackend::new(client, name)))
    }

    pub fn name(&self) -> QueueName {
        self.name
    }

    /// Submit a job.
    ///
    /// When the metadata carries a dedup key that another non-terminal job
    /// already holds, nothing is enqueued and the existing job's handle is
    /// returned with `deduplicated = true`.
    pub async fn submit(&self, metadata: JobMetadata, data: serde_json::Value) -> Result<JobHandle> {
        if let Some(ref key) = metadata.dedup_key {
            if let Some(existing) = self.backend.try_reserve_dedup(key, metadata.id).await? {
                tracing::debug!(
                    queue = %self.name,
                    dedup_key = %key,
                    existing_job = %existing,
                    "Duplicate submission collapsed"
                );
                return Ok(JobHandle {
                    id: existing,
                    queue: self.name,
                    deduplicated: true,
                });
            }
        }

        let handle = JobHandle {
            id: metadata.id,
            queue: self.name,
            deduplicated: false,
        };

        let dedup_key = metadata.dedup_key.clone();
        if let Err(e) = self.backend.enqueue(QueuedJob { metadata, data }).await {
            // Free the reservation so the next submission is not wedged
            if let Some(ref key) = dedup_key {
                let _ = self.backend.release_dedup(key).await;
            }
            return Err(e);
        }
        Ok(handle)
    }

    /// Pop the next due job.
    pub async fn dequeue_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>> {
        self.backend.dequeue_due(now).await
    }

    /// Requeue a failed job with a backoff delay.
    pub async fn requeue(&self, job: QueuedJob, delay: Duration) -> Result<()> {
        self.backend.requeue(job, delay).await
    }

    /// Record a completed job.
    pub async fn complete(&self, job: &QueuedJob) -> Result<()> {
        self.backend.complete(job).await
    }

    /// Record a terminally failed job.
    pub async fn fail(&self, job: &QueuedJob) -> Result<()> {
        self.backend.fail(job).await
    }

    /// Get queue statistics.
    pub async fn stats(&self) -> Result<QueueStats> {
        self.backend.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(queue: QueueName, job_type: &str) -> (JobMetadata, serde_json::Value) {
        (JobMetadata::new(queue, job_type), serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_in_memory_fifo() {
        let queue = JobQueue::in_memory(QueueName::DocumentProcessing);

        let (first, data) = job(QueueName::DocumentProcessing, "doc-a");
        queue.submit(first, data).await.unwrap();
        let (second, data) = job(QueueName::DocumentProcessing, "doc-b");
        queue.submit(second, data).await.unwrap();

        let dequeued = queue.dequeue_due(Utc::now()).await.unwrap().unwrap();
        assert_eq!(dequeued.metadata.job_type, "doc-a");
        let dequeued = queue.dequeue_due(Utc::now()).await.unwrap().unwrap();
        assert_eq!(dequeued.metadata.job_type, "doc-b");
    }

    #[tokio::test]
    async fn test_dedup_collapses_submissions() {
        let queue = JobQueue::in_memory(QueueName::DailyBrief);

        let metadata =
            JobMetadata::new(QueueName::DailyBrief, "generate-brief").with_dedup_key("brief-d-1");
        let first = queue.submit(metadata, serde_json::json!({})).await.unwrap();
        assert!(!first.deduplicated);

        let metadata =
            JobMetadata::new(QueueName::DailyBrief, "generate-brief").with_dedup_key("brief-d-1");
        let second = queue.submit(metadata, serde_json::json!({})).await.unwrap();
        assert!(second.deduplicated);
        assert_eq!(second.id, first.id);

        // Exactly one job is actually queued
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.waiting, 1);
    }

    #[tokio::test]
    async fn test_dedup_released_after_completion() {
        let queue = JobQueue::in_memory(QueueName::DailyBrief);

        let metadata =
            JobMetadata::new(QueueName::DailyBrief, "generate-brief").with_dedup_key("brief-d-2");
        queue.submit(metadata, serde_json::json!({})).await.unwrap();

        let job = queue.dequeue_due(Utc::now()).await.unwrap().unwrap();
        queue.complete(&job).await.unwrap();

        // The key is free again once the holder reached a terminal state
        let metadata =
            JobMetadata::new(QueueName::DailyBrief, "generate-brief").with_dedup_key("brief-d-2");
        let handle = queue.submit(metadata, serde_json::json!({})).await.unwrap();
        assert!(!handle.deduplicated);
    }

    #[tokio::test]
    async fn test_requeue_delays_until_due() {
        let queue = JobQueue::in_memory(QueueName::SourceSync);

        let (metadata, data) = job(QueueName::SourceSync, "sync-gdrive");
        queue.submit(metadata, data).await.unwrap();

        let queued = queue.dequeue_due(Utc::now()).await.unwrap().unwrap();
        queue
            .requeue(queued, Duration::from_secs(60))
            .await
            .unwrap();

        // Not due yet
        assert!(queue.dequeue_due(Utc::now()).await.unwrap().is_none());

        // Due once the delay has elapsed
        let later = Utc::now() + chrono::Duration::seconds(120);
        assert!(queue.dequeue_due(later).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stats_reflect_outcomes() {
        let queue = JobQueue::in_memory(QueueName::EmailProcessing);

        for i in 0..3 {
            let (metadata, data) = job(QueueName::EmailProcessing, &format!("email-{}", i));
            queue.submit(metadata, data).await.unwrap();
        }

        let a = queue.dequeue_due(Utc::now()).await.unwrap().unwrap();
        let b = queue.dequeue_due(Utc::now()).await.unwrap().unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.active, 2);

        queue.complete(&a).await.unwrap();
        queue.fail(&b).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }
}
