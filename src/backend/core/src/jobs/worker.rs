//! Job workers: per-queue concurrent execution with retry interpretation.
//!
//! One `JobWorker` runs per queue, holding that family's concurrency budget
//! behind a tokio `Semaphore`. The worker is the sole layer that interprets
//! retry policy: processors report success or a `JobError`, and the worker
//! decides between requeue-with-backoff and the terminal failed state.
//!
//! Jobs within one queue are not strictly FIFO once concurrency > 1; every
//! processor is idempotent with respect to re-execution, so ordering is
//! best-effort by design.

use chrono::Utc;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{JobContext, JobError, JobQueue, JobResult, QueueName, QueuedJob, RetryPolicy};

/// Per-job-family business logic.
#[async_trait::async_trait]
pub trait Processor: Send + Sync + 'static {
    /// The typed payload this processor consumes.
    type Payload: DeserializeOwned + Send;

    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Execute one job.
    async fn process(&self, payload: Self::Payload, ctx: &JobContext) -> JobResult;
}

/// Configuration for a job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent job executions
    pub concurrency: usize,
    /// Poll interval when the queue is empty (milliseconds)
    pub poll_interval_ms: u64,
    /// Wall-clock timeout per job (seconds); expiry counts as a retryable
    /// failure so a hung external call cannot pin a slot forever
    pub job_timeout_secs: u64,
    /// Retry policy applied to failed jobs
    pub retry_policy: RetryPolicy,
    /// Worker name/identifier
    pub name: String,
}

impl WorkerConfig {
    /// Default configuration for a queue family, using its concurrency
    /// budget and retry profile.
    pub fn for_queue(queue: QueueName) -> Self {
        Self {
            concurrency: queue.concurrency(),
            poll_interval_ms: 1000,
            job_timeout_secs: 600,
            retry_policy: queue.retry_policy(),
            name: queue.as_str().to_string(),
        }
    }
}

/// Statistics for a job worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Total jobs processed (attempts)
    pub processed: Arc<AtomicU64>,
    /// Attempts that completed successfully
    pub succeeded: Arc<AtomicU64>,
    /// Attempts that were requeued for retry
    pub retried: Arc<AtomicU64>,
    /// Jobs that reached the terminal failed state
    pub failed: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown: tokio::sync::watch::Sender<bool>,
    stats: WorkerStats,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Get worker statistics.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker loop (and in-flight jobs) to finish.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Job worker that processes jobs from one queue.
pub struct JobWorker<P: Processor> {
    queue: Arc<JobQueue>,
    processor: Arc<P>,
    config: WorkerConfig,
    stats: WorkerStats,
}

impl<P: Processor> JobWorker<P> {
    /// Create a worker for a queue with the family's default configuration.
    pub fn new(queue: Arc<JobQueue>, processor: Arc<P>) -> Self {
        let config = WorkerConfig::for_queue(queue.name());
        Self::with_config(queue, processor, config)
    }

    /// Create a worker with explicit configuration.
    pub fn with_config(queue: Arc<JobQueue>, processor: Arc<P>, config: WorkerConfig) -> Self {
        Self {
            queue,
            processor,
            config,
            stats: WorkerStats::new(),
        }
    }

    /// Start the worker, returning a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let stats = self.stats.clone();
        let config = self.config.clone();
        let queue = self.queue;
        let processor = self.processor;

        let loop_stats = stats.clone();
        let join = tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(config.concurrency));
            let poll_interval = Duration::from_millis(config.poll_interval_ms);
            let job_timeout = Duration::from_secs(config.job_timeout_secs);

            tracing::info!(
                worker = %config.name,
                concurrency = config.concurrency,
                "Job worker started"
            );

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let permit = tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // A closed channel means the handle is gone; stop.
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    permit = semaphore.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let job = match queue.dequeue_due(Utc::now()).await {
                    Ok(job) => job,
                    Err(e) => {
                        drop(permit);
                        tracing::warn!(worker = %config.name, error = %e, "Dequeue failed");
                        tokio::select! {
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() {
                                    break;
                                }
                            }
                            _ = tokio::time::sleep(poll_interval) => {},
                        }
                        continue;
                    }
                };

                let Some(job) = job else {
                    drop(permit);
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(poll_interval) => {},
                    }
                    continue;
                };

                let queue = queue.clone();
                let processor = processor.clone();
                let stats = loop_stats.clone();
                let worker_name = config.name.clone();
                let retry_policy = config.retry_policy.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    execute_job(
                        &queue,
                        &*processor,
                        &stats,
                        &worker_name,
                        &retry_policy,
                        job_timeout,
                        job,
                    )
                    .await;
                });
            }

            // Wait for in-flight jobs to finish before reporting shutdown.
            let _ = semaphore.acquire_many(config.concurrency as u32).await;
            tracing::info!(worker = %config.name, "Worker stopped");
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            stats,
            join,
        }
    }
}

/// Run one dequeued job to a terminal-or-requeued outcome.
async fn execute_job<P: Processor>(
    queue: &JobQueue,
    processor: &P,
    stats: &WorkerStats,
    worker_name: &str,
    retry_policy: &RetryPolicy,
    job_timeout: Duration,
    mut job: QueuedJob,
) {
    job.metadata.mark_running();
    stats.processed.fetch_add(1, Ordering::Relaxed);

    let ctx = JobContext::new(job.metadata.clone());

    let payload: P::Payload = match serde_json::from_value(job.data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            // A payload that never deserializes will not improve with retries.
            let message = format!("invalid job payload: {}", e);
            ctx.log_error(&message);
            job.metadata.mark_failed(&message);
            if let Err(e) = queue.fail(&job).await {
                tracing::error!(worker = worker_name, error = %e, "Failed to record job failure");
            }
            stats.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    let result: JobResult =
        match tokio::time::timeout(job_timeout, processor.process(payload, &ctx)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::retryable(format!(
                "job timed out after {}s",
                job_timeout.as_secs()
            ))),
        };

    match result {
        Ok(()) => {
            job.metadata.mark_completed();
            if let Err(e) = queue.complete(&job).await {
                tracing::error!(worker = worker_name, error = %e, "Failed to record completion");
            }
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("dealpulse_jobs_total", "queue" => queue.name().to_string(), "outcome" => "completed")
                .increment(1);
            tracing::info!(
                worker = worker_name,
                job_id = %job.metadata.id,
                job_type = %job.metadata.job_type,
                "Job completed"
            );
        }
        Err(error) => {
            if error.retryable && job.metadata.can_retry() {
                let delay = retry_policy.next_retry_delay(job.metadata.attempts);
                job.metadata.mark_retrying(&error.message);
                tracing::warn!(
                    worker = worker_name,
                    job_id = %job.metadata.id,
                    job_type = %job.metadata.job_type,
                    attempt = job.metadata.attempts,
                    max_attempts = job.metadata.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    "Job failed, retrying with backoff"
                );
                if let Err(e) = queue.requeue(job, delay).await {
                    tracing::error!(worker = worker_name, error = %e, "Failed to requeue job");
                }
                stats.retried.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("dealpulse_jobs_total", "queue" => queue.name().to_string(), "outcome" => "retried")
                    .increment(1);
            } else {
                job.metadata.mark_failed(&error.message);
                tracing::error!(
                    worker = worker_name,
                    job_id = %job.metadata.id,
                    job_type = %job.metadata.job_type,
                    attempts = job.metadata.attempts,
                    retryable = error.retryable,
                    error = %error,
                    "Job failed terminally"
                );
                if let Err(e) = queue.fail(&job).await {
                    tracing::error!(worker = worker_name, error = %e, "Failed to record job failure");
                }
                stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("dealpulse_jobs_total", "queue" => queue.name().to_string(), "outcome" => "failed")
                    .increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_for_queue() {
        let config = WorkerConfig::for_queue(QueueName::EmailProcessing);
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.name, "email-processing");
        assert_eq!(config.job_timeout_secs, 600);
        assert_eq!(config.retry_policy.max_attempts, 3);
    }

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::new();
        assert_eq!(stats.processed(), 0);

        stats.processed.fetch_add(1, Ordering::Relaxed);
        stats.succeeded.fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.processed(), 1);
        assert_eq!(stats.succeeded(), 1);
    }
}
