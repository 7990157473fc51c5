//! End-to-end tests for the queue + worker retry lifecycle over the
//! in-memory backend.
//!
//! Covers:
//! - Flaky processors succeeding within the attempt budget
//! - Retry exhaustion landing jobs in the terminal failed state
//! - Fatal errors skipping retries entirely
//! - The per-job wall-clock timeout
//! - The concurrency budget

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dealpulse_core::jobs::{
    BackoffStrategy, JobContext, JobError, JobMetadata, JobQueue, JobResult, JobWorker, Processor,
    QueueName, RetryPolicy, WorkerConfig,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TestPayload {
    label: String,
}

/// Fails the first `failures_before_success` attempts, then succeeds.
struct FlakyProcessor {
    attempts_seen: AtomicU32,
    failures_before_success: u32,
    fatal: bool,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FlakyProcessor {
    fn new(failures_before_success: u32) -> Self {
        Self {
            attempts_seen: AtomicU32::new(0),
            failures_before_success,
            fatal: false,
            delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fatal() -> Self {
        Self {
            fatal: true,
            ..Self::new(u32::MAX)
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(0)
        }
    }
}

#[async_trait]
impl Processor for FlakyProcessor {
    type Payload = TestPayload;

    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn process(&self, _payload: Self::Payload, _ctx: &JobContext) -> JobResult {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let attempt = self.attempts_seen.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fatal {
            return Err(JobError::fatal("unrecoverable"));
        }
        if attempt < self.failures_before_success {
            return Err(JobError::retryable("transient failure"));
        }
        Ok(())
    }
}

fn fast_config(name: &str, concurrency: usize) -> WorkerConfig {
    WorkerConfig {
        concurrency,
        poll_interval_ms: 10,
        job_timeout_secs: 2,
        retry_policy: RetryPolicy {
            max_attempts: 3,
            backoff: BackoffStrategy::fixed(0),
        },
        name: name.to_string(),
    }
}

async fn submit(queue: &JobQueue, max_attempts: u32) {
    let metadata =
        JobMetadata::new(queue.name(), "test-job").with_max_attempts(max_attempts);
    let data = serde_json::to_value(TestPayload {
        label: "t".to_string(),
    })
    .unwrap();
    queue.submit(metadata, data).await.unwrap();
}

/// Poll queue stats until `done` returns true or the deadline passes.
async fn wait_for(
    queue: &JobQueue,
    done: impl Fn(&dealpulse_core::jobs::QueueStats) -> bool,
) -> dealpulse_core::jobs::QueueStats {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let stats = queue.stats().await.unwrap();
        if done(&stats) {
            return stats;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for queue state, last stats: {:?}",
            stats
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn flaky_job_succeeds_within_attempt_budget() {
    let queue = Arc::new(JobQueue::in_memory(QueueName::DailyBrief));
    let processor = Arc::new(FlakyProcessor::new(2));

    submit(&queue, 3).await;

    let handle = JobWorker::with_config(
        queue.clone(),
        processor.clone(),
        fast_config("flaky-test", 2),
    )
    .start();

    let stats = wait_for(&queue, |s| s.completed == 1).await;
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.active, 0);

    // Two failed attempts plus the successful third
    assert_eq!(processor.attempts_seen.load(Ordering::SeqCst), 3);
    assert_eq!(handle.stats().retried(), 2);
    assert_eq!(handle.stats().succeeded(), 1);
    assert_eq!(handle.stats().failed(), 0);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn exhausted_retries_land_in_failed_state() {
    let queue = Arc::new(JobQueue::in_memory(QueueName::DailyBrief));
    let processor = Arc::new(FlakyProcessor::new(u32::MAX));

    submit(&queue, 3).await;

    let handle = JobWorker::with_config(
        queue.clone(),
        processor.clone(),
        fast_config("exhaust-test", 1),
    )
    .start();

    let stats = wait_for(&queue, |s| s.failed == 1).await;
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.active, 0);

    // All three attempts consumed
    assert_eq!(processor.attempts_seen.load(Ordering::SeqCst), 3);
    assert_eq!(handle.stats().retried(), 2);
    assert_eq!(handle.stats().failed(), 1);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn fatal_errors_skip_retries() {
    let queue = Arc::new(JobQueue::in_memory(QueueName::SourceSync));
    let processor = Arc::new(FlakyProcessor::fatal());

    submit(&queue, 5).await;

    let handle = JobWorker::with_config(
        queue.clone(),
        processor.clone(),
        fast_config("fatal-test", 1),
    )
    .start();

    let stats = wait_for(&queue, |s| s.failed == 1).await;
    assert_eq!(stats.completed, 0);

    // One attempt, no retries
    assert_eq!(processor.attempts_seen.load(Ordering::SeqCst), 1);
    assert_eq!(handle.stats().retried(), 0);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn hung_jobs_hit_the_wall_clock_timeout() {
    let queue = Arc::new(JobQueue::in_memory(QueueName::DocumentProcessing));
    // Sleeps well past the 1-second timeout below
    let processor = Arc::new(FlakyProcessor::slow(Duration::from_secs(30)));

    submit(&queue, 1).await;

    let mut config = fast_config("timeout-test", 1);
    config.job_timeout_secs = 1;

    let handle = JobWorker::with_config(queue.clone(), processor, config).start();

    // The single attempt times out and, with max_attempts = 1, fails terminally
    let stats = wait_for(&queue, |s| s.failed == 1).await;
    assert_eq!(stats.completed, 0);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn concurrency_budget_is_respected() {
    let queue = Arc::new(JobQueue::in_memory(QueueName::DailyBrief));
    let processor = Arc::new(FlakyProcessor::slow(Duration::from_millis(100)));
    let max_in_flight = processor.max_in_flight.clone();

    for _ in 0..6 {
        submit(&queue, 3).await;
    }

    let handle = JobWorker::with_config(
        queue.clone(),
        processor,
        fast_config("concurrency-test", 2),
    )
    .start();

    wait_for(&queue, |s| s.completed == 6).await;
    assert!(max_in_flight.load(Ordering::SeqCst) <= 2);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn malformed_payload_fails_without_retry() {
    let queue = Arc::new(JobQueue::in_memory(QueueName::EmailProcessing));
    let processor = Arc::new(FlakyProcessor::new(0));

    // Not a TestPayload
    let metadata = JobMetadata::new(QueueName::EmailProcessing, "bad-payload");
    queue
        .submit(metadata, serde_json::json!(42))
        .await
        .unwrap();

    let handle = JobWorker::with_config(
        queue.clone(),
        processor.clone(),
        fast_config("payload-test", 1),
    )
    .start();

    let stats = wait_for(&queue, |s| s.failed == 1).await;
    assert_eq!(stats.completed, 0);
    assert_eq!(processor.attempts_seen.load(Ordering::SeqCst), 0);

    handle.shutdown();
    handle.join().await;
}
