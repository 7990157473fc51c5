//! Background job system for DealPulse Core.
//!
//! This module provides the asynchronous job pipeline:
//!
//! - **Job Definitions**: typed per-family payloads with retry and backoff profiles
//! - **Queue**: Redis-backed queues with dedup-key idempotent submission
//! - **Producers**: one typed enqueue function per job family
//! - **Worker**: semaphore-bounded concurrent execution with graceful shutdown
//! - **Scheduler**: timezone-aware cron fan-out of daily briefs across deals
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Background Job System                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐    ┌────────────┐    ┌────────────┐    ┌─────────────┐  │
//! │  │ Scheduler │───▶│ Producers  │───▶│   Queues   │───▶│   Workers   │  │
//! │  │ (cron/tz) │    │ (dedup)    │    │ (Redis)    │    │ (semaphore) │  │
//! │  └───────────┘    └────────────┘    └────────────┘    └──────┬──────┘  │
//! │                                                              ▼         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                          Processors                             │   │
//! │  │  • Source Sync          • Document Processing                   │   │
//! │  │  • Email Processing     • Daily Brief Generation                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use dealpulse_core::jobs::{JobQueues, JobWorker, BriefScheduler};
//!
//! let queues = Arc::new(JobQueues::redis(redis_client));
//! queues.enqueue_daily_brief(deal_id, None).await?;
//!
//! let worker = JobWorker::new(brief_queue, Arc::new(processor));
//! let handle = worker.start();
//!
//! let scheduler = BriefScheduler::new(&config.scheduler, db, queues)?;
//! let sched_handle = scheduler.start();
//! ```

pub mod job;
pub mod producer;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use job::{
    BackoffStrategy, DailyBriefPayload, DocumentOperation, DocumentPayload, EmailOperation,
    EmailPayload, JobContext, JobError, JobId, JobMetadata, JobProgress, JobResult, JobStatus,
    QueueName, RetryPolicy, SourceSyncPayload, SyncType,
};
pub use producer::{AllQueueStats, JobQueues};
pub use queue::{
    InMemoryQueueBackend, JobHandle, JobQueue, QueueBackend, QueueStats, QueuedJob,
    RedisQueueBackend,
};
pub use scheduler::{
    fan_out_daily_briefs, BriefScheduler, FanOutEntry, FanOutFailure, FanOutReport, SchedulerHandle,
};
pub use worker::{JobWorker, Processor, WorkerConfig, WorkerHandle, WorkerStats};
