#![allow(clippy::result_large_err)]
//! # DealPulse Core
//!
//! The asynchronous intelligence pipeline behind DealPulse: external-source
//! synchronization, AI-assisted enrichment, and daily brief generation for
//! business deals.
//!
//! ## Architecture
//!
//! - **Jobs**: Redis-backed queues with per-family retry profiles, typed
//!   producers, semaphore-bounded workers, and a cron-driven scheduler
//! - **Processors**: the four job families (source sync, document
//!   enrichment, email enrichment, daily brief)
//! - **Brief**: the five-section daily brief aggregator
//! - **Sources**: normalized "list changed items" adapters for Drive,
//!   Gmail, SharePoint, and Outlook, plus token refresh and an auth
//!   circuit breaker
//! - **AI**: black-box summarize/classify/sentiment/blocker capability
//! - **API**: queue introspection and manual triggers over axum

pub mod ai;
pub mod api;
pub mod brief;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod processors;
pub mod sources;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorSeverity, PulseError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::brief::{BriefData, BriefGenerator};
    pub use crate::db::Database;
    pub use crate::error::{ErrorCode, ErrorContext, PulseError, Result};
    pub use crate::jobs::{
        BackoffStrategy, JobContext, JobError, JobHandle, JobId, JobMetadata, JobQueue, JobQueues,
        JobResult, JobStatus, JobWorker, QueueName, QueueStats, RetryPolicy, WorkerConfig,
    };
    pub use crate::sources::{ChangedItem, SourceAdapter, SourceType, TokenProvider};
}
