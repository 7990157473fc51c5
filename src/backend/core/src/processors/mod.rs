//! Per-job-family business logic.
//!
//! One [`crate::jobs::Processor`] implementation per queue:
//!
//! - **Source Sync**: pull changed items from an external source, upsert
//!   them, and fan out enrichment jobs
//! - **Document Processing**: AI summarization, classification, and risk
//!   extraction for a single document
//! - **Email Processing**: AI sentiment analysis and thread-aware blocker
//!   detection for a single email
//! - **Daily Brief**: aggregate and persist the five-section brief

pub mod daily_brief;
pub mod document;
pub mod email;
pub mod source_sync;

pub use daily_brief::DailyBriefProcessor;
pub use document::DocumentProcessor;
pub use email::EmailProcessor;
pub use source_sync::SourceSyncProcessor;
