//! AI capability boundary.
//!
//! The pipeline treats AI as a fallible black box with four operations:
//! summarize, classify, sentiment analysis, and thread-level blocker
//! detection. Structured responses are parsed by strict serde
//! deserialization; when a response does not validate, the capability
//! degrades to a documented default instead of failing the enclosing job
//! (summarization excepted, which propagates so the job retries).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::brief::Severity;
use crate::db::Sentiment;
use crate::error::Result;

pub mod claude;

pub use claude::ClaudeClient;

// ═══════════════════════════════════════════════════════════════════════════════
// Structured Outputs
// ═══════════════════════════════════════════════════════════════════════════════

/// Workstream classification for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Suggested workstream name (Legal, HR, Finance, IT, Ops)
    pub workstream: String,
    /// Confidence 0-100
    #[serde(default)]
    pub confidence: u8,
    /// Brief explanation
    #[serde(default)]
    pub reasoning: String,
}

impl Classification {
    /// The documented fallback when classification fails.
    pub fn fallback() -> Self {
        Self {
            workstream: "Ops".to_string(),
            confidence: 0,
            reasoning: "Classification failed".to_string(),
        }
    }
}

/// Sentiment and blocker analysis for one email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysis {
    pub sentiment: Sentiment,
    pub is_blocker: bool,
    #[serde(default)]
    pub blocker_reason: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

impl SentimentAnalysis {
    /// The documented fallback when analysis fails.
    pub fn fallback() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            is_blocker: false,
            blocker_reason: None,
            key_points: Vec::new(),
        }
    }
}

/// Thread-level blocker detection result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadBlocker {
    pub has_blocker: bool,
    #[serde(default)]
    pub blocker_title: Option<String>,
    #[serde(default)]
    pub age_in_days: Option<i64>,
    #[serde(default)]
    pub workstream: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
}

impl ThreadBlocker {
    /// The documented fallback when detection fails.
    pub fn fallback() -> Self {
        Self {
            has_blocker: false,
            blocker_title: None,
            age_in_days: None,
            workstream: None,
            participants: Vec::new(),
        }
    }
}

/// A risk extracted from document content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedRisk {
    pub title: String,
    pub severity: Severity,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// One message of an email thread, as blocker detection sees it.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadMessage {
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub date: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Capability Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// The AI operations the processors depend on.
#[async_trait]
pub trait AiCapability: Send + Sync {
    /// Summarize a document. Errors propagate (the job retries).
    async fn summarize(&self, name: &str, content: &str) -> Result<String>;

    /// Classify a document into a workstream. Degrades to [`Classification::fallback`].
    async fn classify(&self, name: &str, content: &str) -> Result<Classification>;

    /// Extract risks from document content. Degrades to an empty list.
    async fn extract_risks(&self, name: &str, content: &str) -> Result<Vec<DetectedRisk>>;

    /// Analyze one email. Degrades to [`SentimentAnalysis::fallback`].
    async fn analyze_sentiment(
        &self,
        subject: &str,
        content: &str,
        sender: &str,
    ) -> Result<SentimentAnalysis>;

    /// Detect a blocker across a full thread. Degrades to [`ThreadBlocker::fallback`].
    async fn detect_thread_blocker(&self, messages: &[ThreadMessage]) -> Result<ThreadBlocker>;
}
