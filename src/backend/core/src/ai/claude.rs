//! Anthropic Messages API client.
//!
//! One completion primitive plus the typed capability operations. Structured
//! responses are requested as JSON-only and parsed with serde; a response
//! that does not validate falls back to the operation's typed default.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    AiCapability, Classification, DetectedRisk, SentimentAnalysis, ThreadBlocker, ThreadMessage,
};
use crate::config::AiConfig;
use crate::error::{ErrorCode, PulseError, Result};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Cap on document content shipped to the model.
const MAX_CONTENT_CHARS: usize = 8000;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Anthropic-backed implementation of [`AiCapability`].
pub struct ClaudeClient {
    http: reqwest::Client,
    config: AiConfig,
}

impl ClaudeClient {
    pub fn new(config: AiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(PulseError::from)?;

        Ok(Self { http, config })
    }

    /// Build over an existing HTTP client (tests point `base_url` at a stub).
    pub fn with_http(http: reqwest::Client, config: AiConfig) -> Self {
        Self { http, config }
    }

    /// Generate a text completion.
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let request = MessagesRequest {
            model: &self.config.model,
            max_tokens,
            temperature,
            system,
            messages: vec![MessageParam {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(PulseError::from)?;

        let body: MessagesResponse = response.json().await.map_err(PulseError::from)?;

        body.content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .ok_or_else(|| {
                PulseError::new(
                    ErrorCode::AiApiError,
                    "Model response contained no text block",
                )
            })
    }

    /// Generate a completion and parse it as `T`, returning `fallback` when
    /// the request or the parse fails.
    async fn structured_or<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
        max_tokens: u32,
        operation: &'static str,
        fallback: T,
    ) -> T {
        let system = format!(
            "{}\n\nYou must respond with valid JSON only. Do not include any text before or after the JSON.",
            system
        );

        let text = match self.generate(prompt, Some(&system), max_tokens, 0.3).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(operation, error = %e, "AI request failed, using fallback");
                return fallback;
            }
        };

        match serde_json::from_str::<T>(strip_code_fence(&text)) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    operation,
                    error = %e,
                    "AI response failed schema validation, using fallback"
                );
                fallback
            }
        }
    }
}

/// Strip a surrounding markdown code fence, if present.
///
/// Models occasionally wrap JSON in ```json fences despite instructions;
/// removing the fence is a deterministic transformation, everything else
/// must parse as-is.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => &content[..idx],
        None => content,
    }
}

#[async_trait]
impl AiCapability for ClaudeClient {
    async fn summarize(&self, name: &str, content: &str) -> Result<String> {
        let system = "You are an expert M&A analyst. Your job is to summarize documents for deal teams.\n\
             Focus on: key terms, obligations, risks, deadlines, and critical decision points.\n\
             Keep summaries executive-ready: 2-3 sentences maximum.";

        let prompt = format!(
            "Summarize this M&A document:\n\nDocument: {}\nContent: {}\n\n\
             Provide a concise summary highlighting the most important information for deal leads.",
            name,
            truncate(content, MAX_CONTENT_CHARS)
        );

        self.generate(&prompt, Some(system), 500, 0.5).await
    }

    async fn classify(&self, name: &str, content: &str) -> Result<Classification> {
        let system = "You are a document classifier for M&A deals.\n\
             Classify documents into workstreams: Legal, HR, Finance, IT, Ops.\n\
             Base your decision on document content and name.";

        let prompt = format!(
            "Classify this document:\n\nDocument: {}\nContent Preview: {}\n\n\
             Return JSON with:\n\
             - workstream: One of [Legal, HR, Finance, IT, Ops]\n\
             - confidence: 0-100\n\
             - reasoning: Brief explanation\n\nJSON only.",
            name,
            truncate(content, 2000)
        );

        Ok(self
            .structured_or(&prompt, system, 200, "classify", Classification::fallback())
            .await)
    }

    async fn extract_risks(&self, name: &str, content: &str) -> Result<Vec<DetectedRisk>> {
        let system = "You are a risk detection AI for M&A deals.\n\
             Identify potential risks, red flags, and exceptional clauses.\n\
             Focus on: financial liabilities, legal constraints, compliance issues, and deal-breakers.";

        let prompt = format!(
            "Analyze this M&A document for risks:\n\nDocument: {}\nContent: {}\n\n\
             Identify up to 5 most significant risks. For each risk, provide:\n\
             - title: Brief description\n\
             - severity: low, medium, or high\n\
             - citation: Direct quote from document\n\
             - explanation: Why this is a risk\n\n\
             Return as JSON array.",
            name,
            truncate(content, MAX_CONTENT_CHARS)
        );

        Ok(self
            .structured_or(&prompt, system, 2000, "extract_risks", Vec::new())
            .await)
    }

    async fn analyze_sentiment(
        &self,
        subject: &str,
        content: &str,
        sender: &str,
    ) -> Result<SentimentAnalysis> {
        let system = "You are an email analyzer for M&A deals.\n\
             Detect: blockers, waiting conditions, review requests, risks, and positive progress.\n\n\
             Sentiment categories:\n\
             - positive: Progress, approvals, confirmations\n\
             - neutral: General updates, information sharing\n\
             - risk: Concerns, delays, issues\n\
             - blocker: Explicit blockers, dependencies, waiting for action\n\n\
             A blocker is something preventing deal progress that requires action.";

        let prompt = format!(
            "Analyze this email:\n\nSubject: {}\nFrom: {}\nContent: {}\n\n\
             Return JSON with:\n\
             {{\n\
               \"sentiment\": \"positive\" | \"neutral\" | \"risk\" | \"blocker\",\n\
               \"isBlocker\": boolean,\n\
               \"blockerReason\": \"explanation if blocker\",\n\
               \"keyPoints\": [\"point 1\", \"point 2\", \"point 3\"]\n\
             }}",
            subject,
            sender,
            truncate(content, 2000)
        );

        Ok(self
            .structured_or(
                &prompt,
                system,
                500,
                "analyze_sentiment",
                SentimentAnalysis::fallback(),
            )
            .await)
    }

    async fn detect_thread_blocker(&self, messages: &[ThreadMessage]) -> Result<ThreadBlocker> {
        let system = "You are a blocker detection AI for M&A deals.\n\
             Identify explicit blockers: waiting for approval, pending documents, delayed reviews, etc.";

        let thread = messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                format!(
                    "Email {}:\nDate: {}\nFrom: {}\nSubject: {}\nSnippet: {}\n",
                    i + 1,
                    m.date.to_rfc3339(),
                    m.sender,
                    m.subject,
                    m.snippet
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = format!(
            "Analyze this email thread for blockers:\n\n{}\n\n\
             Return JSON with:\n\
             {{\n\
               \"hasBlocker\": boolean,\n\
               \"blockerTitle\": \"brief description if blocker exists\",\n\
               \"ageInDays\": estimated days since blocker started,\n\
               \"workstream\": \"Legal\" | \"HR\" | \"Finance\" | \"IT\" | \"Ops\" | null,\n\
               \"participants\": [\"email addresses involved\"]\n\
             }}",
            thread
        );

        Ok(self
            .structured_or(
                &prompt,
                system,
                300,
                "detect_thread_blocker",
                ThreadBlocker::fallback(),
            )
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        // Multibyte characters never split
        assert_eq!(truncate("déjà vu", 4), "déjà");
    }

    #[test]
    fn test_sentiment_analysis_wire_format() {
        let parsed: SentimentAnalysis = serde_json::from_str(
            r#"{"sentiment": "risk", "isBlocker": true, "blockerReason": "waiting on approval", "keyPoints": ["a"]}"#,
        )
        .unwrap();
        assert_eq!(parsed.sentiment, crate::db::Sentiment::Risk);
        assert!(parsed.is_blocker);
    }

    #[test]
    fn test_thread_blocker_wire_format_with_missing_fields() {
        let parsed: ThreadBlocker = serde_json::from_str(r#"{"hasBlocker": false}"#).unwrap();
        assert!(!parsed.has_blocker);
        assert!(parsed.blocker_title.is_none());
        assert!(parsed.participants.is_empty());
    }
}
