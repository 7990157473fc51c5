//! Gmail adapter.
//!
//! Lists messages matching the connection's search query and labels, then
//! fetches each message for headers and body. The plain-text part is
//! preferred; bodies arrive base64url-encoded.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::{source_api_error, ChangedItem, ConnectionSettings, ItemDetail, SourceAdapter, SourceType};
use crate::error::Result;

const MESSAGES_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    /// Milliseconds since epoch, as a string
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

impl Message {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref().and_then(|p| {
            p.headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.as_str())
        })
    }

    fn received_at(&self) -> DateTime<Utc> {
        self.internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now)
    }

    /// Prefer the text/plain part; fall back to the top-level body.
    fn body_text(&self) -> Option<String> {
        let payload = self.payload.as_ref()?;

        if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_deref()) {
            if let Some(text) = decode_body(data) {
                return Some(text);
            }
        }

        payload
            .parts
            .iter()
            .find(|part| part.mime_type.as_deref() == Some("text/plain"))
            .and_then(|part| part.body.as_ref())
            .and_then(|body| body.data.as_deref())
            .and_then(decode_body)
    }
}

fn decode_body(data: &str) -> Option<String> {
    let cleaned = data.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD.decode(cleaned).ok()?;
    String::from_utf8(bytes).ok()
}

/// Gmail source adapter.
pub struct GmailAdapter {
    http: reqwest::Client,
    page_size: u32,
}

impl GmailAdapter {
    pub fn new(http: reqwest::Client, page_size: u32) -> Self {
        Self { http, page_size }
    }

    async fn get_message(&self, id: &str, access_token: &str) -> Result<Message> {
        let url = format!("{}/{}", MESSAGES_URL, id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| source_api_error(e, SourceType::Gmail))?;

        response
            .json()
            .await
            .map_err(|e| source_api_error(e, SourceType::Gmail))
    }
}

#[async_trait]
impl SourceAdapter for GmailAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Gmail
    }

    async fn list_changed_items(
        &self,
        settings: &ConnectionSettings,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangedItem>> {
        let mut query = settings.query.clone().unwrap_or_default();
        if let Some(since) = since {
            // Gmail's `after:` operator is day-granular
            query.push_str(&format!(" after:{}", since.format("%Y/%m/%d")));
        }

        let mut params: Vec<(String, String)> = vec![
            ("maxResults".to_string(), self.page_size.to_string()),
        ];
        if !query.trim().is_empty() {
            params.push(("q".to_string(), query.trim().to_string()));
        }
        for label in &settings.label_ids {
            params.push(("labelIds".to_string(), label.clone()));
        }

        let response = self
            .http
            .get(MESSAGES_URL)
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| source_api_error(e, SourceType::Gmail))?;

        let list: MessageList = response
            .json()
            .await
            .map_err(|e| source_api_error(e, SourceType::Gmail))?;

        let mut items = Vec::with_capacity(list.messages.len());
        for message_ref in list.messages {
            let message = self.get_message(&message_ref.id, access_token).await?;

            let subject = message
                .header("Subject")
                .unwrap_or("(no subject)")
                .to_string();
            let sender = message.header("From").unwrap_or_default().to_string();
            let body = message.body_text();
            let received_at = message.received_at();

            items.push(ChangedItem {
                source_id: message.id.clone(),
                title: subject,
                modified_at: received_at,
                url: None,
                detail: ItemDetail::Email {
                    thread_id: message.thread_id.clone(),
                    sender,
                    snippet: message.snippet.clone(),
                    body,
                },
            });
        }

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body_base64url() {
        // "Hello, World!" in base64url with padding stripped server-side
        assert_eq!(
            decode_body("SGVsbG8sIFdvcmxkIQ").as_deref(),
            Some("Hello, World!")
        );
        // Padded input decodes too
        assert_eq!(
            decode_body("SGVsbG8sIFdvcmxkIQ==").as_deref(),
            Some("Hello, World!")
        );
        assert!(decode_body("!!not base64!!").is_none());
    }

    #[test]
    fn test_message_header_lookup_is_case_insensitive() {
        let message = Message {
            id: "m1".to_string(),
            thread_id: None,
            snippet: None,
            internal_date: Some("1722940800000".to_string()),
            payload: Some(MessagePart {
                mime_type: Some("text/plain".to_string()),
                headers: vec![Header {
                    name: "subject".to_string(),
                    value: "Approval needed".to_string(),
                }],
                body: None,
                parts: Vec::new(),
            }),
        };

        assert_eq!(message.header("Subject"), Some("Approval needed"));
        assert_eq!(message.received_at().timestamp_millis(), 1722940800000);
    }
}
