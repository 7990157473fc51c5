//! Outlook adapter.
//!
//! Lists recent messages from the connected mailbox via Microsoft Graph and
//! maps them to normalized email items. Graph returns a preview rather than
//! the full body on list calls; the preview doubles as the snippet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{source_api_error, ChangedItem, ConnectionSettings, ItemDetail, SourceAdapter, SourceType};
use crate::error::Result;

const MESSAGES_URL: &str = "https://graph.microsoft.com/v1.0/me/messages";

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    value: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
    received_date_time: DateTime<Utc>,
    #[serde(default)]
    body_preview: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    email_address: Option<EmailAddress>,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    address: Option<String>,
}

/// Outlook source adapter.
pub struct OutlookAdapter {
    http: reqwest::Client,
    page_size: u32,
}

impl OutlookAdapter {
    pub fn new(http: reqwest::Client, page_size: u32) -> Self {
        Self { http, page_size }
    }
}

#[async_trait]
impl SourceAdapter for OutlookAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Outlook
    }

    async fn list_changed_items(
        &self,
        settings: &ConnectionSettings,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangedItem>> {
        let mut params: Vec<(String, String)> = vec![
            ("$top".to_string(), self.page_size.to_string()),
            (
                "$select".to_string(),
                "id,conversationId,subject,from,receivedDateTime,bodyPreview".to_string(),
            ),
            ("$orderby".to_string(), "receivedDateTime desc".to_string()),
        ];

        if let Some(since) = since {
            params.push((
                "$filter".to_string(),
                format!(
                    "receivedDateTime gt {}",
                    since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                ),
            ));
        }
        if let Some(query) = settings.query.as_deref() {
            if !query.trim().is_empty() {
                params.push(("$search".to_string(), format!("\"{}\"", query.trim())));
            }
        }

        let response = self
            .http
            .get(MESSAGES_URL)
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| source_api_error(e, SourceType::Outlook))?;

        let list: MessageList = response
            .json()
            .await
            .map_err(|e| source_api_error(e, SourceType::Outlook))?;

        let items = list
            .value
            .into_iter()
            .map(|message| {
                let sender = message
                    .from
                    .and_then(|f| f.email_address)
                    .and_then(|a| a.address)
                    .unwrap_or_default();

                ChangedItem {
                    source_id: message.id,
                    title: message.subject.unwrap_or_else(|| "(no subject)".to_string()),
                    modified_at: message.received_date_time,
                    url: None,
                    detail: ItemDetail::Email {
                        thread_id: message.conversation_id,
                        sender,
                        snippet: message.body_preview.clone(),
                        body: message.body_preview,
                    },
                }
            })
            .collect();

        Ok(items)
    }
}
