//! Google Drive adapter.
//!
//! Lists files in the connection's monitored folder via the Drive v3
//! `files.list` endpoint and maps them to normalized document items.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{source_api_error, ChangedItem, ConnectionSettings, ItemDetail, SourceAdapter, SourceType};
use crate::error::Result;

const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    modified_time: DateTime<Utc>,
    #[serde(default)]
    web_view_link: Option<String>,
}

/// Google Drive source adapter.
pub struct DriveAdapter {
    http: reqwest::Client,
    page_size: u32,
}

impl DriveAdapter {
    pub fn new(http: reqwest::Client, page_size: u32) -> Self {
        Self { http, page_size }
    }
}

#[async_trait]
impl SourceAdapter for DriveAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::GDrive
    }

    async fn list_changed_items(
        &self,
        settings: &ConnectionSettings,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangedItem>> {
        let Some(folder_id) = settings.folder_id.as_deref() else {
            tracing::warn!("Drive connection has no monitored folder configured");
            return Ok(Vec::new());
        };

        let mut query = format!("'{}' in parents and trashed=false", folder_id);
        if let Some(since) = since {
            query.push_str(&format!(
                " and modifiedTime > '{}'",
                since.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
            ));
        }

        let response = self
            .http
            .get(FILES_URL)
            .bearer_auth(access_token)
            .query(&[
                ("q", query.as_str()),
                (
                    "fields",
                    "files(id, name, mimeType, modifiedTime, webViewLink)",
                ),
                ("orderBy", "modifiedTime desc"),
                ("pageSize", &self.page_size.to_string()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| source_api_error(e, SourceType::GDrive))?;

        let list: FileList = response
            .json()
            .await
            .map_err(|e| source_api_error(e, SourceType::GDrive))?;

        let items = list
            .files
            .into_iter()
            .filter(|f| f.mime_type != FOLDER_MIME)
            .map(|f| ChangedItem {
                source_id: f.id,
                title: f.name,
                modified_at: f.modified_time,
                url: f.web_view_link,
                detail: ItemDetail::Document,
            })
            .collect();

        Ok(items)
    }
}
