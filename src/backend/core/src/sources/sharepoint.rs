//! SharePoint adapter.
//!
//! Lists drive items under the configured site or drive root via Microsoft
//! Graph and maps files to normalized document items.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{source_api_error, ChangedItem, ConnectionSettings, ItemDetail, SourceAdapter, SourceType};
use crate::error::Result;

const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Deserialize)]
struct DriveItemList {
    #[serde(default)]
    value: Vec<DriveItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: String,
    name: String,
    last_modified_date_time: DateTime<Utc>,
    #[serde(default)]
    web_url: Option<String>,
    /// Present when the item is a folder
    #[serde(default)]
    folder: Option<serde_json::Value>,
}

/// SharePoint source adapter.
pub struct SharePointAdapter {
    http: reqwest::Client,
    page_size: u32,
}

impl SharePointAdapter {
    pub fn new(http: reqwest::Client, page_size: u32) -> Self {
        Self { http, page_size }
    }
}

#[async_trait]
impl SourceAdapter for SharePointAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::SharePoint
    }

    async fn list_changed_items(
        &self,
        settings: &ConnectionSettings,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangedItem>> {
        let url = if let Some(drive_id) = settings.drive_id.as_deref() {
            format!("{}/drives/{}/root/children", GRAPH_BASE, drive_id)
        } else if let Some(site_id) = settings.site_id.as_deref() {
            format!("{}/sites/{}/drive/root/children", GRAPH_BASE, site_id)
        } else {
            tracing::warn!("SharePoint connection has no site or drive configured");
            return Ok(Vec::new());
        };

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("$top", self.page_size.to_string().as_str()),
                ("$orderby", "lastModifiedDateTime desc"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| source_api_error(e, SourceType::SharePoint))?;

        let list: DriveItemList = response
            .json()
            .await
            .map_err(|e| source_api_error(e, SourceType::SharePoint))?;

        let items = list
            .value
            .into_iter()
            .filter(|item| item.folder.is_none())
            .filter(|item| since.map_or(true, |s| item.last_modified_date_time > s))
            .map(|item| ChangedItem {
                source_id: item.id,
                title: item.name,
                modified_at: item.last_modified_date_time,
                url: item.web_url,
                detail: ItemDetail::Document,
            })
            .collect();

        Ok(items)
    }
}
