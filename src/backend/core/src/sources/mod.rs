//! External source integration.
//!
//! The sync processors consume one normalized contract: every source exposes
//! "list changed items since a watermark" and returns [`ChangedItem`]s
//! carrying a source-native id, a title, a modification timestamp, and a
//! content locator. Everything provider-specific stays inside the adapters.
//!
//! Adapters are strictly read-only against the external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{ErrorCode, PulseError, Result};

pub mod circuit;
pub mod gdrive;
pub mod gmail;
pub mod outlook;
pub mod sharepoint;
pub mod token;

pub use circuit::AuthCircuitBreaker;
pub use gdrive::DriveAdapter;
pub use gmail::GmailAdapter;
pub use outlook::OutlookAdapter;
pub use sharepoint::SharePointAdapter;
pub use token::{OauthTokenProvider, TokenProvider};

// ═══════════════════════════════════════════════════════════════════════════════
// Source Types
// ═══════════════════════════════════════════════════════════════════════════════

/// The supported external sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    GDrive,
    Gmail,
    SharePoint,
    Outlook,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GDrive => "gdrive",
            Self::Gmail => "gmail",
            Self::SharePoint => "sharepoint",
            Self::Outlook => "outlook",
        }
    }

    /// The OAuth provider backing this source.
    pub fn provider(&self) -> OauthProvider {
        match self {
            Self::GDrive | Self::Gmail => OauthProvider::Google,
            Self::SharePoint | Self::Outlook => OauthProvider::Microsoft,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "gdrive" => Ok(Self::GDrive),
            "gmail" => Ok(Self::Gmail),
            "sharepoint" => Ok(Self::SharePoint),
            "outlook" => Ok(Self::Outlook),
            other => Err(PulseError::new(
                ErrorCode::InvalidInput,
                format!("Unknown source type: {}", other),
            )),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OAuth provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OauthProvider {
    Google,
    Microsoft,
}

impl OauthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Connection Settings
// ═══════════════════════════════════════════════════════════════════════════════

/// Source-specific configuration stored on a connection row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Drive folder to monitor (gdrive)
    #[serde(default)]
    pub folder_id: Option<String>,

    /// Graph drive id (sharepoint)
    #[serde(default)]
    pub drive_id: Option<String>,

    /// Graph site id (sharepoint, when no drive id is pinned)
    #[serde(default)]
    pub site_id: Option<String>,

    /// Gmail label ids to restrict the search to
    #[serde(default)]
    pub label_ids: Vec<String>,

    /// Free-form search query (gmail/outlook)
    #[serde(default)]
    pub query: Option<String>,
}

impl ConnectionSettings {
    /// Deserialize from the JSONB column, tolerating missing fields.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Changed Items
// ═══════════════════════════════════════════════════════════════════════════════

/// What kind of entity a changed item maps to.
#[derive(Debug, Clone)]
pub enum ItemDetail {
    /// A document (file in Drive/SharePoint)
    Document,
    /// An email message
    Email {
        thread_id: Option<String>,
        sender: String,
        snippet: Option<String>,
        body: Option<String>,
    },
}

/// A normalized changed item from an external source.
#[derive(Debug, Clone)]
pub struct ChangedItem {
    /// Source-native identifier (idempotent upsert key)
    pub source_id: String,
    /// File name or email subject
    pub title: String,
    /// Source modification time (documents) or received time (email)
    pub modified_at: DateTime<Utc>,
    /// Content locator, when the source exposes one
    pub url: Option<String>,
    /// Entity-specific detail
    pub detail: ItemDetail,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Adapter Contract
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalized read-only view of an external source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter serves.
    fn source_type(&self) -> SourceType;

    /// List items changed since the watermark (or everything the settings
    /// scope to, when `since` is `None`).
    async fn list_changed_items(
        &self,
        settings: &ConnectionSettings,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChangedItem>>;
}

/// The adapter set for all supported sources.
pub struct SourceAdapters {
    gdrive: Arc<dyn SourceAdapter>,
    gmail: Arc<dyn SourceAdapter>,
    sharepoint: Arc<dyn SourceAdapter>,
    outlook: Arc<dyn SourceAdapter>,
}

impl SourceAdapters {
    /// Build the production adapter set over a shared HTTP client.
    pub fn new(http: reqwest::Client, page_size: u32) -> Self {
        Self {
            gdrive: Arc::new(DriveAdapter::new(http.clone(), page_size)),
            gmail: Arc::new(GmailAdapter::new(http.clone(), page_size)),
            sharepoint: Arc::new(SharePointAdapter::new(http.clone(), page_size)),
            outlook: Arc::new(OutlookAdapter::new(http, page_size)),
        }
    }

    /// Build from explicit adapters (for testing with fakes).
    pub fn from_adapters(
        gdrive: Arc<dyn SourceAdapter>,
        gmail: Arc<dyn SourceAdapter>,
        sharepoint: Arc<dyn SourceAdapter>,
        outlook: Arc<dyn SourceAdapter>,
    ) -> Self {
        Self {
            gdrive,
            gmail,
            sharepoint,
            outlook,
        }
    }

    pub fn get(&self, source_type: SourceType) -> Arc<dyn SourceAdapter> {
        match source_type {
            SourceType::GDrive => self.gdrive.clone(),
            SourceType::Gmail => self.gmail.clone(),
            SourceType::SharePoint => self.sharepoint.clone(),
            SourceType::Outlook => self.outlook.clone(),
        }
    }
}

/// Map an HTTP failure from a source API onto the error taxonomy.
///
/// 401/403 means the token is bad (credential problem, not retryable);
/// everything else is the source being flaky (retryable).
pub(crate) fn source_api_error(error: reqwest::Error, source: SourceType) -> PulseError {
    let code = match error.status() {
        Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
            ErrorCode::CredentialRefreshFailed
        }
        _ => ErrorCode::SourceApiError,
    };

    PulseError::with_internal(
        code,
        format!("{} API request failed", source),
        error.to_string(),
    )
    .with_source(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_roundtrip() {
        for st in [
            SourceType::GDrive,
            SourceType::Gmail,
            SourceType::SharePoint,
            SourceType::Outlook,
        ] {
            assert_eq!(SourceType::parse(st.as_str()).unwrap(), st);
        }
        assert!(SourceType::parse("dropbox").is_err());
    }

    #[test]
    fn test_provider_mapping() {
        assert_eq!(SourceType::GDrive.provider(), OauthProvider::Google);
        assert_eq!(SourceType::Gmail.provider(), OauthProvider::Google);
        assert_eq!(SourceType::SharePoint.provider(), OauthProvider::Microsoft);
        assert_eq!(SourceType::Outlook.provider(), OauthProvider::Microsoft);
    }

    #[test]
    fn test_settings_tolerate_unknown_shape() {
        let settings = ConnectionSettings::from_value(&serde_json::json!({
            "folder_id": "abc",
            "unrelated": true
        }));
        assert_eq!(settings.folder_id.as_deref(), Some("abc"));
        assert!(settings.label_ids.is_empty());

        let empty = ConnectionSettings::from_value(&serde_json::json!(null));
        assert!(empty.folder_id.is_none());
    }
}
