//! Access token management for source connections.
//!
//! Retrieves the stored access token for a connection, refreshing it through
//! the provider's token endpoint when it is expired or expires within the
//! next five minutes. Rotated tokens are persisted back onto the connection.
//!
//! The authorization-code flow that creates connections lives in the web
//! application; this service only ever refreshes.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

use super::{OauthProvider, SourceType};
use crate::config::OauthConfig;
use crate::db::{Database, SourceConnectionRow};
use crate::error::{ErrorCode, PulseError, Result};

/// Refresh window: tokens expiring within this margin are refreshed eagerly.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Provider of valid access tokens for source connections.
///
/// Implementations must fail with [`ErrorCode::NoActiveConnection`] when the
/// connection is unusable by configuration, and
/// [`ErrorCode::CredentialRefreshFailed`] when the credential is dead.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a valid access token for the connection, refreshing if needed.
    async fn access_token(&self, connection: &SourceConnectionRow) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Database-backed token provider with automatic refresh.
pub struct OauthTokenProvider {
    db: Arc<Database>,
    http: reqwest::Client,
    oauth: OauthConfig,
}

impl OauthTokenProvider {
    pub fn new(db: Arc<Database>, http: reqwest::Client, oauth: OauthConfig) -> Self {
        Self { db, http, oauth }
    }

    fn client_credentials(&self, provider: OauthProvider) -> (&str, &str, &'static str) {
        match provider {
            OauthProvider::Google => (
                &self.oauth.google_client_id,
                &self.oauth.google_client_secret,
                GOOGLE_TOKEN_URL,
            ),
            OauthProvider::Microsoft => (
                &self.oauth.microsoft_client_id,
                &self.oauth.microsoft_client_secret,
                MICROSOFT_TOKEN_URL,
            ),
        }
    }

    async fn refresh(
        &self,
        connection: &SourceConnectionRow,
        provider: OauthProvider,
    ) -> Result<String> {
        let refresh_token = connection.refresh_token.as_deref().ok_or_else(|| {
            PulseError::new(
                ErrorCode::CredentialRefreshFailed,
                format!(
                    "{} connection has no refresh token; re-authentication required",
                    provider.as_str()
                ),
            )
        })?;

        let (client_id, client_secret, token_url) = self.client_credentials(provider);

        tracing::info!(
            connection_id = %connection.id,
            provider = provider.as_str(),
            "Access token expired or expiring soon, refreshing"
        );

        let response = self
            .http
            .post(token_url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(PulseError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PulseError::with_internal(
                ErrorCode::CredentialRefreshFailed,
                format!(
                    "Failed to refresh {} token; re-authentication required",
                    provider.as_str()
                ),
                format!("token endpoint returned {}: {}", status, body),
            ));
        }

        let tokens: TokenResponse = response.json().await.map_err(|e| {
            PulseError::with_internal(
                ErrorCode::CredentialRefreshFailed,
                "Token refresh returned an unreadable response",
                e.to_string(),
            )
        })?;

        let expires_at = Utc::now() + Duration::seconds(tokens.expires_in.unwrap_or(3600));

        self.db
            .update_connection_tokens(
                connection.id,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
                expires_at,
            )
            .await?;

        tracing::info!(
            connection_id = %connection.id,
            provider = provider.as_str(),
            "Access token refreshed"
        );

        Ok(tokens.access_token)
    }
}

#[async_trait]
impl TokenProvider for OauthTokenProvider {
    async fn access_token(&self, connection: &SourceConnectionRow) -> Result<String> {
        if !connection.is_active {
            return Err(PulseError::no_active_connection(
                connection.source_type.as_str(),
            ));
        }

        let provider = SourceType::parse(&connection.source_type)?.provider();

        let needs_refresh = match connection.token_expires_at {
            Some(expires_at) => expires_at < Utc::now() + Duration::minutes(EXPIRY_BUFFER_MINUTES),
            // No recorded expiry: assume the stored token is still usable.
            None => false,
        };

        if needs_refresh {
            self.refresh(connection, provider).await
        } else {
            Ok(connection.access_token.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn connection(
        is_active: bool,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> SourceConnectionRow {
        SourceConnectionRow {
            id: Uuid::new_v4(),
            deal_id: Uuid::new_v4(),
            source_type: "gdrive".to_string(),
            is_active,
            access_token: "stored-token".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_expires_at: expires_at,
            settings: serde_json::json!({}),
            last_synced_at: None,
        }
    }

    #[test]
    fn test_refresh_window() {
        // Valid for an hour: no refresh needed
        let conn = connection(true, Some(Utc::now() + Duration::hours(1)));
        let needs = conn
            .token_expires_at
            .map(|at| at < Utc::now() + Duration::minutes(EXPIRY_BUFFER_MINUTES))
            .unwrap_or(false);
        assert!(!needs);

        // Expiring in two minutes: inside the buffer
        let conn = connection(true, Some(Utc::now() + Duration::minutes(2)));
        let needs = conn
            .token_expires_at
            .map(|at| at < Utc::now() + Duration::minutes(EXPIRY_BUFFER_MINUTES))
            .unwrap_or(false);
        assert!(needs);
    }
}
