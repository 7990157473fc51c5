//! Configuration management.

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Daily brief scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Source sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// AI provider configuration
    #[serde(default)]
    pub ai: AiConfig,

    /// OAuth client configuration (token refresh only)
    #[serde(default)]
    pub oauth: OauthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
        }
    }
}

/// Daily brief scheduler cadence.
///
/// The cron expression and timezone are explicit configuration inputs; the
/// scheduler itself never reads the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the cron scheduler runs at all
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,

    /// Five-field cron expression for the daily fan-out
    #[serde(default = "default_scheduler_cron")]
    pub cron: String,

    /// IANA timezone the cron expression is evaluated in
    #[serde(default = "default_scheduler_timezone")]
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            cron: default_scheduler_cron(),
            timezone: default_scheduler_timezone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Consecutive auth failures before a source connection is deactivated
    #[serde(default = "default_auth_failure_threshold")]
    pub auth_failure_threshold: u32,

    /// Page size for "list changed items" calls against source APIs
    #[serde(default = "default_sync_page_size")]
    pub page_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auth_failure_threshold: default_auth_failure_threshold(),
            page_size: default_sync_page_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// Anthropic API key
    #[serde(default)]
    pub api_key: String,

    /// Model identifier
    #[serde(default = "default_ai_model")]
    pub model: String,

    /// API base URL
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    /// Maximum completion tokens
    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_ai_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_ai_model(),
            base_url: default_ai_base_url(),
            max_tokens: default_ai_max_tokens(),
            timeout_secs: default_ai_timeout_secs(),
        }
    }
}

/// OAuth client credentials used only to refresh stored access tokens.
/// The authorization-code flow lives outside this service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OauthConfig {
    #[serde(default)]
    pub google_client_id: String,
    #[serde(default)]
    pub google_client_secret: String,
    #[serde(default)]
    pub microsoft_client_id: String,
    #[serde(default)]
    pub microsoft_client_secret: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_scheduler_enabled() -> bool {
    true
}
fn default_scheduler_cron() -> String {
    "0 8 * * *".to_string()
}
fn default_scheduler_timezone() -> String {
    "America/New_York".to_string()
}
fn default_auth_failure_threshold() -> u32 {
    3
}
fn default_sync_page_size() -> u32 {
    100
}
fn default_ai_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_ai_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_ai_max_tokens() -> u32 {
    4096
}
fn default_ai_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from environment and config files.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("DEALPULSE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("DEALPULSE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_defaults() {
        let cfg = SchedulerConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.cron, "0 8 * * *");
        assert_eq!(cfg.timezone, "America/New_York");
    }

    #[test]
    fn test_sync_defaults() {
        let cfg = SyncConfig::default();
        assert_eq!(cfg.auth_failure_threshold, 3);
        assert_eq!(cfg.page_size, 100);
    }
}
