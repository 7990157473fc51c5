//! HTTP API for DealPulse Core.
//!
//! The pipeline's operational surface: queue introspection and manual
//! triggers. End-user screens live elsewhere; this API serves operators
//! and the CLI.

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::Database;
use crate::jobs::JobQueues;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub queues: Arc<JobQueues>,
}

/// Build the API router.
///
/// # Endpoints
///
/// - `GET /health` - liveness check
/// - `GET /api/v1/queues/stats` - per-queue job counts
/// - `POST /api/v1/briefs/trigger` - fan out one daily-brief job per active deal
/// - `POST /api/v1/briefs/generate` - enqueue a brief for one deal
/// - `POST /api/v1/sync/trigger` - enqueue a source sync for one deal
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", v1_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/queues/stats", get(handlers::queue_stats))
        .route("/briefs/trigger", post(handlers::trigger_daily_briefs))
        .route("/briefs/generate", post(handlers::generate_brief))
        .route("/sync/trigger", post(handlers::trigger_sync))
}

/// API response wrapper.
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_error() {
        let response: ApiResponse<()> = ApiResponse::error("test error");
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error, Some("test error".to_string()));
    }
}
