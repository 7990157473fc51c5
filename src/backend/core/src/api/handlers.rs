//! API request handlers with proper error propagation.
//!
//! All handlers return `Result<impl IntoResponse, PulseError>` so that
//! errors are automatically converted to appropriate HTTP status codes via
//! the `IntoResponse` implementation on `PulseError`.

use axum::{extract::State, response::IntoResponse, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiResponse, AppState};
use crate::error::PulseError;
use crate::jobs::{fan_out_daily_briefs, SyncType};
use crate::sources::SourceType;

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queue Introspection
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn queue_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PulseError> {
    let stats = state.queues.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Brief Triggers
// ═══════════════════════════════════════════════════════════════════════════════

/// Fan out one daily-brief job per active deal.
///
/// Shares the scheduler's dedup key space, so triggering on the same day as
/// the cron run collapses instead of double-generating.
pub async fn trigger_daily_briefs(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PulseError> {
    tracing::info!("Manually triggering daily briefs");
    let report = fan_out_daily_briefs(&state.db, &state.queues).await?;
    Ok(Json(ApiResponse::success(report)))
}

#[derive(Deserialize)]
pub struct GenerateBriefRequest {
    pub deal_id: Uuid,
    pub date: Option<NaiveDate>,
}

/// Enqueue brief generation for a single deal.
pub async fn generate_brief(
    State(state): State<AppState>,
    Json(req): Json<GenerateBriefRequest>,
) -> Result<impl IntoResponse, PulseError> {
    state
        .db
        .get_deal(req.deal_id)
        .await?
        .ok_or_else(|| PulseError::not_found("Deal", req.deal_id.to_string()))?;

    let handle = state.queues.enqueue_daily_brief(req.deal_id, req.date).await?;
    Ok(Json(ApiResponse::success(handle)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sync Triggers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct TriggerSyncRequest {
    pub deal_id: Uuid,
    pub source_type: SourceType,
    #[serde(default = "default_sync_type")]
    pub sync_type: SyncType,
}

fn default_sync_type() -> SyncType {
    SyncType::Incremental
}

/// Enqueue a source sync for a single deal.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(req): Json<TriggerSyncRequest>,
) -> Result<impl IntoResponse, PulseError> {
    state
        .db
        .get_deal(req.deal_id)
        .await?
        .ok_or_else(|| PulseError::not_found("Deal", req.deal_id.to_string()))?;

    let handle = state
        .queues
        .enqueue_source_sync(req.deal_id, req.source_type, req.sync_type)
        .await?;
    Ok(Json(ApiResponse::success(handle)))
}
