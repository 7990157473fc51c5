//! Daily brief scheduling.
//!
//! A timezone-aware cron trigger that fans out one daily-brief job per
//! active deal. Per-deal enqueue failures are collected into the returned
//! [`FanOutReport`] and never abort the fan-out for the remaining deals.
//! The manual API trigger shares [`fan_out_daily_briefs`], so a manual run
//! on the same day as the cron run collapses on the per-(deal, date) dedup
//! key instead of double-generating.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use serde::Serialize;
use uuid::Uuid;

use super::JobQueues;
use crate::config::SchedulerConfig;
use crate::db::Database;
use crate::error::{ErrorCode, PulseError, Result};

/// One successful enqueue in a fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct FanOutEntry {
    pub deal_id: Uuid,
    pub deal_name: String,
    pub job_id: super::JobId,
    /// True when the submission collapsed into an already-queued job
    pub deduplicated: bool,
}

/// One failed enqueue in a fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct FanOutFailure {
    pub deal_id: Uuid,
    pub deal_name: String,
    pub error: String,
}

/// Aggregate result of a daily-brief fan-out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanOutReport {
    pub queued: Vec<FanOutEntry>,
    pub failed: Vec<FanOutFailure>,
}

impl FanOutReport {
    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Enqueue one daily-brief job for every active deal.
///
/// A deal whose enqueue fails is recorded and skipped; the rest of the
/// fan-out proceeds.
pub async fn fan_out_daily_briefs(db: &Database, queues: &JobQueues) -> Result<FanOutReport> {
    let deals = db.active_deals().await?;

    if deals.is_empty() {
        tracing::info!("No active deals, nothing to fan out");
        return Ok(FanOutReport::default());
    }

    tracing::info!(deal_count = deals.len(), "Queueing daily briefs");

    let mut report = FanOutReport::default();
    for deal in deals {
        match queues.enqueue_daily_brief(deal.id, None).await {
            Ok(handle) => report.queued.push(FanOutEntry {
                deal_id: deal.id,
                deal_name: deal.name,
                job_id: handle.id,
                deduplicated: handle.deduplicated,
            }),
            Err(e) => {
                tracing::error!(deal_id = %deal.id, deal_name = %deal.name, error = %e, "Failed to queue daily brief");
                report.failed.push(FanOutFailure {
                    deal_id: deal.id,
                    deal_name: deal.name,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        queued = report.queued_count(),
        failed = report.failed_count(),
        "Daily brief fan-out complete"
    );
    Ok(report)
}

/// Parse a five-field cron expression.
///
/// The cron crate expects six fields (with seconds); prepend "0".
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let full_expr = format!("0 {}", expr);
    Schedule::from_str(&full_expr).map_err(|e| {
        PulseError::with_internal(
            ErrorCode::InvalidConfiguration,
            format!("Invalid cron expression '{}'", expr),
            e.to_string(),
        )
    })
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    shutdown: tokio::sync::watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the scheduler loop to finish.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Cron-driven daily brief scheduler.
pub struct BriefScheduler {
    schedule: Schedule,
    timezone: Tz,
    db: Arc<Database>,
    queues: Arc<JobQueues>,
}

impl BriefScheduler {
    /// Build a scheduler from explicit configuration.
    pub fn new(config: &SchedulerConfig, db: Arc<Database>, queues: Arc<JobQueues>) -> Result<Self> {
        let schedule = parse_cron(&config.cron)?;
        let timezone: Tz = config.timezone.parse().map_err(|_| {
            PulseError::new(
                ErrorCode::InvalidConfiguration,
                format!("Invalid timezone '{}'", config.timezone),
            )
        })?;

        Ok(Self {
            schedule,
            timezone,
            db,
            queues,
        })
    }

    /// Start the scheduler loop.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

        let join = tokio::spawn(async move {
            tracing::info!(timezone = %self.timezone, "Daily brief scheduler started");

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let Some(next) = self.schedule.upcoming(self.timezone).next() else {
                    tracing::warn!("Cron schedule has no upcoming occurrence, scheduler stopping");
                    break;
                };

                let next_utc = next.with_timezone(&Utc);
                let wait = (next_utc - Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);

                tracing::debug!(next_run = %next_utc, wait_secs = wait.as_secs(), "Scheduler sleeping");

                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // A closed channel means the handle is gone; stop.
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ = tokio::time::sleep(wait) => {},
                }

                tracing::info!("Daily brief scheduler triggered");
                if let Err(e) = fan_out_daily_briefs(&self.db, &self.queues).await {
                    tracing::error!(error = %e, "Daily brief fan-out failed");
                }
            }

            tracing::info!("Daily brief scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cron_daily_8am() {
        assert!(parse_cron("0 8 * * *").is_ok());
    }

    #[test]
    fn test_parse_cron_weekdays() {
        assert!(parse_cron("30 7 * * 1-5").is_ok());
    }

    #[test]
    fn test_parse_cron_invalid() {
        assert!(parse_cron("not a cron").is_err());
        let err = parse_cron("99 99 * * *").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn test_upcoming_occurrence_is_in_the_future() {
        let schedule = parse_cron("0 8 * * *").unwrap();
        let tz: Tz = "America/New_York".parse().unwrap();
        let next = schedule.upcoming(tz).next().unwrap();
        assert!(next.with_timezone(&Utc) > Utc::now());
    }
}
