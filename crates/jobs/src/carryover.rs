//! Daily carryover of unfinished overdue tasks.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use fieldops_core::{FieldEvent, TaskFilter, TaskStatus, Time};
use fieldops_outbox::Outbox;
use fieldops_store::{Result, Store};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tag appended to a task the first time it is carried over.
const OVERDUE_TAG: &str = "overdue";

/// Configuration for the carryover scheduler.
#[derive(Debug, Clone)]
pub struct CarryoverConfig {
    /// Minute of the local day the run fires at
    pub run_at_minute: u16,

    /// Local-time offset from UTC, in minutes
    pub utc_offset_minutes: i32,
}

impl Default for CarryoverConfig {
    fn default() -> Self {
        Self {
            run_at_minute: 0,
            utc_offset_minutes: 0,
        }
    }
}

impl CarryoverConfig {
    /// Set the minute of the local day the run fires at.
    pub fn with_run_at_minute(mut self, minute: u16) -> Self {
        self.run_at_minute = minute;
        self
    }

    /// Set the local-time offset.
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }
}

/// Counts from one carryover run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarryoverReport {
    /// Tasks marked in this run
    pub processed: usize,
    /// Tasks already marked for the day
    pub skipped: usize,
    /// Tasks whose update failed; retried next run
    pub failed: usize,
}

/// Rolls unfinished overdue tasks forward once per local day.
///
/// A task is carried over by appending the overdue tag (once in its
/// lifetime) and the day's carryover mark; status and time tracking are
/// left untouched. The mark makes reruns within the same day skip the
/// task, so the run is idempotent.
pub struct CarryoverScheduler {
    store: Arc<dyn Store>,
    outbox: Outbox,
    config: CarryoverConfig,
}

impl CarryoverScheduler {
    /// Create a scheduler with default configuration.
    pub fn new(store: Arc<dyn Store>, outbox: Outbox) -> Self {
        Self::with_config(store, outbox, CarryoverConfig::default())
    }

    /// Create a scheduler with explicit configuration.
    pub fn with_config(store: Arc<dyn Store>, outbox: Outbox, config: CarryoverConfig) -> Self {
        Self {
            store,
            outbox,
            config,
        }
    }

    /// The local calendar day `at` falls on.
    pub fn local_date(&self, at: Time) -> NaiveDate {
        (at + chrono::Duration::minutes(self.config.utc_offset_minutes as i64)).date_naive()
    }

    /// Run the carryover batch for `today`.
    ///
    /// Per-item failures are counted, logged, and left for the next run;
    /// they never abort the rest of the batch.
    pub async fn run_once(&self, today: NaiveDate) -> Result<CarryoverReport> {
        let filter = TaskFilter {
            status: Some(vec![
                TaskStatus::NotStarted,
                TaskStatus::InProgress,
                TaskStatus::Paused,
            ]),
            due_before: Some(today),
            ..Default::default()
        };
        let candidates = self.store.list_tasks(&filter).await?;

        let mut report = CarryoverReport::default();
        for mut task in candidates {
            if task.has_carryover_mark(today) {
                report.skipped += 1;
                continue;
            }

            if !task.tags.iter().any(|t| t == OVERDUE_TAG) {
                task.tags.push(OVERDUE_TAG.to_string());
            }
            task.carryover_marks.push(today);
            task.updated_at = Utc::now();

            match self.store.update_task_versioned(&task).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "carryover update failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            %today,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "carryover run finished"
        );
        if report.processed > 0 {
            self.outbox
                .publish(FieldEvent::TasksCarriedOver {
                    date: today,
                    count: report.processed,
                    at: Utc::now(),
                })
                .await;
        }
        Ok(report)
    }

    /// Loop forever, firing once per local day until `shutdown` cancels.
    ///
    /// A failed run (store unavailable) is logged and deferred to the
    /// next scheduled time; there is no mid-cycle retry.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            run_at_minute = self.config.run_at_minute,
            "carryover scheduler started"
        );
        loop {
            let wait = self.until_next_run(Utc::now());
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("carryover scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let today = self.local_date(Utc::now());
            if let Err(e) = self.run_once(today).await {
                warn!(error = %e, "carryover run deferred to next schedule");
            }
        }
    }

    fn until_next_run(&self, now: Time) -> std::time::Duration {
        let local = (now + chrono::Duration::minutes(self.config.utc_offset_minutes as i64))
            .naive_utc();
        let mut next = local.date().and_time(NaiveTime::MIN)
            + chrono::Duration::minutes(self.config.run_at_minute as i64);
        if next <= local {
            next += chrono::Duration::days(1);
        }
        (next - local).to_std().unwrap_or_default()
    }
}
