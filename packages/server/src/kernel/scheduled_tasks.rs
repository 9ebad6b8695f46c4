//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The recurring trigger runs on a cron schedule (every 15 minutes by
//! default). It does not scrape anything itself: it enqueues jobs for due
//! tracked domains, starts discoveries for due tracked searches, and sweeps
//! discoveries whose children have all finished.
//!
//! ```text
//! Scheduler (TRIGGER_SCHEDULE)
//!     │
//!     └─► RecurringTrigger.run_cycle(now)
//!             ├─► due tracked domains  → CAS next_run_at → enqueue job
//!             ├─► due tracked searches → CAS next_run_at → run discovery
//!             └─► sweep stale / finished discoveries
//! ```
//!
//! Running several instances is safe: the compare-and-swap on
//! `next_run_at` lets exactly one of them fire each due row.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use scrape_core::{RecurringTrigger, Store};
use tokio_cron_scheduler::{Job, JobScheduler};

/// Start all scheduled tasks
pub async fn start_scheduler<S: Store + 'static>(
    trigger: Arc<RecurringTrigger<S>>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    let schedule = trigger.config().schedule.clone();

    let trigger_job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let trigger = trigger.clone();
        Box::pin(async move {
            run_trigger_cycle(&trigger).await;
        })
    })?;

    scheduler.add(trigger_job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = %schedule, "scheduled tasks started (recurring trigger)");
    Ok(scheduler)
}

async fn run_trigger_cycle<S: Store>(trigger: &RecurringTrigger<S>) {
    match trigger.run_cycle(Utc::now()).await {
        Ok(report) => tracing::info!(
            domain_jobs = report.domain_jobs_enqueued,
            discoveries = report.discoveries_started,
            lost_claims = report.lost_claims,
            errors = report.errors,
            completed = report.discoveries_completed,
            interrupted = report.discoveries_interrupted,
            "trigger cycle finished"
        ),
        Err(e) => tracing::error!(error = %e, "trigger cycle failed"),
    }
}
