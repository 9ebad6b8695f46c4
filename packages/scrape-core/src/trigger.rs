//! Recurring trigger: turns due tracked domains and searches into work.
//!
//! Each due row is advanced with a compare-and-swap on `next_run_at`, so
//! when two trigger instances run the same cycle only one of them wins the
//! row and enqueues its run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::config::TriggerConfig;
use crate::discovery::DiscoveryPipeline;
use crate::error::Result;
use crate::traits::Store;
use crate::types::{NewDiscovery, NewScrapeJob, ScrapeJob, TrackedDomain, TrackedSearch};

/// Rows examined per kind per cycle.
const DUE_BATCH: i64 = 100;

/// What one trigger cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerReport {
    pub domain_jobs_enqueued: usize,
    pub discoveries_started: usize,
    /// Due rows another trigger advanced first.
    pub lost_claims: usize,
    pub errors: usize,
    pub discoveries_completed: usize,
    pub discoveries_interrupted: usize,
}

pub struct RecurringTrigger<S> {
    store: Arc<S>,
    pipeline: Arc<DiscoveryPipeline<S>>,
    config: TriggerConfig,
}

impl<S: Store> RecurringTrigger<S> {
    pub fn new(store: Arc<S>, pipeline: Arc<DiscoveryPipeline<S>>, config: TriggerConfig) -> Self {
        Self {
            store,
            pipeline,
            config,
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Run one cycle. Failures on individual rows are logged and counted;
    /// the cycle carries on with the remaining rows.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<TriggerReport> {
        let mut report = TriggerReport::default();

        for tracked in self.store.due_tracked_domains(now, DUE_BATCH).await? {
            match self.fire_domain(&tracked, now).await {
                Ok(true) => report.domain_jobs_enqueued += 1,
                Ok(false) => report.lost_claims += 1,
                Err(e) => {
                    error!(domain = %tracked.domain, error = %e, "tracked domain run failed");
                    report.errors += 1;
                }
            }
        }

        for tracked in self.store.due_tracked_searches(now, DUE_BATCH).await? {
            match self.fire_search(&tracked, now).await {
                Ok(true) => report.discoveries_started += 1,
                Ok(false) => report.lost_claims += 1,
                Err(e) => {
                    error!(tracked_search_id = %tracked.id, error = %e, "tracked search run failed");
                    report.errors += 1;
                }
            }
        }

        report.discoveries_interrupted = self
            .pipeline
            .fail_stale(self.config.stale_discovery_timeout, now)
            .await?
            .len();
        report.discoveries_completed = self.pipeline.complete_finished(now).await?.len();

        info!(?report, "trigger cycle finished");
        Ok(report)
    }

    async fn fire_domain(&self, tracked: &TrackedDomain, now: DateTime<Utc>) -> Result<bool> {
        let next = tracked.frequency.next_run_after(tracked.next_run_at, now);
        let job = ScrapeJob::new(tracked_domain_job(tracked), now);

        let claimed = self
            .store
            .claim_tracked_domain_run(&tracked.domain, tracked.next_run_at, next, now, &job)
            .await?;
        if claimed {
            debug!(domain = %tracked.domain, job_id = %job.id, next_run_at = %next, "tracked domain fired");
        }
        Ok(claimed)
    }

    async fn fire_search(&self, tracked: &TrackedSearch, now: DateTime<Utc>) -> Result<bool> {
        let next = tracked.frequency.next_run_after(tracked.next_run_at, now);
        if !self
            .store
            .claim_tracked_search_run(tracked.id, tracked.next_run_at, next, now)
            .await?
        {
            return Ok(false);
        }

        let discovery = self
            .pipeline
            .run_discovery(tracked_search_discovery(tracked), now)
            .await?;
        debug!(
            tracked_search_id = %tracked.id,
            discovery_id = %discovery.id,
            status = %discovery.status,
            next_run_at = %next,
            "tracked search fired"
        );
        Ok(true)
    }
}

fn tracked_domain_job(tracked: &TrackedDomain) -> NewScrapeJob {
    NewScrapeJob {
        domain: tracked.domain.clone(),
        data_types: tracked.data_types.clone(),
        max_pages: tracked.max_pages,
        template_id: tracked.template_id.clone(),
        priority: tracked.priority,
        org_id: tracked.org_id.clone(),
        callback_url: tracked.webhook_url.clone(),
        budget: tracked.budget.clone(),
        discovery_id: None,
    }
}

fn tracked_search_discovery(tracked: &TrackedSearch) -> NewDiscovery {
    NewDiscovery {
        query: tracked.query.clone(),
        params: tracked.params,
        data_types: tracked.data_types.clone(),
        max_pages_per_domain: tracked.max_pages_per_domain,
        priority: tracked.priority,
        org_id: tracked.org_id.clone(),
        callback_url: tracked.webhook_url.clone(),
        tracked_search_id: Some(tracked.id),
    }
}
