//! Submission surface: validated entry points used by the API layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::discovery::{root_domain, DiscoveryPipeline};
use crate::error::{Result, ScrapeError};
use crate::traits::Store;
use crate::types::{
    DeadLetter, DiscoveryJob, DiscoveryJobDomain, NewDiscovery, NewScrapeJob, NewTrackedDomain,
    NewTrackedSearch, ScrapeJob, TrackedDomain, TrackedSearch,
};
use crate::webhook::WebhookDispatcher;

const MAX_QUERY_CHARS: usize = 500;

/// A discovery job together with its per-domain links.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryView {
    #[serde(flatten)]
    pub discovery: DiscoveryJob,
    pub domains: Vec<DiscoveryJobDomain>,
}

pub struct Orchestrator<S> {
    store: Arc<S>,
    pipeline: Arc<DiscoveryPipeline<S>>,
    webhooks: Arc<WebhookDispatcher<S>>,
}

impl<S> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            pipeline: self.pipeline.clone(),
            webhooks: self.webhooks.clone(),
        }
    }
}

impl<S: Store> Orchestrator<S> {
    pub fn new(
        store: Arc<S>,
        pipeline: Arc<DiscoveryPipeline<S>>,
        webhooks: Arc<WebhookDispatcher<S>>,
    ) -> Self {
        Self {
            store,
            pipeline,
            webhooks,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Queue a scrape job. The domain may be given as a bare host or a URL.
    pub async fn submit_scrape_job(&self, mut input: NewScrapeJob, now: DateTime<Utc>) -> Result<Uuid> {
        input.domain = normalize_domain(&input.domain)?;
        validate_max_pages(input.max_pages)?;
        validate_priority(input.priority)?;
        validate_data_types(&input.data_types)?;

        let job = ScrapeJob::new(input, now);
        self.store.insert_job(&job).await?;
        info!(job_id = %job.id, domain = %job.domain, priority = job.priority, "scrape job submitted");
        Ok(job.id)
    }

    /// Run a discovery; returns once its child jobs are queued.
    pub async fn submit_discovery(&self, input: NewDiscovery, now: DateTime<Utc>) -> Result<DiscoveryJob> {
        validate_query(&input.query)?;
        validate_max_pages(input.max_pages_per_domain)?;
        validate_priority(input.priority)?;
        validate_data_types(&input.data_types)?;

        self.pipeline.run_discovery(input, now).await
    }

    pub async fn register_tracked_domain(
        &self,
        mut input: NewTrackedDomain,
        now: DateTime<Utc>,
    ) -> Result<TrackedDomain> {
        input.domain = normalize_domain(&input.domain)?;
        validate_max_pages(input.max_pages)?;
        validate_priority(input.priority)?;
        validate_data_types(&input.data_types)?;

        let tracked = TrackedDomain::new(input, now);
        self.store.upsert_tracked_domain(&tracked).await?;
        info!(
            domain = %tracked.domain,
            frequency = %tracked.frequency,
            next_run_at = %tracked.next_run_at,
            "tracked domain registered"
        );
        Ok(tracked)
    }

    /// Returns `false` when the domain was not actively tracked.
    pub async fn cancel_tracked_domain(&self, domain: &str) -> Result<bool> {
        let domain = normalize_domain(domain)?;
        let cancelled = self.store.deactivate_tracked_domain(&domain).await?;
        if cancelled {
            info!(domain = %domain, "tracked domain cancelled");
        }
        Ok(cancelled)
    }

    pub async fn register_tracked_search(
        &self,
        input: NewTrackedSearch,
        now: DateTime<Utc>,
    ) -> Result<TrackedSearch> {
        validate_query(&input.query)?;
        input.params.validate()?;
        validate_max_pages(input.max_pages_per_domain)?;
        validate_priority(input.priority)?;
        validate_data_types(&input.data_types)?;

        let tracked = TrackedSearch::new(input, now);
        self.store.insert_tracked_search(&tracked).await?;
        info!(
            tracked_search_id = %tracked.id,
            frequency = %tracked.frequency,
            next_run_at = %tracked.next_run_at,
            "tracked search registered"
        );
        Ok(tracked)
    }

    pub async fn cancel_tracked_search(&self, id: Uuid) -> Result<()> {
        if !self.store.deactivate_tracked_search(id).await? {
            return Err(ScrapeError::TrackedSearchNotFound { id });
        }
        info!(tracked_search_id = %id, "tracked search cancelled");
        Ok(())
    }

    pub async fn job_status(&self, id: Uuid) -> Result<ScrapeJob> {
        self.store
            .get_job(id)
            .await?
            .ok_or(ScrapeError::JobNotFound { id })
    }

    pub async fn discovery_status(&self, id: Uuid) -> Result<DiscoveryView> {
        let discovery = self
            .store
            .get_discovery(id)
            .await?
            .ok_or(ScrapeError::DiscoveryNotFound { id })?;
        let domains = self.store.links_for_discovery(id).await?;
        Ok(DiscoveryView { discovery, domains })
    }

    pub async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        self.webhooks.dead_letters(limit).await
    }

    pub async fn replay_dead_letter(&self, id: Uuid, now: DateTime<Utc>) -> Result<Uuid> {
        self.webhooks.replay_dead_letter(id, now).await
    }
}

fn normalize_domain(input: &str) -> Result<String> {
    match root_domain(input) {
        Some(domain) if domain.len() >= 3 => Ok(domain),
        _ => Err(ScrapeError::validation(format!("invalid domain: {:?}", input))),
    }
}

fn validate_max_pages(max_pages: i32) -> Result<()> {
    if !(1..=500).contains(&max_pages) {
        return Err(ScrapeError::validation("max_pages must be between 1 and 500"));
    }
    Ok(())
}

fn validate_priority(priority: i32) -> Result<()> {
    if !(1..=10).contains(&priority) {
        return Err(ScrapeError::validation("priority must be between 1 and 10"));
    }
    Ok(())
}

fn validate_data_types(data_types: &[String]) -> Result<()> {
    if data_types.is_empty() || data_types.iter().any(|t| t.trim().is_empty()) {
        return Err(ScrapeError::validation("data_types must name at least one type"));
    }
    Ok(())
}

fn validate_query(query: &str) -> Result<()> {
    let chars = query.trim().chars().count();
    if chars == 0 || chars > MAX_QUERY_CHARS {
        return Err(ScrapeError::validation("query must be between 1 and 500 characters"));
    }
    Ok(())
}
