//! Query-driven discovery: search, normalize, dedupe, skip, spawn.
//!
//! ```text
//! searching ──► scraping ──► completed
//!     │                        ▲
//!     │   (no new domains) ────┘
//!     └──► failed  (search failed or interrupted)
//! ```
//!
//! Child jobs, links and the move out of `searching` are written in one
//! store call. Links settle as children finish (see `JobStore::finish_job`).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::domains::{classify_destination, extract_unique_domains, root_domain};
use crate::config::DiscoveryConfig;
use crate::error::{Result, ScrapeError, SearchError};
use crate::traits::{
    DestinationHandler, DiscoverySpawn, SearchHit, SearchQuery, SearchResponse, Searcher, Store,
};
use crate::types::{
    BudgetCeilings, DestinationKind, DiscoveryJob, DiscoveryJobDomain, LinkStatus, NewDiscovery,
    NewScrapeJob, ScrapeJob,
};

pub const SKIP_RECENTLY_SCRAPED: &str = "recently scraped";
pub const SKIP_PREVIOUSLY_DISCOVERED: &str = "previously discovered";
pub const SKIP_DOMAIN_CAP: &str = "domain cap reached";

pub struct DiscoveryPipeline<S> {
    store: Arc<S>,
    searcher: Arc<dyn Searcher>,
    destinations: Option<Arc<dyn DestinationHandler>>,
    config: DiscoveryConfig,
}

impl<S: Store> DiscoveryPipeline<S> {
    pub fn new(store: Arc<S>, searcher: Arc<dyn Searcher>, config: DiscoveryConfig) -> Self {
        Self {
            store,
            searcher,
            destinations: None,
            config,
        }
    }

    /// Route video, professional-network and social-media hits to `handler`.
    pub fn with_destination_handler(mut self, handler: Arc<dyn DestinationHandler>) -> Self {
        self.destinations = Some(handler);
        self
    }

    /// Run one discovery to the point where its child jobs are queued.
    ///
    /// A failed search is not an error: the discovery is stored as `failed`
    /// and returned. Errors are reserved for invalid input and the store.
    pub async fn run_discovery(
        &self,
        input: NewDiscovery,
        now: DateTime<Utc>,
    ) -> Result<DiscoveryJob> {
        input.params.validate()?;

        let discovery = DiscoveryJob::new(input, now);
        self.store.insert_discovery(&discovery).await?;
        info!(
            discovery_id = %discovery.id,
            query = %discovery.query,
            tracked_search_id = ?discovery.tracked_search_id,
            "discovery started"
        );

        let hits = match self.search_all(&discovery).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(discovery_id = %discovery.id, error = %e, "discovery search failed");
                self.store
                    .fail_discovery(discovery.id, &e.to_string(), now)
                    .await?;
                return self.reload(discovery.id).await;
            }
        };

        let spawn = self.plan(&discovery, &hits, now).await?;
        let spawned = spawn.jobs.len();
        let skipped = spawn.domains_skipped;

        if !self.store.spawn_discovery(&spawn).await? {
            warn!(
                discovery_id = %discovery.id,
                "discovery left searching before its jobs were spawned"
            );
        } else {
            info!(
                discovery_id = %discovery.id,
                hits = hits.len(),
                spawned,
                skipped,
                "discovery spawned scrape jobs"
            );
        }

        self.reload(discovery.id).await
    }

    /// Complete `scraping` discoveries whose children are all terminal.
    pub async fn complete_finished(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
        let completed = self.store.complete_finished_discoveries(now).await?;
        if !completed.is_empty() {
            info!(count = completed.len(), "discoveries completed");
        }
        Ok(completed)
    }

    /// Fail discoveries stuck in `searching` for longer than `timeout`.
    pub async fn fail_stale(
        &self,
        timeout: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let failed = self.store.fail_stale_discoveries(now - timeout, now).await?;
        if !failed.is_empty() {
            warn!(count = failed.len(), "stale discoveries failed");
        }
        Ok(failed)
    }

    async fn reload(&self, id: Uuid) -> Result<DiscoveryJob> {
        self.store
            .get_discovery(id)
            .await?
            .ok_or(ScrapeError::DiscoveryNotFound { id })
    }

    /// Fetch consecutive pages until the requested count or a short page.
    async fn search_all(
        &self,
        discovery: &DiscoveryJob,
    ) -> std::result::Result<Vec<SearchHit>, SearchError> {
        let params = discovery.params;
        let mut hits = Vec::new();

        for page in 1..=params.search_pages {
            let query = SearchQuery {
                query: discovery.query.clone(),
                mode: params.mode,
                page,
                results_per_page: params.results_per_page,
            };
            let response = self.search_with_retry(&query).await?;
            let returned = response.results.len();
            hits.extend(response.results);

            debug!(discovery_id = %discovery.id, page, returned, "search page fetched");
            if returned < params.results_per_page as usize {
                break;
            }
        }

        Ok(hits)
    }

    async fn search_with_retry(
        &self,
        query: &SearchQuery,
    ) -> std::result::Result<SearchResponse, SearchError> {
        let attempts = self.config.search_attempts.max(1);
        let mut delay = self.config.search_retry_base;
        let mut attempt = 1;

        loop {
            match self.searcher.search(query).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        page = query.page,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "search failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Decide, per domain, whether to spawn a job or skip it and why.
    async fn plan(
        &self,
        discovery: &DiscoveryJob,
        hits: &[SearchHit],
        now: DateTime<Utc>,
    ) -> Result<DiscoverySpawn> {
        let mut ordinary = Vec::new();
        let mut routed: IndexMap<String, (DestinationKind, SearchHit)> = IndexMap::new();

        for hit in hits {
            let Some(domain) = root_domain(&hit.url) else {
                continue;
            };
            match classify_destination(&domain) {
                DestinationKind::Domain => ordinary.push(hit.clone()),
                kind => {
                    if let Some(handler) = &self.destinations {
                        handler.handle(discovery.id, kind, hit).await;
                    }
                    routed.entry(domain).or_insert_with(|| (kind, hit.clone()));
                }
            }
        }

        let previously_discovered = match discovery.tracked_search_id {
            Some(id) => self.store.discovered_domains(id).await?,
            None => HashSet::new(),
        };
        let recent_cutoff = now - self.config.recency_window;

        let mut jobs = Vec::new();
        let mut links = Vec::new();

        for (domain, (kind, hit)) in routed {
            let reason = format!("routed to {} handling", kind);
            links.push(link(discovery.id, domain, &hit, None, Some(reason), now));
        }

        for (domain, hit) in extract_unique_domains(&ordinary, &HashSet::new()) {
            let skip_reason = if previously_discovered.contains(&domain) {
                Some(SKIP_PREVIOUSLY_DISCOVERED)
            } else if self.recently_scraped(&domain, recent_cutoff).await? {
                Some(SKIP_RECENTLY_SCRAPED)
            } else if jobs.len() >= self.config.max_domains_per_query {
                Some(SKIP_DOMAIN_CAP)
            } else {
                None
            };

            if let Some(reason) = skip_reason {
                debug!(discovery_id = %discovery.id, domain = %domain, reason, "domain skipped");
                links.push(link(discovery.id, domain, &hit, None, Some(reason.to_string()), now));
                continue;
            }

            let job = ScrapeJob::new(child_job(discovery, &domain), now);
            links.push(link(discovery.id, domain, &hit, Some(job.id), None, now));
            jobs.push(job);
        }

        let domains_skipped = links.iter().filter(|l| l.status == LinkStatus::Skipped).count();

        Ok(DiscoverySpawn {
            discovery_id: discovery.id,
            tracked_search_id: discovery.tracked_search_id,
            raw_results: serde_json::to_value(hits)?,
            domains_found: links.len() as i32,
            domains_skipped: domains_skipped as i32,
            jobs,
            links,
            now,
        })
    }

    async fn recently_scraped(&self, domain: &str, cutoff: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .store
            .get_metadata(domain)
            .await?
            .and_then(|m| m.last_scraped_at)
            .map(|at| at >= cutoff)
            .unwrap_or(false))
    }
}

fn child_job(discovery: &DiscoveryJob, domain: &str) -> NewScrapeJob {
    NewScrapeJob {
        domain: domain.to_string(),
        data_types: discovery.data_types.clone(),
        max_pages: discovery.max_pages_per_domain,
        template_id: None,
        priority: discovery.priority,
        org_id: discovery.org_id.clone(),
        callback_url: discovery.callback_url.clone(),
        budget: BudgetCeilings::default(),
        discovery_id: Some(discovery.id),
    }
}

fn link(
    discovery_id: Uuid,
    domain: String,
    hit: &SearchHit,
    scrape_job_id: Option<Uuid>,
    skip_reason: Option<String>,
    now: DateTime<Utc>,
) -> DiscoveryJobDomain {
    DiscoveryJobDomain {
        id: Uuid::now_v7(),
        discovery_id,
        domain,
        scrape_job_id,
        source_url: hit.url.clone(),
        source_title: hit.title.clone(),
        source_snippet: hit.snippet.clone(),
        relevance_score: hit.score,
        status: if skip_reason.is_some() {
            LinkStatus::Skipped
        } else {
            LinkStatus::Pending
        },
        skip_reason,
        created_at: now,
    }
}
