//! In-memory storage implementation for testing and development.
//!
//! All state sits behind a single mutex, so every trait operation is atomic
//! with respect to every other one. That gives the same guarantees the
//! relational store gets from transactions and conditional updates.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{
    DiscoverySpawn, DiscoveryStore, JobStore, LedgerStore, MetadataStore, TrackedStore,
    WebhookStore,
};
use crate::types::{
    BudgetAlert, BudgetScope, CostEntry, DeadLetter, DeliveryFailure, DeliveryStatus,
    DiscoveryJob, DiscoveryJobDomain, DiscoveryStatus, DomainMetadata, JobOutcome, JobStatus,
    LinkStatus, MetadataUpdate, ScrapeJob, ScrapedRecord, TrackedDomain, TrackedSearch,
    WebhookDelivery,
};

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, ScrapeJob>,
    records: HashMap<Uuid, Vec<ScrapedRecord>>,
    metadata: HashMap<String, DomainMetadata>,
    ledger: HashMap<Uuid, CostEntry>,
    alerts: HashSet<(BudgetScope, String, String, String)>,
    tracked_domains: HashMap<String, TrackedDomain>,
    tracked_searches: HashMap<Uuid, TrackedSearch>,
    discoveries: HashMap<Uuid, DiscoveryJob>,
    links: Vec<DiscoveryJobDomain>,
    deliveries: HashMap<Uuid, WebhookDelivery>,
    dead_letters: Vec<DeadLetter>,
    notifications: Vec<ScrapedRecord>,
}

impl State {
    /// Close the link of a finished child job and roll its cost up.
    fn settle_discovery_link(&mut self, job_id: Uuid, outcome: &JobOutcome) {
        let link_status = match outcome.status {
            JobStatus::Completed => LinkStatus::Completed,
            _ => LinkStatus::Failed,
        };

        let mut parent = None;
        for link in self
            .links
            .iter_mut()
            .filter(|l| l.scrape_job_id == Some(job_id) && l.status.is_open())
        {
            link.status = link_status;
            parent = Some(link.discovery_id);
        }

        let Some(discovery_id) = parent else {
            return;
        };
        if let Some(discovery) = self.discoveries.get_mut(&discovery_id) {
            discovery.total_cost_usd += outcome.cost_usd;
        }
        self.complete_if_settled(discovery_id, outcome.completed_at);
    }

    fn complete_if_settled(&mut self, discovery_id: Uuid, now: DateTime<Utc>) -> bool {
        let open = self
            .links
            .iter()
            .any(|l| l.discovery_id == discovery_id && l.status.is_open());
        match self.discoveries.get_mut(&discovery_id) {
            Some(d) if d.status == DiscoveryStatus::Scraping && !open => {
                d.status = DiscoveryStatus::Completed;
                d.completed_at = Some(now);
                true
            }
            _ => false,
        }
    }
}

/// In-memory store for every orchestration concern.
///
/// Useful for testing and development. Not suitable for production as data
/// is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Records announced on the change feed, oldest first.
    pub fn published_records(&self) -> StoreResult<Vec<ScrapedRecord>> {
        Ok(self.lock()?.notifications.clone())
    }

    /// Number of jobs in any status.
    pub fn job_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.jobs.len())
    }

    /// All jobs spawned by a discovery.
    pub fn jobs_for_discovery(&self, discovery_id: Uuid) -> StoreResult<Vec<ScrapeJob>> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .filter(|j| j.discovery_id == Some(discovery_id))
            .cloned()
            .collect())
    }

    /// Deliveries still in the queue (not delivered, not dead-lettered).
    pub fn queued_deliveries(&self) -> StoreResult<Vec<WebhookDelivery>> {
        Ok(self
            .lock()?
            .deliveries
            .values()
            .filter(|d| {
                matches!(
                    d.status,
                    DeliveryStatus::Pending | DeliveryStatus::Processing
                )
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &ScrapeJob) -> StoreResult<()> {
        self.lock()?.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ScrapeJob>> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn claim_jobs(
        &self,
        worker_id: &str,
        limit: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<Vec<ScrapeJob>> {
        let mut state = self.lock()?;

        let mut ready: Vec<&ScrapeJob> = state
            .jobs
            .values()
            .filter(|j| j.is_claimable(now))
            .collect();
        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        let ids: Vec<Uuid> = ready
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|j| j.id)
            .collect();

        let mut claimed = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(job) = state.jobs.get_mut(id) {
                job.status = JobStatus::Running;
                job.worker_id = Some(worker_id.to_string());
                job.lease_expires_at = Some(lease_until);
                job.delivery_count += 1;
                job.started_at.get_or_insert(now);
                claimed.push(job.clone());
            }
        }

        for link in state.links.iter_mut() {
            if link.status == LinkStatus::Pending
                && link.scrape_job_id.map(|id| ids.contains(&id)).unwrap_or(false)
            {
                link.status = LinkStatus::Scraping;
            }
        }

        Ok(claimed)
    }

    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.jobs.get_mut(&job_id) {
            Some(job)
                if job.status == JobStatus::Running
                    && job.worker_id.as_deref() == Some(worker_id) =>
            {
                job.lease_expires_at = Some(lease_until);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_job(&self, job_id: Uuid, worker_id: &str) -> StoreResult<()> {
        let mut state = self.lock()?;
        if let Some(job) = state.jobs.get_mut(&job_id) {
            if job.status == JobStatus::Running && job.worker_id.as_deref() == Some(worker_id) {
                job.lease_expires_at = None;
                job.worker_id = None;
            }
        }
        Ok(())
    }

    async fn records_for_job(&self, job_id: Uuid) -> StoreResult<Vec<ScrapedRecord>> {
        Ok(self
            .lock()?
            .records
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        outcome: &JobOutcome,
        records: &[ScrapedRecord],
        delivery: Option<&WebhookDelivery>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;

        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status.can_transition_to(outcome.status) => {
                job.apply_outcome(outcome);
            }
            _ => return Ok(false),
        }

        if !records.is_empty() {
            state.records.insert(job_id, records.to_vec());
            state.notifications.extend_from_slice(records);
        }

        state.settle_discovery_link(job_id, outcome);
        if let Some(delivery) = delivery {
            state.deliveries.insert(delivery.id, delivery.clone());
        }
        Ok(true)
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get_metadata(&self, domain: &str) -> StoreResult<Option<DomainMetadata>> {
        Ok(self.lock()?.metadata.get(domain).cloned())
    }

    async fn update_metadata(
        &self,
        domain: &str,
        update: &MetadataUpdate,
        alpha: f64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        state
            .metadata
            .entry(domain.to_string())
            .or_insert_with(|| DomainMetadata::empty(domain, now))
            .apply(update, alpha, now);
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn record_job_cost(&self, entry: &CostEntry) -> StoreResult<()> {
        let mut state = self.lock()?;
        state
            .ledger
            .entry(entry.job_id)
            .and_modify(|existing| existing.amount_usd = entry.amount_usd)
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn job_cost(&self, job_id: Uuid) -> StoreResult<Decimal> {
        Ok(self
            .lock()?
            .ledger
            .get(&job_id)
            .map(|e| e.amount_usd)
            .unwrap_or(Decimal::ZERO))
    }

    async fn spend_since(
        &self,
        scope: BudgetScope,
        key: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal> {
        let state = self.lock()?;
        Ok(state
            .ledger
            .values()
            .filter(|e| e.recorded_at >= since)
            .filter(|e| match scope {
                BudgetScope::Domain => e.domain == key,
                BudgetScope::Org => e.org_id.as_deref() == Some(key),
            })
            .map(|e| e.amount_usd)
            .sum())
    }

    async fn claim_alert(&self, alert: &BudgetAlert) -> StoreResult<bool> {
        let mut state = self.lock()?;
        Ok(state.alerts.insert((
            alert.scope,
            alert.key.clone(),
            alert.window_key.clone(),
            alert.level.as_str().to_string(),
        )))
    }
}

#[async_trait]
impl TrackedStore for MemoryStore {
    async fn upsert_tracked_domain(&self, tracked: &TrackedDomain) -> StoreResult<()> {
        self.lock()?
            .tracked_domains
            .insert(tracked.domain.clone(), tracked.clone());
        Ok(())
    }

    async fn get_tracked_domain(&self, domain: &str) -> StoreResult<Option<TrackedDomain>> {
        Ok(self.lock()?.tracked_domains.get(domain).cloned())
    }

    async fn deactivate_tracked_domain(&self, domain: &str) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.tracked_domains.get_mut(domain) {
            Some(t) if t.is_active => {
                t.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn due_tracked_domains(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<TrackedDomain>> {
        let state = self.lock()?;
        let mut due: Vec<TrackedDomain> = state
            .tracked_domains
            .values()
            .filter(|t| t.is_active && t.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_run_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim_tracked_domain_run(
        &self,
        domain: &str,
        prior: DateTime<Utc>,
        next: DateTime<Utc>,
        now: DateTime<Utc>,
        job: &ScrapeJob,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.tracked_domains.get_mut(domain) {
            Some(t) if t.is_active && t.next_run_at == prior => {
                t.next_run_at = next;
                t.last_run_at = Some(now);
            }
            _ => return Ok(false),
        }
        state.jobs.insert(job.id, job.clone());
        Ok(true)
    }

    async fn insert_tracked_search(&self, tracked: &TrackedSearch) -> StoreResult<()> {
        self.lock()?
            .tracked_searches
            .insert(tracked.id, tracked.clone());
        Ok(())
    }

    async fn get_tracked_search(&self, id: Uuid) -> StoreResult<Option<TrackedSearch>> {
        Ok(self.lock()?.tracked_searches.get(&id).cloned())
    }

    async fn deactivate_tracked_search(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.tracked_searches.get_mut(&id) {
            Some(t) if t.is_active => {
                t.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn due_tracked_searches(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<TrackedSearch>> {
        let state = self.lock()?;
        let mut due: Vec<TrackedSearch> = state
            .tracked_searches
            .values()
            .filter(|t| t.is_active && t.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_run_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim_tracked_search_run(
        &self,
        id: Uuid,
        prior: DateTime<Utc>,
        next: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.tracked_searches.get_mut(&id) {
            Some(t) if t.is_active && t.next_run_at == prior => {
                t.next_run_at = next;
                t.last_run_at = Some(now);
                t.total_runs += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn discovered_domains(&self, tracked_search_id: Uuid) -> StoreResult<HashSet<String>> {
        let state = self.lock()?;
        let runs: HashSet<Uuid> = state
            .discoveries
            .values()
            .filter(|d| d.tracked_search_id == Some(tracked_search_id))
            .map(|d| d.id)
            .collect();
        Ok(state
            .links
            .iter()
            .filter(|l| runs.contains(&l.discovery_id) && l.scrape_job_id.is_some())
            .map(|l| l.domain.clone())
            .collect())
    }
}

#[async_trait]
impl DiscoveryStore for MemoryStore {
    async fn insert_discovery(&self, discovery: &DiscoveryJob) -> StoreResult<()> {
        self.lock()?
            .discoveries
            .insert(discovery.id, discovery.clone());
        Ok(())
    }

    async fn get_discovery(&self, id: Uuid) -> StoreResult<Option<DiscoveryJob>> {
        Ok(self.lock()?.discoveries.get(&id).cloned())
    }

    async fn links_for_discovery(&self, id: Uuid) -> StoreResult<Vec<DiscoveryJobDomain>> {
        Ok(self
            .lock()?
            .links
            .iter()
            .filter(|l| l.discovery_id == id)
            .cloned()
            .collect())
    }

    async fn spawn_discovery(&self, spawn: &DiscoverySpawn) -> StoreResult<bool> {
        let mut state = self.lock()?;

        match state.discoveries.get_mut(&spawn.discovery_id) {
            Some(d) if d.status == DiscoveryStatus::Searching => {
                d.raw_results = Some(spawn.raw_results.clone());
                d.domains_found = spawn.domains_found;
                d.domains_skipped = spawn.domains_skipped;
                if spawn.jobs.is_empty() {
                    d.status = DiscoveryStatus::Completed;
                    d.completed_at = Some(spawn.now);
                } else {
                    d.status = DiscoveryStatus::Scraping;
                }
            }
            _ => return Ok(false),
        }

        for job in &spawn.jobs {
            state.jobs.insert(job.id, job.clone());
        }
        state.links.extend(spawn.links.iter().cloned());

        if let Some(tracked_id) = spawn.tracked_search_id {
            if let Some(t) = state.tracked_searches.get_mut(&tracked_id) {
                t.total_domains_discovered += spawn.jobs.len() as i64;
            }
        }
        Ok(true)
    }

    async fn fail_discovery(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.discoveries.get_mut(&id) {
            Some(d) if d.status == DiscoveryStatus::Searching => {
                d.status = DiscoveryStatus::Failed;
                d.error_message = Some(error.to_string());
                d.completed_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_finished_discoveries(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let mut state = self.lock()?;
        let scraping: Vec<Uuid> = state
            .discoveries
            .values()
            .filter(|d| d.status == DiscoveryStatus::Scraping)
            .map(|d| d.id)
            .collect();
        Ok(scraping
            .into_iter()
            .filter(|id| state.complete_if_settled(*id, now))
            .collect())
    }

    async fn fail_stale_discoveries(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Uuid>> {
        let mut state = self.lock()?;
        let mut failed = Vec::new();
        for d in state.discoveries.values_mut() {
            if d.status == DiscoveryStatus::Searching && d.created_at < started_before {
                d.status = DiscoveryStatus::Failed;
                d.error_message = Some("interrupted while searching".to_string());
                d.completed_at = Some(now);
                failed.push(d.id);
            }
        }
        Ok(failed)
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn insert_delivery(&self, delivery: &WebhookDelivery) -> StoreResult<()> {
        self.lock()?
            .deliveries
            .insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<WebhookDelivery>> {
        Ok(self.lock()?.deliveries.get(&id).cloned())
    }

    async fn claim_due_deliveries(
        &self,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<WebhookDelivery>> {
        let mut state = self.lock()?;
        let mut due: Vec<&mut WebhookDelivery> = state
            .deliveries
            .values_mut()
            .filter(|d| match d.status {
                DeliveryStatus::Pending => d.next_retry_at <= now,
                DeliveryStatus::Processing => {
                    d.claimed_at.map(|at| at < reclaim_before).unwrap_or(true)
                }
                _ => false,
            })
            .collect();
        due.sort_by_key(|d| d.next_retry_at);

        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|d| {
                d.status = DeliveryStatus::Processing;
                d.claimed_at = Some(now);
                d.clone()
            })
            .collect())
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        attempts: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.deliveries.get_mut(&id) {
            Some(d) if d.status == DeliveryStatus::Processing => {
                d.status = DeliveryStatus::Delivered;
                d.attempts = attempts;
                d.delivered_at = Some(now);
                d.claimed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reschedule_delivery(
        &self,
        id: Uuid,
        failure: &DeliveryFailure,
        next_retry_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.deliveries.get_mut(&id) {
            Some(d) if d.status == DeliveryStatus::Processing => {
                d.status = DeliveryStatus::Pending;
                d.attempts = failure.attempt;
                d.last_error = Some(failure.error.clone());
                d.error_history.push(failure.clone());
                d.next_retry_at = next_retry_at;
                d.claimed_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn dead_letter_delivery(
        &self,
        id: Uuid,
        failure: &DeliveryFailure,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DeadLetter>> {
        let mut state = self.lock()?;
        let dead = match state.deliveries.get_mut(&id) {
            Some(d) if d.status == DeliveryStatus::Processing => {
                d.status = DeliveryStatus::DeadLettered;
                d.attempts = failure.attempt;
                d.last_error = Some(failure.error.clone());
                d.error_history.push(failure.clone());
                d.claimed_at = None;
                DeadLetter::from_delivery(d, now)
            }
            _ => return Ok(None),
        };
        state.dead_letters.push(dead.clone());
        Ok(Some(dead))
    }

    async fn list_dead_letters(&self, limit: i64) -> StoreResult<Vec<DeadLetter>> {
        let state = self.lock()?;
        Ok(state
            .dead_letters
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_dead_letter(&self, id: Uuid) -> StoreResult<Option<DeadLetter>> {
        Ok(self
            .lock()?
            .dead_letters
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn replay_dead_letter(
        &self,
        id: Uuid,
        delivery: &WebhookDelivery,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.dead_letters.iter_mut().find(|d| d.id == id) {
            Some(dead) if dead.replayed_at.is_none() => {
                dead.replayed_at = Some(now);
            }
            _ => return Ok(false),
        }
        state.deliveries.insert(delivery.id, delivery.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewScrapeJob;
    use chrono::Duration;

    fn job(domain: &str, priority: i32, now: DateTime<Utc>) -> ScrapeJob {
        ScrapeJob::new(
            NewScrapeJob::builder()
                .domain(domain)
                .data_types(vec!["contacts".into()])
                .priority(priority)
                .build(),
            now,
        )
    }

    #[tokio::test]
    async fn test_claim_orders_by_priority_and_respects_leases() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let low = job("low.com", 1, now);
        let high = job("high.com", 9, now + Duration::seconds(1));
        store.insert_job(&low).await.unwrap();
        store.insert_job(&high).await.unwrap();

        let lease = now + Duration::minutes(5);
        let claimed = store.claim_jobs("w1", 1, now, lease).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, high.id);
        assert_eq!(claimed[0].status, JobStatus::Running);
        assert_eq!(claimed[0].delivery_count, 1);

        // Leased job is invisible until the lease lapses.
        let claimed = store.claim_jobs("w2", 10, now, lease).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, low.id);
        assert!(store.claim_jobs("w2", 10, now, lease).await.unwrap().is_empty());

        let later = now + Duration::minutes(6);
        let redelivered = store
            .claim_jobs("w3", 10, later, later + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(redelivered.len(), 2);
        assert!(redelivered.iter().all(|j| j.delivery_count == 2));
    }

    #[tokio::test]
    async fn test_finish_is_conditional_on_running() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let job = job("a.com", 5, now);
        store.insert_job(&job).await.unwrap();

        let outcome = JobOutcome::failed(None, "boom", Decimal::ZERO, 0, now);
        // Not yet claimed: pending -> failed would skip running.
        assert!(!store.finish_job(job.id, &outcome, &[], None).await.unwrap());

        store
            .claim_jobs("w1", 1, now, now + Duration::minutes(5))
            .await
            .unwrap();
        assert!(store.finish_job(job.id, &outcome, &[], None).await.unwrap());
        assert!(!store.finish_job(job.id, &outcome, &[], None).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_makes_job_immediately_claimable() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let job = job("a.com", 5, now);
        store.insert_job(&job).await.unwrap();
        store
            .claim_jobs("w1", 1, now, now + Duration::minutes(5))
            .await
            .unwrap();

        store.release_job(job.id, "w1").await.unwrap();
        let again = store
            .claim_jobs("w2", 1, now, now + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].status, JobStatus::Running);
        assert_eq!(again[0].worker_id.as_deref(), Some("w2"));
    }

    #[test]
    fn test_heartbeat_only_extends_own_lease() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let job = job("a.com", 5, now);

        tokio_test::block_on(async {
            store.insert_job(&job).await.unwrap();
            assert!(!store.extend_lease(job.id, "w1", now).await.unwrap());

            store
                .claim_jobs("w1", 1, now, now + Duration::minutes(5))
                .await
                .unwrap();
            let later = now + Duration::minutes(10);
            assert!(store.extend_lease(job.id, "w1", later).await.unwrap());
            assert!(!store.extend_lease(job.id, "w2", later).await.unwrap());

            let stored = store.get_job(job.id).await.unwrap().unwrap();
            assert_eq!(stored.lease_expires_at, Some(later));
        });
    }
}
