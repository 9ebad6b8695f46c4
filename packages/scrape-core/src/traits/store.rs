//! Storage traits for the orchestration core.
//!
//! Each trait covers one concern so components can be read in isolation,
//! and `Store` bundles them for implementations that provide everything
//! (`MemoryStore`, `PostgresStore`).
//!
//! Every mutation that other workers may race on is expressed as a single
//! operation here (claim, conditional terminal write, compare-and-swap
//! schedule advance, counter increment) so implementations can make it
//! atomic. Callers never read-modify-write shared rows themselves.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    BudgetAlert, BudgetScope, CostEntry, DeadLetter, DeliveryFailure, DiscoveryJob,
    DiscoveryJobDomain, DomainMetadata, JobOutcome, MetadataUpdate, ScrapeJob, ScrapedRecord,
    TrackedDomain, TrackedSearch, WebhookDelivery,
};

/// The durable scrape job queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &ScrapeJob) -> StoreResult<()>;

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ScrapeJob>>;

    /// Claim up to `limit` jobs that are pending or whose lease expired.
    ///
    /// Claimed jobs become `running` under `worker_id` until `lease_until`,
    /// and their delivery count is incremented. Higher priority first, then
    /// oldest first. Links of claimed discovery children move to `scraping`.
    async fn claim_jobs(
        &self,
        worker_id: &str,
        limit: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<Vec<ScrapeJob>>;

    /// Extend the lease of a job still held by `worker_id` (heartbeat).
    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Give a claimed job back for immediate redelivery (nack).
    ///
    /// The status stays `running`; only the lease is expired.
    async fn release_job(&self, job_id: Uuid, worker_id: &str) -> StoreResult<()>;

    async fn records_for_job(&self, job_id: Uuid) -> StoreResult<Vec<ScrapedRecord>>;

    /// Write a terminal outcome, in one transaction:
    /// - the job row, only if it is still `running`
    /// - the extracted records (and their change notification)
    /// - the discovery link status and discovery cost roll-up
    /// - completion of the parent discovery when no links remain open
    /// - the webhook delivery, if any
    ///
    /// Returns `false` (and writes nothing) when the job was already terminal.
    async fn finish_job(
        &self,
        job_id: Uuid,
        outcome: &JobOutcome,
        records: &[ScrapedRecord],
        delivery: Option<&WebhookDelivery>,
    ) -> StoreResult<bool>;
}

/// Per-domain feedback for the escalation engine.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_metadata(&self, domain: &str) -> StoreResult<Option<DomainMetadata>>;

    /// Atomically fold `update` into the domain's row, creating it if needed.
    async fn update_metadata(
        &self,
        domain: &str,
        update: &MetadataUpdate,
        alpha: f64,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;
}

/// Cost ledger and alert deduplication.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Upsert a job's running total. The entry's `recorded_at` from the
    /// first write is kept, so a job never moves between windows.
    async fn record_job_cost(&self, entry: &CostEntry) -> StoreResult<()>;

    /// The running total recorded for one job, zero if none.
    async fn job_cost(&self, job_id: Uuid) -> StoreResult<Decimal>;

    /// Total spend attributed to `key` since `since`.
    async fn spend_since(
        &self,
        scope: BudgetScope,
        key: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal>;

    /// Record that an alert fired. Returns `false` if the same scope, key,
    /// window and level already fired.
    async fn claim_alert(&self, alert: &BudgetAlert) -> StoreResult<bool>;
}

/// Recurring scrape and discovery configuration.
#[async_trait]
pub trait TrackedStore: Send + Sync {
    /// Insert or replace a tracked domain (re-activates a cancelled one).
    async fn upsert_tracked_domain(&self, tracked: &TrackedDomain) -> StoreResult<()>;

    async fn get_tracked_domain(&self, domain: &str) -> StoreResult<Option<TrackedDomain>>;

    /// Soft delete. Returns `false` if no active row existed.
    async fn deactivate_tracked_domain(&self, domain: &str) -> StoreResult<bool>;

    async fn due_tracked_domains(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<TrackedDomain>>;

    /// Compare-and-swap `next_run_at` from `prior` to `next` and insert the
    /// run's job in the same transaction. Returns `false` if another
    /// trigger already advanced the row or it was deactivated.
    async fn claim_tracked_domain_run(
        &self,
        domain: &str,
        prior: DateTime<Utc>,
        next: DateTime<Utc>,
        now: DateTime<Utc>,
        job: &ScrapeJob,
    ) -> StoreResult<bool>;

    async fn insert_tracked_search(&self, tracked: &TrackedSearch) -> StoreResult<()>;

    async fn get_tracked_search(&self, id: Uuid) -> StoreResult<Option<TrackedSearch>>;

    async fn deactivate_tracked_search(&self, id: Uuid) -> StoreResult<bool>;

    async fn due_tracked_searches(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<TrackedSearch>>;

    /// Compare-and-swap `next_run_at` and count the run.
    async fn claim_tracked_search_run(
        &self,
        id: Uuid,
        prior: DateTime<Utc>,
        next: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Domains that any earlier run of this tracked search spawned a job for.
    async fn discovered_domains(&self, tracked_search_id: Uuid) -> StoreResult<HashSet<String>>;
}

/// Everything a discovery run writes once its search finished.
#[derive(Debug, Clone)]
pub struct DiscoverySpawn {
    pub discovery_id: Uuid,
    pub tracked_search_id: Option<Uuid>,
    pub raw_results: serde_json::Value,
    pub domains_found: i32,
    pub domains_skipped: i32,
    /// Child jobs, one per new domain.
    pub jobs: Vec<ScrapeJob>,
    /// Links for spawned and skipped domains.
    pub links: Vec<DiscoveryJobDomain>,
    pub now: DateTime<Utc>,
}

/// Discovery jobs and their links.
#[async_trait]
pub trait DiscoveryStore: Send + Sync {
    async fn insert_discovery(&self, discovery: &DiscoveryJob) -> StoreResult<()>;

    async fn get_discovery(&self, id: Uuid) -> StoreResult<Option<DiscoveryJob>>;

    async fn links_for_discovery(&self, id: Uuid) -> StoreResult<Vec<DiscoveryJobDomain>>;

    /// Insert child jobs and links and leave `searching`, in one transaction.
    ///
    /// The discovery moves to `scraping`, or straight to `completed` when no
    /// jobs were spawned. A tracked search's discovered-domain counter grows
    /// by the number of jobs. Returns `false` (nothing written) if the
    /// discovery was no longer `searching`.
    async fn spawn_discovery(&self, spawn: &DiscoverySpawn) -> StoreResult<bool>;

    /// Fail a discovery that is still `searching`.
    async fn fail_discovery(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Complete `scraping` discoveries whose links are all closed.
    async fn complete_finished_discoveries(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;

    /// Fail discoveries left in `searching` since before `started_before`.
    async fn fail_stale_discoveries(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Uuid>>;
}

/// Webhook delivery queue and dead-letter store.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert_delivery(&self, delivery: &WebhookDelivery) -> StoreResult<()>;

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<WebhookDelivery>>;

    /// Claim due entries and mark them `processing`.
    ///
    /// Due means `pending` with `next_retry_at <= now`, or `processing`
    /// claimed before `reclaim_before` by a drainer that never finished.
    async fn claim_due_deliveries(
        &self,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<WebhookDelivery>>;

    async fn mark_delivered(&self, id: Uuid, attempts: i32, now: DateTime<Utc>)
        -> StoreResult<bool>;

    /// Record a failed attempt and return the entry to `pending`.
    async fn reschedule_delivery(
        &self,
        id: Uuid,
        failure: &DeliveryFailure,
        next_retry_at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Record the final failed attempt and move the entry to the dead-letter
    /// store in one transaction.
    async fn dead_letter_delivery(
        &self,
        id: Uuid,
        failure: &DeliveryFailure,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DeadLetter>>;

    /// Most recent dead letters first.
    async fn list_dead_letters(&self, limit: i64) -> StoreResult<Vec<DeadLetter>>;

    async fn get_dead_letter(&self, id: Uuid) -> StoreResult<Option<DeadLetter>>;

    /// Mark a dead letter replayed and enqueue `delivery` in its place.
    /// Returns `false` if it does not exist or was already replayed.
    async fn replay_dead_letter(
        &self,
        id: Uuid,
        delivery: &WebhookDelivery,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

/// A store that provides every concern.
pub trait Store:
    JobStore + MetadataStore + LedgerStore + TrackedStore + DiscoveryStore + WebhookStore
{
}

impl<T> Store for T where
    T: JobStore + MetadataStore + LedgerStore + TrackedStore + DiscoveryStore + WebhookStore
{
}
