//! PostgreSQL storage implementation.
//!
//! The production backend. Every cross-worker race is settled by the
//! database:
//! - queue and webhook claims use `FOR UPDATE SKIP LOCKED`
//! - terminal writes are conditional on the current status
//! - counters are incremented in place (`SET x = x + $n`)
//! - recurring schedules advance with a compare-and-swap on `next_run_at`
//!
//! Multi-row writes (job outcome + discovery roll-up + webhook outbox,
//! discovery spawn, dead-lettering) each run in one transaction.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{ParseEnumError, StoreError, StoreResult};
use crate::traits::store::{
    DiscoverySpawn, DiscoveryStore, JobStore, LedgerStore, MetadataStore, TrackedStore,
    WebhookStore,
};
use crate::types::{
    BudgetAlert, BudgetCeilings, BudgetScope, CostEntry, DeadLetter, DeliveryFailure,
    DiscoveryJob, DiscoveryJobDomain, DomainMetadata, JobOutcome, JobStatus, LinkStatus,
    MetadataUpdate, ScrapeJob, ScrapedRecord, SearchParams, TrackedDomain, TrackedSearch,
    WebhookDelivery,
};

/// Channel notified when a job's records are (re)written.
pub const RECORDS_CHANNEL: &str = "scraped_records";

fn db(e: sqlx::Error) -> StoreError {
    StoreError::Database(Box::new(e))
}

fn parse<T>(table: &'static str, value: &str) -> StoreResult<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    value.parse().map_err(|e: ParseEnumError| StoreError::Corrupt {
        table,
        reason: e.to_string(),
    })
}

/// PostgreSQL-backed store for every orchestration concern.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to `database_url` and ensure the schema exists.
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db)?;

        Self::from_pool(pool).await
    }

    /// Build from an existing pool (e.g. the server's) and ensure the schema.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        const SCHEMA: &[&str] = &[
            r#"
            CREATE TABLE IF NOT EXISTS scrape_jobs (
                id UUID PRIMARY KEY,
                domain TEXT NOT NULL,
                data_types JSONB NOT NULL DEFAULT '[]',
                template_id TEXT,
                max_pages INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                status TEXT NOT NULL,
                strategy_used TEXT,
                error_message TEXT,
                cost_usd NUMERIC(14, 6),
                duration_ms BIGINT,
                pages_scraped INTEGER,
                org_id TEXT,
                callback_url TEXT,
                budget JSONB NOT NULL DEFAULT '{}',
                discovery_id UUID,
                worker_id TEXT,
                lease_expires_at TIMESTAMPTZ,
                delivery_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_scrape_jobs_claim ON scrape_jobs(status, priority DESC, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_scrape_jobs_discovery ON scrape_jobs(discovery_id)",
            r#"
            CREATE TABLE IF NOT EXISTS scraped_records (
                id UUID PRIMARY KEY,
                job_id UUID NOT NULL,
                domain TEXT NOT NULL,
                data_type TEXT NOT NULL,
                source_url TEXT NOT NULL,
                title TEXT,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_scraped_records_job ON scraped_records(job_id)",
            r#"
            CREATE TABLE IF NOT EXISTS domain_metadata (
                domain TEXT PRIMARY KEY,
                last_successful_strategy TEXT,
                block_count INTEGER NOT NULL DEFAULT 0,
                success_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
                avg_cost_usd NUMERIC(14, 6) NOT NULL DEFAULT 0,
                success_count BIGINT NOT NULL DEFAULT 0,
                last_scraped_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS cost_ledger (
                job_id UUID PRIMARY KEY,
                domain TEXT NOT NULL,
                org_id TEXT,
                amount_usd NUMERIC(14, 6) NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_cost_ledger_domain ON cost_ledger(domain, recorded_at)",
            "CREATE INDEX IF NOT EXISTS idx_cost_ledger_org ON cost_ledger(org_id, recorded_at)",
            r#"
            CREATE TABLE IF NOT EXISTS budget_alerts (
                scope TEXT NOT NULL,
                key TEXT NOT NULL,
                window_key TEXT NOT NULL,
                level TEXT NOT NULL,
                spent_usd NUMERIC(14, 6) NOT NULL,
                ceiling_usd NUMERIC(14, 6) NOT NULL,
                raised_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (scope, key, window_key, level)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tracked_domains (
                domain TEXT PRIMARY KEY,
                data_types JSONB NOT NULL DEFAULT '[]',
                template_id TEXT,
                frequency TEXT NOT NULL,
                max_pages INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                webhook_url TEXT,
                org_id TEXT,
                budget JSONB NOT NULL DEFAULT '{}',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                last_run_at TIMESTAMPTZ,
                next_run_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS tracked_searches (
                id UUID PRIMARY KEY,
                query TEXT NOT NULL,
                params JSONB NOT NULL,
                data_types JSONB NOT NULL DEFAULT '[]',
                frequency TEXT NOT NULL,
                max_pages_per_domain INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                webhook_url TEXT,
                org_id TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                last_run_at TIMESTAMPTZ,
                next_run_at TIMESTAMPTZ NOT NULL,
                total_runs BIGINT NOT NULL DEFAULT 0,
                total_domains_discovered BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS discovery_jobs (
                id UUID PRIMARY KEY,
                query TEXT NOT NULL,
                params JSONB NOT NULL,
                data_types JSONB NOT NULL DEFAULT '[]',
                max_pages_per_domain INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                org_id TEXT,
                callback_url TEXT,
                tracked_search_id UUID,
                status TEXT NOT NULL,
                domains_found INTEGER NOT NULL DEFAULT 0,
                domains_skipped INTEGER NOT NULL DEFAULT 0,
                total_cost_usd NUMERIC(14, 6) NOT NULL DEFAULT 0,
                raw_results JSONB,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_discovery_jobs_status ON discovery_jobs(status, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_discovery_jobs_tracked ON discovery_jobs(tracked_search_id)",
            r#"
            CREATE TABLE IF NOT EXISTS discovery_job_domains (
                id UUID PRIMARY KEY,
                discovery_id UUID NOT NULL REFERENCES discovery_jobs(id),
                domain TEXT NOT NULL,
                scrape_job_id UUID,
                source_url TEXT NOT NULL,
                source_title TEXT,
                source_snippet TEXT,
                relevance_score DOUBLE PRECISION,
                status TEXT NOT NULL,
                skip_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_discovery_job_domains_discovery ON discovery_job_domains(discovery_id)",
            "CREATE INDEX IF NOT EXISTS idx_discovery_job_domains_job ON discovery_job_domains(scrape_job_id)",
            r#"
            CREATE TABLE IF NOT EXISTS webhook_deliveries (
                id UUID PRIMARY KEY,
                job_id UUID NOT NULL,
                url TEXT NOT NULL,
                payload JSONB NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                next_retry_at TIMESTAMPTZ NOT NULL,
                last_error TEXT,
                error_history JSONB NOT NULL DEFAULT '[]',
                claimed_at TIMESTAMPTZ,
                delivered_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_webhook_deliveries_due ON webhook_deliveries(status, next_retry_at)",
            r#"
            CREATE TABLE IF NOT EXISTS webhook_dead_letters (
                id UUID PRIMARY KEY,
                delivery_id UUID NOT NULL UNIQUE,
                job_id UUID NOT NULL,
                url TEXT NOT NULL,
                payload JSONB NOT NULL,
                total_attempts INTEGER NOT NULL,
                last_error TEXT NOT NULL,
                error_history JSONB NOT NULL DEFAULT '[]',
                created_at TIMESTAMPTZ NOT NULL,
                replayed_at TIMESTAMPTZ
            )
            "#,
        ];

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db)?;
        }

        info!("scrape store schema ready");
        Ok(())
    }
}

// ============================================================================
// Shared statements (usable inside and outside transactions)
// ============================================================================

async fn insert_job(conn: &mut PgConnection, job: &ScrapeJob) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO scrape_jobs (
            id, domain, data_types, template_id, max_pages, priority, status,
            strategy_used, error_message, cost_usd, duration_ms, pages_scraped,
            org_id, callback_url, budget, discovery_id, worker_id, lease_expires_at,
            delivery_count, created_at, started_at, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
        "#,
    )
    .bind(job.id)
    .bind(&job.domain)
    .bind(Json(&job.data_types))
    .bind(&job.template_id)
    .bind(job.max_pages)
    .bind(job.priority)
    .bind(job.status.as_str())
    .bind(job.strategy_used.map(|t| t.as_str()))
    .bind(&job.error_message)
    .bind(job.cost_usd)
    .bind(job.duration_ms)
    .bind(job.pages_scraped)
    .bind(&job.org_id)
    .bind(&job.callback_url)
    .bind(Json(&job.budget))
    .bind(job.discovery_id)
    .bind(&job.worker_id)
    .bind(job.lease_expires_at)
    .bind(job.delivery_count)
    .bind(job.created_at)
    .bind(job.started_at)
    .bind(job.completed_at)
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

async fn insert_delivery(conn: &mut PgConnection, delivery: &WebhookDelivery) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO webhook_deliveries (
            id, job_id, url, payload, status, attempts, max_attempts, next_retry_at,
            last_error, error_history, claimed_at, delivered_at, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(delivery.id)
    .bind(delivery.job_id)
    .bind(&delivery.url)
    .bind(&delivery.payload)
    .bind(delivery.status.as_str())
    .bind(delivery.attempts)
    .bind(delivery.max_attempts)
    .bind(delivery.next_retry_at)
    .bind(&delivery.last_error)
    .bind(Json(&delivery.error_history))
    .bind(delivery.claimed_at)
    .bind(delivery.delivered_at)
    .bind(delivery.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

/// Insert a finished job's records and announce them on the records channel.
async fn insert_records(
    conn: &mut PgConnection,
    job_id: Uuid,
    records: &[ScrapedRecord],
) -> StoreResult<()> {
    sqlx::query("DELETE FROM scraped_records WHERE job_id = $1")
        .bind(job_id)
        .execute(&mut *conn)
        .await
        .map_err(db)?;

    for record in records {
        sqlx::query(
            r#"
            INSERT INTO scraped_records (id, job_id, domain, data_type, source_url, title, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.job_id)
        .bind(&record.domain)
        .bind(&record.data_type)
        .bind(&record.source_url)
        .bind(&record.title)
        .bind(&record.payload)
        .bind(record.created_at)
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    }

    let data_types: HashSet<&str> = records.iter().map(|r| r.data_type.as_str()).collect();
    let notice = serde_json::json!({
        "job_id": job_id,
        "domain": records.first().map(|r| r.domain.as_str()),
        "count": records.len(),
        "data_types": data_types,
    });
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(RECORDS_CHANNEL)
        .bind(notice.to_string())
        .execute(&mut *conn)
        .await
        .map_err(db)?;
    Ok(())
}

async fn insert_link(conn: &mut PgConnection, link: &DiscoveryJobDomain) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO discovery_job_domains (
            id, discovery_id, domain, scrape_job_id, source_url, source_title,
            source_snippet, relevance_score, status, skip_reason, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(link.id)
    .bind(link.discovery_id)
    .bind(&link.domain)
    .bind(link.scrape_job_id)
    .bind(&link.source_url)
    .bind(&link.source_title)
    .bind(&link.source_snippet)
    .bind(link.relevance_score)
    .bind(link.status.as_str())
    .bind(&link.skip_reason)
    .bind(link.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(())
}

/// Complete a `scraping` discovery once none of its links are open.
async fn complete_if_settled(
    conn: &mut PgConnection,
    discovery_id: Uuid,
    now: DateTime<Utc>,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE discovery_jobs SET status = 'completed', completed_at = $2
        WHERE id = $1 AND status = 'scraping'
          AND NOT EXISTS (
              SELECT 1 FROM discovery_job_domains
              WHERE discovery_id = $1 AND status IN ('pending', 'scraping')
          )
        "#,
    )
    .bind(discovery_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(db)?;
    Ok(result.rows_affected() > 0)
}

// ============================================================================
// JobStore
// ============================================================================

#[async_trait]
impl JobStore for PostgresStore {
    async fn insert_job(&self, job: &ScrapeJob) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        insert_job(&mut conn, job).await
    }

    async fn get_job(&self, id: Uuid) -> StoreResult<Option<ScrapeJob>> {
        sqlx::query_as::<_, JobRow>("SELECT * FROM scrape_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .map(JobRow::into_job)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn claim_jobs(
        &self,
        worker_id: &str,
        limit: i64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<Vec<ScrapeJob>> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            WITH ready AS (
                SELECT id FROM scrape_jobs
                WHERE status = 'pending'
                   OR (status = 'running' AND (lease_expires_at IS NULL OR lease_expires_at < $3))
                ORDER BY priority DESC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE scrape_jobs j SET
                status = 'running',
                worker_id = $1,
                lease_expires_at = $4,
                delivery_count = j.delivery_count + 1,
                started_at = COALESCE(j.started_at, $3)
            FROM ready
            WHERE j.id = ready.id
            RETURNING j.*
            "#,
        )
        .bind(worker_id)
        .bind(limit)
        .bind(now)
        .bind(lease_until)
        .fetch_all(&mut *tx)
        .await
        .map_err(db)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        if !ids.is_empty() {
            sqlx::query(
                "UPDATE discovery_job_domains SET status = 'scraping' WHERE status = 'pending' AND scrape_job_id = ANY($1)",
            )
            .bind(&ids)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        tx.commit().await.map_err(db)?;

        let mut jobs = rows
            .into_iter()
            .map(JobRow::into_job)
            .collect::<StoreResult<Vec<_>>>()?;
        jobs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        debug!(worker_id, claimed = jobs.len(), "claimed scrape jobs");
        Ok(jobs)
    }

    async fn extend_lease(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_until: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE scrape_jobs SET lease_expires_at = $3 WHERE id = $1 AND worker_id = $2 AND status = 'running'",
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(lease_until)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_job(&self, job_id: Uuid, worker_id: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE scrape_jobs SET lease_expires_at = NULL, worker_id = NULL WHERE id = $1 AND worker_id = $2 AND status = 'running'",
        )
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn records_for_job(&self, job_id: Uuid) -> StoreResult<Vec<ScrapedRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM scraped_records WHERE job_id = $1 ORDER BY created_at, id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(RecordRow::into_record).collect())
    }

    #[instrument(skip(self, outcome, records, delivery), fields(status = %outcome.status))]
    async fn finish_job(
        &self,
        job_id: Uuid,
        outcome: &JobOutcome,
        records: &[ScrapedRecord],
        delivery: Option<&WebhookDelivery>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let updated = sqlx::query(
            r#"
            UPDATE scrape_jobs SET
                status = $2,
                strategy_used = $3,
                error_message = $4,
                cost_usd = $5,
                duration_ms = $6,
                pages_scraped = $7,
                completed_at = $8,
                worker_id = NULL,
                lease_expires_at = NULL
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(outcome.status.as_str())
        .bind(outcome.strategy_used.map(|t| t.as_str()))
        .bind(&outcome.error_message)
        .bind(outcome.cost_usd)
        .bind(outcome.duration_ms)
        .bind(outcome.pages_scraped)
        .bind(outcome.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.map_err(db)?;
            return Ok(false);
        }

        if !records.is_empty() {
            insert_records(&mut tx, job_id, records).await?;
        }

        let link_status = match outcome.status {
            JobStatus::Completed => LinkStatus::Completed,
            _ => LinkStatus::Failed,
        };
        let parent: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE discovery_job_domains SET status = $2
            WHERE scrape_job_id = $1 AND status IN ('pending', 'scraping')
            RETURNING discovery_id
            "#,
        )
        .bind(job_id)
        .bind(link_status.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?;

        if let Some((discovery_id,)) = parent {
            sqlx::query(
                "UPDATE discovery_jobs SET total_cost_usd = total_cost_usd + $2 WHERE id = $1",
            )
            .bind(discovery_id)
            .bind(outcome.cost_usd)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
            complete_if_settled(&mut tx, discovery_id, outcome.completed_at).await?;
        }

        if let Some(delivery) = delivery {
            insert_delivery(&mut tx, delivery).await?;
        }

        tx.commit().await.map_err(db)?;
        Ok(true)
    }
}

// ============================================================================
// MetadataStore
// ============================================================================

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn get_metadata(&self, domain: &str) -> StoreResult<Option<DomainMetadata>> {
        sqlx::query_as::<_, MetadataRow>("SELECT * FROM domain_metadata WHERE domain = $1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .map(MetadataRow::into_metadata)
            .transpose()
    }

    async fn update_metadata(
        &self,
        domain: &str,
        update: &MetadataUpdate,
        alpha: f64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        // Same arithmetic as DomainMetadata::apply, folded into one upsert.
        let query = match update {
            MetadataUpdate::Blocked => sqlx::query(
                r#"
                INSERT INTO domain_metadata (domain, block_count, success_rate, updated_at)
                VALUES ($1, 1, 0, $2)
                ON CONFLICT (domain) DO UPDATE SET
                    block_count = domain_metadata.block_count + 1,
                    success_rate = domain_metadata.success_rate * (1 - $3::float8),
                    updated_at = $2
                "#,
            )
            .bind(domain)
            .bind(now)
            .bind(alpha),
            MetadataUpdate::Succeeded { tier, cost_usd } => sqlx::query(
                r#"
                INSERT INTO domain_metadata (
                    domain, last_successful_strategy, block_count, success_rate,
                    avg_cost_usd, success_count, last_scraped_at, updated_at
                )
                VALUES ($1, $4, 0, 1, $5, 1, $2, $2)
                ON CONFLICT (domain) DO UPDATE SET
                    last_successful_strategy = $4,
                    block_count = 0,
                    success_rate = domain_metadata.success_rate * (1 - $3::float8) + $3::float8,
                    avg_cost_usd = domain_metadata.avg_cost_usd
                        + ($5::numeric - domain_metadata.avg_cost_usd) / (domain_metadata.success_count + 1),
                    success_count = domain_metadata.success_count + 1,
                    last_scraped_at = $2,
                    updated_at = $2
                "#,
            )
            .bind(domain)
            .bind(now)
            .bind(alpha)
            .bind(tier.as_str())
            .bind(*cost_usd),
            MetadataUpdate::Failed => sqlx::query(
                r#"
                INSERT INTO domain_metadata (domain, last_scraped_at, updated_at)
                VALUES ($1, $2, $2)
                ON CONFLICT (domain) DO UPDATE SET last_scraped_at = $2, updated_at = $2
                "#,
            )
            .bind(domain)
            .bind(now),
        };

        query.execute(&self.pool).await.map_err(db)?;
        Ok(())
    }
}

// ============================================================================
// LedgerStore
// ============================================================================

#[async_trait]
impl LedgerStore for PostgresStore {
    async fn record_job_cost(&self, entry: &CostEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cost_ledger (job_id, domain, org_id, amount_usd, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO UPDATE SET amount_usd = EXCLUDED.amount_usd
            "#,
        )
        .bind(entry.job_id)
        .bind(&entry.domain)
        .bind(&entry.org_id)
        .bind(entry.amount_usd)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn job_cost(&self, job_id: Uuid) -> StoreResult<Decimal> {
        let row: Option<(Decimal,)> =
            sqlx::query_as("SELECT amount_usd FROM cost_ledger WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db)?;
        Ok(row.map(|(amount,)| amount).unwrap_or(Decimal::ZERO))
    }

    async fn spend_since(
        &self,
        scope: BudgetScope,
        key: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Decimal> {
        let sql = match scope {
            BudgetScope::Domain => {
                "SELECT COALESCE(SUM(amount_usd), 0) FROM cost_ledger WHERE domain = $1 AND recorded_at >= $2"
            }
            BudgetScope::Org => {
                "SELECT COALESCE(SUM(amount_usd), 0) FROM cost_ledger WHERE org_id = $1 AND recorded_at >= $2"
            }
        };
        let (total,): (Decimal,) = sqlx::query_as(sql)
            .bind(key)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;
        Ok(total)
    }

    async fn claim_alert(&self, alert: &BudgetAlert) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO budget_alerts (scope, key, window_key, level, spent_usd, ceiling_usd, raised_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(alert.scope.as_str())
        .bind(&alert.key)
        .bind(&alert.window_key)
        .bind(alert.level.as_str())
        .bind(alert.spent_usd)
        .bind(alert.ceiling_usd)
        .bind(alert.raised_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// TrackedStore
// ============================================================================

#[async_trait]
impl TrackedStore for PostgresStore {
    async fn upsert_tracked_domain(&self, tracked: &TrackedDomain) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_domains (
                domain, data_types, template_id, frequency, max_pages, priority,
                webhook_url, org_id, budget, is_active, last_run_at, next_run_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (domain) DO UPDATE SET
                data_types = EXCLUDED.data_types,
                template_id = EXCLUDED.template_id,
                frequency = EXCLUDED.frequency,
                max_pages = EXCLUDED.max_pages,
                priority = EXCLUDED.priority,
                webhook_url = EXCLUDED.webhook_url,
                org_id = EXCLUDED.org_id,
                budget = EXCLUDED.budget,
                is_active = EXCLUDED.is_active,
                next_run_at = EXCLUDED.next_run_at
            "#,
        )
        .bind(&tracked.domain)
        .bind(Json(&tracked.data_types))
        .bind(&tracked.template_id)
        .bind(tracked.frequency.as_str())
        .bind(tracked.max_pages)
        .bind(tracked.priority)
        .bind(&tracked.webhook_url)
        .bind(&tracked.org_id)
        .bind(Json(&tracked.budget))
        .bind(tracked.is_active)
        .bind(tracked.last_run_at)
        .bind(tracked.next_run_at)
        .bind(tracked.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_tracked_domain(&self, domain: &str) -> StoreResult<Option<TrackedDomain>> {
        sqlx::query_as::<_, TrackedDomainRow>("SELECT * FROM tracked_domains WHERE domain = $1")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .map(TrackedDomainRow::into_tracked)
            .transpose()
    }

    async fn deactivate_tracked_domain(&self, domain: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tracked_domains SET is_active = FALSE WHERE domain = $1 AND is_active",
        )
        .bind(domain)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_tracked_domains(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<TrackedDomain>> {
        sqlx::query_as::<_, TrackedDomainRow>(
            "SELECT * FROM tracked_domains WHERE is_active AND next_run_at <= $1 ORDER BY next_run_at LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(TrackedDomainRow::into_tracked)
        .collect()
    }

    async fn claim_tracked_domain_run(
        &self,
        domain: &str,
        prior: DateTime<Utc>,
        next: DateTime<Utc>,
        now: DateTime<Utc>,
        job: &ScrapeJob,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let advanced = sqlx::query(
            r#"
            UPDATE tracked_domains SET next_run_at = $3, last_run_at = $4
            WHERE domain = $1 AND is_active AND next_run_at = $2
            "#,
        )
        .bind(domain)
        .bind(prior)
        .bind(next)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        if advanced.rows_affected() == 0 {
            tx.rollback().await.map_err(db)?;
            return Ok(false);
        }

        insert_job(&mut tx, job).await?;
        tx.commit().await.map_err(db)?;
        Ok(true)
    }

    async fn insert_tracked_search(&self, tracked: &TrackedSearch) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_searches (
                id, query, params, data_types, frequency, max_pages_per_domain, priority,
                webhook_url, org_id, is_active, last_run_at, next_run_at, total_runs,
                total_domains_discovered, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(tracked.id)
        .bind(&tracked.query)
        .bind(Json(&tracked.params))
        .bind(Json(&tracked.data_types))
        .bind(tracked.frequency.as_str())
        .bind(tracked.max_pages_per_domain)
        .bind(tracked.priority)
        .bind(&tracked.webhook_url)
        .bind(&tracked.org_id)
        .bind(tracked.is_active)
        .bind(tracked.last_run_at)
        .bind(tracked.next_run_at)
        .bind(tracked.total_runs)
        .bind(tracked.total_domains_discovered)
        .bind(tracked.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_tracked_search(&self, id: Uuid) -> StoreResult<Option<TrackedSearch>> {
        sqlx::query_as::<_, TrackedSearchRow>("SELECT * FROM tracked_searches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .map(TrackedSearchRow::into_tracked)
            .transpose()
    }

    async fn deactivate_tracked_search(&self, id: Uuid) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE tracked_searches SET is_active = FALSE WHERE id = $1 AND is_active")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn due_tracked_searches(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<TrackedSearch>> {
        sqlx::query_as::<_, TrackedSearchRow>(
            "SELECT * FROM tracked_searches WHERE is_active AND next_run_at <= $1 ORDER BY next_run_at LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(TrackedSearchRow::into_tracked)
        .collect()
    }

    async fn claim_tracked_search_run(
        &self,
        id: Uuid,
        prior: DateTime<Utc>,
        next: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tracked_searches SET
                next_run_at = $3,
                last_run_at = $4,
                total_runs = total_runs + 1
            WHERE id = $1 AND is_active AND next_run_at = $2
            "#,
        )
        .bind(id)
        .bind(prior)
        .bind(next)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn discovered_domains(&self, tracked_search_id: Uuid) -> StoreResult<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT l.domain
            FROM discovery_job_domains l
            JOIN discovery_jobs d ON d.id = l.discovery_id
            WHERE d.tracked_search_id = $1 AND l.scrape_job_id IS NOT NULL
            "#,
        )
        .bind(tracked_search_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(|(domain,)| domain).collect())
    }
}

// ============================================================================
// DiscoveryStore
// ============================================================================

#[async_trait]
impl DiscoveryStore for PostgresStore {
    async fn insert_discovery(&self, discovery: &DiscoveryJob) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discovery_jobs (
                id, query, params, data_types, max_pages_per_domain, priority, org_id,
                callback_url, tracked_search_id, status, domains_found, domains_skipped,
                total_cost_usd, raw_results, error_message, created_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(discovery.id)
        .bind(&discovery.query)
        .bind(Json(&discovery.params))
        .bind(Json(&discovery.data_types))
        .bind(discovery.max_pages_per_domain)
        .bind(discovery.priority)
        .bind(&discovery.org_id)
        .bind(&discovery.callback_url)
        .bind(discovery.tracked_search_id)
        .bind(discovery.status.as_str())
        .bind(discovery.domains_found)
        .bind(discovery.domains_skipped)
        .bind(discovery.total_cost_usd)
        .bind(&discovery.raw_results)
        .bind(&discovery.error_message)
        .bind(discovery.created_at)
        .bind(discovery.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_discovery(&self, id: Uuid) -> StoreResult<Option<DiscoveryJob>> {
        sqlx::query_as::<_, DiscoveryRow>("SELECT * FROM discovery_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .map(DiscoveryRow::into_discovery)
            .transpose()
    }

    async fn links_for_discovery(&self, id: Uuid) -> StoreResult<Vec<DiscoveryJobDomain>> {
        sqlx::query_as::<_, LinkRow>(
            "SELECT * FROM discovery_job_domains WHERE discovery_id = $1 ORDER BY created_at, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?
        .into_iter()
        .map(LinkRow::into_link)
        .collect()
    }

    #[instrument(skip(self, spawn), fields(discovery_id = %spawn.discovery_id, jobs = spawn.jobs.len()))]
    async fn spawn_discovery(&self, spawn: &DiscoverySpawn) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        let nothing_spawned = spawn.jobs.is_empty();

        let moved = sqlx::query(
            r#"
            UPDATE discovery_jobs SET
                raw_results = $2,
                domains_found = $3,
                domains_skipped = $4,
                status = CASE WHEN $5 THEN 'completed' ELSE 'scraping' END,
                completed_at = CASE WHEN $5 THEN $6 ELSE NULL END
            WHERE id = $1 AND status = 'searching'
            "#,
        )
        .bind(spawn.discovery_id)
        .bind(&spawn.raw_results)
        .bind(spawn.domains_found)
        .bind(spawn.domains_skipped)
        .bind(nothing_spawned)
        .bind(spawn.now)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        if moved.rows_affected() == 0 {
            tx.rollback().await.map_err(db)?;
            return Ok(false);
        }

        for job in &spawn.jobs {
            insert_job(&mut tx, job).await?;
        }
        for link in &spawn.links {
            insert_link(&mut tx, link).await?;
        }

        if let Some(tracked_id) = spawn.tracked_search_id {
            sqlx::query(
                "UPDATE tracked_searches SET total_domains_discovered = total_domains_discovered + $2 WHERE id = $1",
            )
            .bind(tracked_id)
            .bind(spawn.jobs.len() as i64)
            .execute(&mut *tx)
            .await
            .map_err(db)?;
        }

        tx.commit().await.map_err(db)?;
        Ok(true)
    }

    async fn fail_discovery(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE discovery_jobs SET status = 'failed', error_message = $2, completed_at = $3
            WHERE id = $1 AND status = 'searching'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_finished_discoveries(&self, now: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE discovery_jobs d SET status = 'completed', completed_at = $1
            WHERE d.status = 'scraping'
              AND NOT EXISTS (
                  SELECT 1 FROM discovery_job_domains l
                  WHERE l.discovery_id = d.id AND l.status IN ('pending', 'scraping')
              )
            RETURNING d.id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn fail_stale_discoveries(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE discovery_jobs SET
                status = 'failed',
                error_message = 'interrupted while searching',
                completed_at = $2
            WHERE status = 'searching' AND created_at < $1
            RETURNING id
            "#,
        )
        .bind(started_before)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

// ============================================================================
// WebhookStore
// ============================================================================

#[async_trait]
impl WebhookStore for PostgresStore {
    async fn insert_delivery(&self, delivery: &WebhookDelivery) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await.map_err(db)?;
        insert_delivery(&mut conn, delivery).await
    }

    async fn get_delivery(&self, id: Uuid) -> StoreResult<Option<WebhookDelivery>> {
        sqlx::query_as::<_, DeliveryRow>("SELECT * FROM webhook_deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .map(DeliveryRow::into_delivery)
            .transpose()
    }

    async fn claim_due_deliveries(
        &self,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<WebhookDelivery>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            WITH due AS (
                SELECT id FROM webhook_deliveries
                WHERE (status = 'pending' AND next_retry_at <= $1)
                   OR (status = 'processing' AND (claimed_at IS NULL OR claimed_at < $2))
                ORDER BY next_retry_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            UPDATE webhook_deliveries w SET status = 'processing', claimed_at = $1
            FROM due
            WHERE w.id = due.id
            RETURNING w.*
            "#,
        )
        .bind(now)
        .bind(reclaim_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut deliveries = rows
            .into_iter()
            .map(DeliveryRow::into_delivery)
            .collect::<StoreResult<Vec<_>>>()?;
        deliveries.sort_by_key(|d| d.next_retry_at);
        Ok(deliveries)
    }

    async fn mark_delivered(
        &self,
        id: Uuid,
        attempts: i32,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries SET
                status = 'delivered', attempts = $2, delivered_at = $3, claimed_at = NULL
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn reschedule_delivery(
        &self,
        id: Uuid,
        failure: &DeliveryFailure,
        next_retry_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries SET
                status = 'pending',
                attempts = $2,
                last_error = $3,
                error_history = error_history || jsonb_build_array($4::jsonb),
                next_retry_at = $5,
                claimed_at = NULL
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(failure.attempt)
        .bind(&failure.error)
        .bind(Json(failure))
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, failure), fields(attempt = failure.attempt))]
    async fn dead_letter_delivery(
        &self,
        id: Uuid,
        failure: &DeliveryFailure,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DeadLetter>> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let row = sqlx::query_as::<_, DeliveryRow>(
            r#"
            UPDATE webhook_deliveries SET
                status = 'dead_lettered',
                attempts = $2,
                last_error = $3,
                error_history = error_history || jsonb_build_array($4::jsonb),
                claimed_at = NULL
            WHERE id = $1 AND status = 'processing'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(failure.attempt)
        .bind(&failure.error)
        .bind(Json(failure))
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(db)?;
            return Ok(None);
        };
        let dead = DeadLetter::from_delivery(&row.into_delivery()?, now);

        sqlx::query(
            r#"
            INSERT INTO webhook_dead_letters (
                id, delivery_id, job_id, url, payload, total_attempts, last_error,
                error_history, created_at, replayed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(dead.id)
        .bind(dead.delivery_id)
        .bind(dead.job_id)
        .bind(&dead.url)
        .bind(&dead.payload)
        .bind(dead.total_attempts)
        .bind(&dead.last_error)
        .bind(Json(&dead.error_history))
        .bind(dead.created_at)
        .bind(dead.replayed_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(Some(dead))
    }

    async fn list_dead_letters(&self, limit: i64) -> StoreResult<Vec<DeadLetter>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            "SELECT * FROM webhook_dead_letters ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        Ok(rows.into_iter().map(DeadLetterRow::into_dead_letter).collect())
    }

    async fn get_dead_letter(&self, id: Uuid) -> StoreResult<Option<DeadLetter>> {
        let row = sqlx::query_as::<_, DeadLetterRow>(
            "SELECT * FROM webhook_dead_letters WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;
        Ok(row.map(DeadLetterRow::into_dead_letter))
    }

    async fn replay_dead_letter(
        &self,
        id: Uuid,
        delivery: &WebhookDelivery,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let marked = sqlx::query(
            "UPDATE webhook_dead_letters SET replayed_at = $2 WHERE id = $1 AND replayed_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        if marked.rows_affected() == 0 {
            tx.rollback().await.map_err(db)?;
            return Ok(false);
        }

        insert_delivery(&mut tx, delivery).await?;
        tx.commit().await.map_err(db)?;
        Ok(true)
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    domain: String,
    data_types: Json<Vec<String>>,
    template_id: Option<String>,
    max_pages: i32,
    priority: i32,
    status: String,
    strategy_used: Option<String>,
    error_message: Option<String>,
    cost_usd: Option<Decimal>,
    duration_ms: Option<i64>,
    pages_scraped: Option<i32>,
    org_id: Option<String>,
    callback_url: Option<String>,
    budget: Json<BudgetCeilings>,
    discovery_id: Option<Uuid>,
    worker_id: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    delivery_count: i32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> StoreResult<ScrapeJob> {
        Ok(ScrapeJob {
            id: self.id,
            domain: self.domain,
            data_types: self.data_types.0,
            template_id: self.template_id,
            max_pages: self.max_pages,
            priority: self.priority,
            status: parse("scrape_jobs", &self.status)?,
            strategy_used: self
                .strategy_used
                .as_deref()
                .map(|s| parse("scrape_jobs", s))
                .transpose()?,
            error_message: self.error_message,
            cost_usd: self.cost_usd,
            duration_ms: self.duration_ms,
            pages_scraped: self.pages_scraped,
            org_id: self.org_id,
            callback_url: self.callback_url,
            budget: self.budget.0,
            discovery_id: self.discovery_id,
            worker_id: self.worker_id,
            lease_expires_at: self.lease_expires_at,
            delivery_count: self.delivery_count,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    id: Uuid,
    job_id: Uuid,
    domain: String,
    data_type: String,
    source_url: String,
    title: Option<String>,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> ScrapedRecord {
        ScrapedRecord {
            id: self.id,
            job_id: self.job_id,
            domain: self.domain,
            data_type: self.data_type,
            source_url: self.source_url,
            title: self.title,
            payload: self.payload,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MetadataRow {
    domain: String,
    last_successful_strategy: Option<String>,
    block_count: i32,
    success_rate: f64,
    avg_cost_usd: Decimal,
    success_count: i64,
    last_scraped_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl MetadataRow {
    fn into_metadata(self) -> StoreResult<DomainMetadata> {
        Ok(DomainMetadata {
            domain: self.domain,
            last_successful_strategy: self
                .last_successful_strategy
                .as_deref()
                .map(|s| parse("domain_metadata", s))
                .transpose()?,
            block_count: self.block_count,
            success_rate: self.success_rate,
            avg_cost_usd: self.avg_cost_usd,
            success_count: self.success_count,
            last_scraped_at: self.last_scraped_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TrackedDomainRow {
    domain: String,
    data_types: Json<Vec<String>>,
    template_id: Option<String>,
    frequency: String,
    max_pages: i32,
    priority: i32,
    webhook_url: Option<String>,
    org_id: Option<String>,
    budget: Json<BudgetCeilings>,
    is_active: bool,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TrackedDomainRow {
    fn into_tracked(self) -> StoreResult<TrackedDomain> {
        Ok(TrackedDomain {
            domain: self.domain,
            data_types: self.data_types.0,
            template_id: self.template_id,
            frequency: parse("tracked_domains", &self.frequency)?,
            max_pages: self.max_pages,
            priority: self.priority,
            webhook_url: self.webhook_url,
            org_id: self.org_id,
            budget: self.budget.0,
            is_active: self.is_active,
            last_run_at: self.last_run_at,
            next_run_at: self.next_run_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TrackedSearchRow {
    id: Uuid,
    query: String,
    params: Json<SearchParams>,
    data_types: Json<Vec<String>>,
    frequency: String,
    max_pages_per_domain: i32,
    priority: i32,
    webhook_url: Option<String>,
    org_id: Option<String>,
    is_active: bool,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: DateTime<Utc>,
    total_runs: i64,
    total_domains_discovered: i64,
    created_at: DateTime<Utc>,
}

impl TrackedSearchRow {
    fn into_tracked(self) -> StoreResult<TrackedSearch> {
        Ok(TrackedSearch {
            id: self.id,
            query: self.query,
            params: self.params.0,
            data_types: self.data_types.0,
            frequency: parse("tracked_searches", &self.frequency)?,
            max_pages_per_domain: self.max_pages_per_domain,
            priority: self.priority,
            webhook_url: self.webhook_url,
            org_id: self.org_id,
            is_active: self.is_active,
            last_run_at: self.last_run_at,
            next_run_at: self.next_run_at,
            total_runs: self.total_runs,
            total_domains_discovered: self.total_domains_discovered,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DiscoveryRow {
    id: Uuid,
    query: String,
    params: Json<SearchParams>,
    data_types: Json<Vec<String>>,
    max_pages_per_domain: i32,
    priority: i32,
    org_id: Option<String>,
    callback_url: Option<String>,
    tracked_search_id: Option<Uuid>,
    status: String,
    domains_found: i32,
    domains_skipped: i32,
    total_cost_usd: Decimal,
    raw_results: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl DiscoveryRow {
    fn into_discovery(self) -> StoreResult<DiscoveryJob> {
        Ok(DiscoveryJob {
            id: self.id,
            query: self.query,
            params: self.params.0,
            data_types: self.data_types.0,
            max_pages_per_domain: self.max_pages_per_domain,
            priority: self.priority,
            org_id: self.org_id,
            callback_url: self.callback_url,
            tracked_search_id: self.tracked_search_id,
            status: parse("discovery_jobs", &self.status)?,
            domains_found: self.domains_found,
            domains_skipped: self.domains_skipped,
            total_cost_usd: self.total_cost_usd,
            raw_results: self.raw_results,
            error_message: self.error_message,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LinkRow {
    id: Uuid,
    discovery_id: Uuid,
    domain: String,
    scrape_job_id: Option<Uuid>,
    source_url: String,
    source_title: Option<String>,
    source_snippet: Option<String>,
    relevance_score: Option<f64>,
    status: String,
    skip_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl LinkRow {
    fn into_link(self) -> StoreResult<DiscoveryJobDomain> {
        Ok(DiscoveryJobDomain {
            id: self.id,
            discovery_id: self.discovery_id,
            domain: self.domain,
            scrape_job_id: self.scrape_job_id,
            source_url: self.source_url,
            source_title: self.source_title,
            source_snippet: self.source_snippet,
            relevance_score: self.relevance_score,
            status: parse("discovery_job_domains", &self.status)?,
            skip_reason: self.skip_reason,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DeliveryRow {
    id: Uuid,
    job_id: Uuid,
    url: String,
    payload: serde_json::Value,
    status: String,
    attempts: i32,
    max_attempts: i32,
    next_retry_at: DateTime<Utc>,
    last_error: Option<String>,
    error_history: Json<Vec<DeliveryFailure>>,
    claimed_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl DeliveryRow {
    fn into_delivery(self) -> StoreResult<WebhookDelivery> {
        Ok(WebhookDelivery {
            id: self.id,
            job_id: self.job_id,
            url: self.url,
            payload: self.payload,
            status: parse("webhook_deliveries", &self.status)?,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            next_retry_at: self.next_retry_at,
            last_error: self.last_error,
            error_history: self.error_history.0,
            claimed_at: self.claimed_at,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct DeadLetterRow {
    id: Uuid,
    delivery_id: Uuid,
    job_id: Uuid,
    url: String,
    payload: serde_json::Value,
    total_attempts: i32,
    last_error: String,
    error_history: Json<Vec<DeliveryFailure>>,
    created_at: DateTime<Utc>,
    replayed_at: Option<DateTime<Utc>>,
}

impl DeadLetterRow {
    fn into_dead_letter(self) -> DeadLetter {
        DeadLetter {
            id: self.id,
            delivery_id: self.delivery_id,
            job_id: self.job_id,
            url: self.url,
            payload: self.payload,
            total_attempts: self.total_attempts,
            last_error: self.last_error,
            error_history: self.error_history.0,
            created_at: self.created_at,
            replayed_at: self.replayed_at,
        }
    }
}
