//! Per-job processing: the escalation loop a worker runs for one claimed job.
//!
//! # Flow
//!
//! ```text
//! select_strategy(metadata)
//!     │
//!     └─► loop
//!           ├─► check_budget(next tier)        denied ─► failed (budget exceeded)
//!           ├─► fetch (with timeout)
//!           ├─► record running cost in ledger
//!           ├─► classify + metadata on block
//!           └─► should_escalate                 ─► success | next tier | failed
//!     │
//!     ├─► extract records
//!     ├─► finish_job(outcome, records, webhook delivery)  (one transaction, only if still running)
//!     └─► metadata outcome (only for the delivery that finished the job)
//! ```
//!
//! Cost is recomputed from zero on every delivery of a job and written as a
//! running total, so a redelivered job overwrites its spend instead of
//! adding to it.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::budget::CostTracker;
use crate::config::OrchestratorConfig;
use crate::error::{FetchError, Result};
use crate::escalation::{EscalationEngine, Signal, Verdict, MANUAL_REVIEW_REQUIRED};
use crate::traits::{AlertSink, FetchRequest, FetchResponse, Fetcher, RecordExtractor, Store};
use crate::types::{
    BudgetDecision, JobOutcome, MetadataUpdate, ResultSummary, ScrapeJob, ScrapedRecord, Tier,
    WebhookDelivery, WebhookPayload,
};

/// One fetch attempt as seen by the processor.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptLog {
    pub tier: Tier,
    pub status_code: Option<u16>,
    pub signal: Signal,
    pub cost_usd: Decimal,
}

/// What processing a job produced.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub outcome: JobOutcome,
    pub attempts: Vec<AttemptLog>,
    /// `false` when another delivery of the job had already finished it.
    pub transitioned: bool,
}

enum LoopEnd {
    Fetched { tier: Tier, response: FetchResponse },
    Failed { reason: String },
}

pub struct JobProcessor<S> {
    store: Arc<S>,
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn RecordExtractor>,
    engine: EscalationEngine,
    costs: CostTracker<S>,
    config: OrchestratorConfig,
}

impl<S: Store> JobProcessor<S> {
    pub fn new(
        store: Arc<S>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn RecordExtractor>,
        alerts: Arc<dyn AlertSink>,
        config: OrchestratorConfig,
    ) -> Self {
        let costs = CostTracker::new(
            store.clone(),
            config.budget.clone(),
            config.escalation.clone(),
            alerts,
        );
        Self {
            store,
            fetcher,
            extractor,
            engine: EscalationEngine::new(config.escalation.clone()),
            costs,
            config,
        }
    }

    pub fn costs(&self) -> &CostTracker<S> {
        &self.costs
    }

    /// Run a claimed job to a terminal state.
    ///
    /// Fetch, budget and extraction failures end up in the job's outcome.
    /// Only store errors are returned; the caller should release the job so
    /// it is redelivered.
    pub async fn process(&self, job: &ScrapeJob) -> Result<JobReport> {
        let started = Instant::now();
        let alpha = self.config.escalation.success_rate_alpha;

        let metadata = self.store.get_metadata(&job.domain).await?;
        let mut tier = self.engine.select_strategy(metadata.as_ref());
        let mut total = Decimal::ZERO;
        let mut attempts: Vec<AttemptLog> = Vec::new();

        info!(
            job_id = %job.id,
            domain = %job.domain,
            tier = %tier,
            delivery = job.delivery_count,
            "processing scrape job"
        );

        let end = loop {
            let decision = self
                .costs
                .check_budget(
                    &job.domain,
                    job.org_id.as_deref(),
                    &job.budget,
                    tier,
                    Utc::now(),
                )
                .await?;
            if let BudgetDecision::Denied { reason } = decision {
                warn!(job_id = %job.id, tier = %tier, reason = %reason, "budget stops escalation");
                break LoopEnd::Failed { reason };
            }

            let request = FetchRequest {
                url: job.target_url(),
                tier,
                timeout: self.config.worker.fetch_timeout,
            };
            let fetched = self.fetch_with_timeout(&request).await;

            let cost = fetched
                .as_ref()
                .map(|r| r.cost_usd)
                .unwrap_or(Decimal::ZERO);
            total += cost;
            self.costs
                .record_cost(
                    job.id,
                    &job.domain,
                    job.org_id.as_deref(),
                    &job.budget,
                    total,
                    Utc::now(),
                )
                .await?;

            let signal = self.engine.classify(&fetched);
            if signal.is_block() {
                self.store
                    .update_metadata(&job.domain, &MetadataUpdate::Blocked, alpha, Utc::now())
                    .await?;
            }
            attempts.push(AttemptLog {
                tier,
                status_code: fetched.as_ref().ok().map(|r| r.status_code),
                signal: signal.clone(),
                cost_usd: cost,
            });

            match (self.engine.should_escalate(tier, &signal), fetched) {
                (Verdict::Success, Ok(response)) => break LoopEnd::Fetched { tier, response },
                (Verdict::Success, Err(e)) => break LoopEnd::Failed { reason: e.to_string() },
                (Verdict::Escalate { next, reason }, _) => {
                    info!(job_id = %job.id, from = %tier, to = %next, reason = %reason, "escalating");
                    tier = next;
                }
                (Verdict::Exhausted, _) => {
                    warn!(job_id = %job.id, domain = %job.domain, "all tiers exhausted");
                    break LoopEnd::Failed {
                        reason: MANUAL_REVIEW_REQUIRED.to_string(),
                    };
                }
                (Verdict::Fail { reason }, _) => break LoopEnd::Failed { reason },
            }
        };

        let last_tier = attempts.last().map(|a| a.tier);
        let duration_ms = started.elapsed().as_millis() as i64;
        let now = Utc::now();

        let (outcome, records, feedback) = match end {
            LoopEnd::Fetched { tier, response } => {
                match self.extractor.extract(job, &response).await {
                    Ok(extraction) => {
                        let records: Vec<ScrapedRecord> = extraction
                            .records
                            .into_iter()
                            .map(|r| ScrapedRecord {
                                id: uuid::Uuid::now_v7(),
                                job_id: job.id,
                                domain: job.domain.clone(),
                                data_type: r.data_type,
                                source_url: r.source_url,
                                title: r.title,
                                payload: r.payload,
                                created_at: now,
                            })
                            .collect();
                        let outcome = JobOutcome::completed(
                            tier,
                            total,
                            duration_ms,
                            extraction.pages_scraped,
                            now,
                        );
                        let feedback = MetadataUpdate::Succeeded {
                            tier,
                            cost_usd: total,
                        };
                        (outcome, records, Some(feedback))
                    }
                    Err(e) => {
                        let outcome =
                            JobOutcome::failed(Some(tier), e.to_string(), total, duration_ms, now);
                        (outcome, Vec::new(), Some(MetadataUpdate::Failed))
                    }
                }
            }
            LoopEnd::Failed { reason } => {
                let outcome = JobOutcome::failed(last_tier, reason, total, duration_ms, now);
                let feedback = (!attempts.is_empty()).then_some(MetadataUpdate::Failed);
                (outcome, Vec::new(), feedback)
            }
        };

        let transitioned = self.finish(job, &outcome, &records, now).await?;

        // A late duplicate delivery must not count the job twice.
        if let (true, Some(update)) = (transitioned, feedback) {
            self.store
                .update_metadata(&job.domain, &update, alpha, now)
                .await?;
        }

        Ok(JobReport {
            outcome,
            attempts,
            transitioned,
        })
    }

    /// Fail a job that was delivered too many times without finishing.
    ///
    /// The outcome carries whatever earlier deliveries already spent.
    pub async fn abandon(&self, job: &ScrapeJob) -> Result<bool> {
        let now = Utc::now();
        let spent = self.store.job_cost(job.id).await?;
        let reason = format!("abandoned after {} deliveries", job.delivery_count - 1);
        let outcome = JobOutcome::failed(None, reason, spent, 0, now);
        self.finish(job, &outcome, &[], now).await
    }

    async fn fetch_with_timeout(
        &self,
        request: &FetchRequest,
    ) -> std::result::Result<FetchResponse, FetchError> {
        match tokio::time::timeout(request.timeout, self.fetcher.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                elapsed_ms: request.timeout.as_millis() as u64,
            }),
        }
    }

    /// Write the outcome and, if the job has a callback, its webhook delivery.
    async fn finish(
        &self,
        job: &ScrapeJob,
        outcome: &JobOutcome,
        records: &[ScrapedRecord],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let delivery = match &job.callback_url {
            Some(url) => {
                let mut finished = job.clone();
                finished.apply_outcome(outcome);
                let summary = ResultSummary::from_records(records, outcome.error_message.clone());
                let payload = WebhookPayload::for_job(&finished, summary, now);
                Some(WebhookDelivery::new(
                    job.id,
                    url.clone(),
                    serde_json::to_value(&payload)?,
                    self.config.webhook.max_attempts,
                    now,
                ))
            }
            None => None,
        };

        let transitioned = self
            .store
            .finish_job(job.id, outcome, records, delivery.as_ref())
            .await?;

        if transitioned {
            info!(
                job_id = %job.id,
                domain = %job.domain,
                status = %outcome.status,
                cost_usd = %outcome.cost_usd,
                "scrape job finished"
            );
        } else {
            debug!(job_id = %job.id, "job already terminal, discarding late result");
        }
        Ok(transitioned)
    }
}
