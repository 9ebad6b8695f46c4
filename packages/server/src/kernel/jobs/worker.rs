//! Job worker service for processing scrape jobs.
//!
//! The `JobWorker` is a long-running service that:
//! - Claims batches of ready jobs from the queue under a lease
//! - Runs each job through the escalation loop (`JobProcessor`)
//! - Sends heartbeats so long jobs keep their lease
//! - Abandons jobs that were delivered too many times
//! - Releases jobs it could not finish so they are redelivered
//!
//! # Architecture
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► claim_jobs(worker_id, batch, lease)
//!     ├─► delivery_count > max? ──► abandon (failed)
//!     ├─► JobProcessor.process(job)   (heartbeat extends lease meanwhile)
//!     │       └─► terminal write + webhook outbox (one transaction)
//!     └─► store error ──► release_job (redeliver)
//! ```
//!
//! # Example
//!
//! ```ignore
//! let worker = JobWorker::new(store.clone(), processor.clone(), JobWorkerConfig::default());
//!
//! ServiceHost::new()
//!     .with_service(worker)
//!     .run_until_shutdown()
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use scrape_core::{JobProcessor, ScrapeJob, Store, WorkerConfig};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::kernel::service_host::Service;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long to wait when no jobs are available (max)
    pub max_poll_interval: Duration,
    /// Minimum poll interval
    pub min_poll_interval: Duration,
    /// How often to send heartbeats for running jobs
    pub heartbeat_interval: Duration,
    /// Lease taken on claim and renewed by each heartbeat
    pub lease_duration: Duration,
    /// Deliveries after which a job is failed instead of run again
    pub max_deliveries: i32,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self::from_worker_config(&WorkerConfig::default())
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }

    pub fn from_worker_config(config: &WorkerConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_poll_interval: config.max_poll_interval,
            min_poll_interval: config.min_poll_interval,
            heartbeat_interval: config.heartbeat_interval,
            lease_duration: config.lease_duration,
            max_deliveries: config.max_deliveries,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }

    fn lease(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::minutes(5))
    }
}

/// A worker that drains the scrape job queue.
pub struct JobWorker<S> {
    store: Arc<S>,
    processor: Arc<JobProcessor<S>>,
    config: JobWorkerConfig,
    /// Track running jobs for cancellation
    running_jobs: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl<S: Store + 'static> JobWorker<S> {
    pub fn new(store: Arc<S>, processor: Arc<JobProcessor<S>>, config: JobWorkerConfig) -> Self {
        Self {
            store,
            processor,
            config,
            running_jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Claim one batch and run it to completion. Returns the number claimed.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<usize> {
        let now = Utc::now();
        let jobs = self
            .store
            .claim_jobs(
                &self.config.worker_id,
                self.config.batch_size,
                now,
                now + self.config.lease(),
            )
            .await?;

        let claimed = jobs.len();
        if claimed == 0 {
            return Ok(0);
        }
        debug!(count = claimed, worker_id = %self.config.worker_id, "claimed jobs");

        let batch = futures::future::join_all(jobs.iter().map(|job| self.process_job(job, shutdown)));
        tokio::select! {
            _ = batch => {}
            _ = shutdown.cancelled() => {
                // Unfinished jobs go straight back to the queue.
                for job in &jobs {
                    if let Err(e) = self.store.release_job(job.id, &self.config.worker_id).await {
                        error!(job_id = %job.id, error = %e, "failed to release job on shutdown");
                    }
                }
            }
        }

        Ok(claimed)
    }

    /// Process a single claimed job.
    async fn process_job(&self, job: &ScrapeJob, shutdown: &CancellationToken) {
        let job_id = job.id;

        // Create cancellation token for this job
        let job_cancel = shutdown.child_token();
        self.running_jobs
            .write()
            .await
            .insert(job_id, job_cancel.clone());

        if job.delivery_count > self.config.max_deliveries {
            warn!(
                job_id = %job_id,
                domain = %job.domain,
                deliveries = job.delivery_count,
                "job exceeded max deliveries, abandoning"
            );
            if let Err(e) = self.processor.abandon(job).await {
                error!(job_id = %job_id, error = %e, "failed to abandon job");
            }
            self.running_jobs.write().await.remove(&job_id);
            return;
        }

        match self.execute_with_heartbeat(job, job_cancel).await {
            Ok(()) => {}
            Err(e) => {
                warn!(job_id = %job_id, domain = %job.domain, error = %e, "job processing failed, releasing");
                if let Err(e) = self.store.release_job(job_id, &self.config.worker_id).await {
                    error!(job_id = %job_id, error = %e, "failed to release job");
                }
            }
        }

        // Cleanup
        self.running_jobs.write().await.remove(&job_id);
    }

    /// Process a job with periodic lease extensions.
    async fn execute_with_heartbeat(&self, job: &ScrapeJob, cancel: CancellationToken) -> Result<()> {
        let store = self.store.clone();
        let job_id = job.id;
        let worker_id = self.config.worker_id.clone();
        let heartbeat_interval = self.config.heartbeat_interval;
        let lease = self.config.lease();

        // Spawn heartbeat task
        let heartbeat_cancel = cancel.clone();
        let heartbeat_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = heartbeat_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        match store.extend_lease(job_id, &worker_id, Utc::now() + lease).await {
                            Ok(true) => {}
                            Ok(false) => {
                                warn!(job_id = %job_id, "lease lost, job may be redelivered");
                                break;
                            }
                            Err(e) => warn!(job_id = %job_id, error = %e, "heartbeat failed"),
                        }
                    }
                }
            }
        });

        let result = self.processor.process(job).await;

        // Stop heartbeat
        cancel.cancel();
        let _ = heartbeat_handle.await;

        let report = result?;
        debug!(
            job_id = %job_id,
            status = %report.outcome.status,
            attempts = report.attempts.len(),
            transitioned = report.transitioned,
            "job processed"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: Store + 'static> Service for JobWorker<S> {
    fn name(&self) -> &'static str {
        "job-worker"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            "job worker starting"
        );

        let mut idle = self.config.min_poll_interval;
        loop {
            // Check for shutdown
            if shutdown.is_cancelled() {
                break;
            }

            let wait = match self.run_once(&shutdown).await {
                Ok(0) => {
                    // Back off while the queue is empty
                    let wait = idle;
                    idle = (idle * 2).min(self.config.max_poll_interval);
                    wait
                }
                Ok(_) => {
                    idle = self.config.min_poll_interval;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    Duration::from_secs(1)
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let running_count = self.running_jobs.read().await.len();
        if running_count > 0 {
            info!(count = running_count, "cancelling running jobs");
            for token in self.running_jobs.read().await.values() {
                token.cancel();
            }
        }

        info!(worker_id = %self.config.worker_id, "job worker stopped");
        Ok(())
    }
}
