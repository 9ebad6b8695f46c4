//! Drains the webhook delivery queue.
//!
//! Each pass claims due entries (including `processing` entries whose
//! drainer died past the visibility timeout) and attempts them once. The
//! dispatcher applies the retry schedule, so this loop only decides when to
//! poll again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use scrape_core::{DrainReport, WebhookDispatcher, WebhookStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::kernel::service_host::Service;

pub struct WebhookWorker<S> {
    dispatcher: Arc<WebhookDispatcher<S>>,
    poll_interval: Duration,
}

impl<S: WebhookStore + 'static> WebhookWorker<S> {
    pub fn new(dispatcher: Arc<WebhookDispatcher<S>>) -> Self {
        Self {
            dispatcher,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// One drain pass at the current time.
    pub async fn run_once(&self) -> Result<DrainReport> {
        let report = self.dispatcher.drain_due(Utc::now()).await?;
        if report.claimed > 0 {
            debug!(
                claimed = report.claimed,
                delivered = report.delivered,
                retried = report.retried,
                dead_lettered = report.dead_lettered,
                "webhook drain pass"
            );
        }
        Ok(report)
    }
}

#[async_trait::async_trait]
impl<S: WebhookStore + 'static> Service for WebhookWorker<S> {
    fn name(&self) -> &'static str {
        "webhook-worker"
    }

    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(poll_interval_secs = self.poll_interval.as_secs(), "webhook worker starting");

        loop {
            let full_batch = match self.run_once().await {
                // A non-empty pass may have left more due entries behind.
                Ok(report) => report.claimed > 0,
                Err(e) => {
                    error!(error = %e, "webhook drain failed");
                    false
                }
            };

            if full_batch {
                if shutdown.is_cancelled() {
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("webhook worker stopped");
        Ok(())
    }
}
