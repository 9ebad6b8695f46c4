//! Webhook delivery queue: claim due entries, POST them, apply the schedule.
//!
//! Claim-then-process: entries are marked `processing` before any request
//! goes out, so two drainers never send the same entry concurrently. An
//! entry whose drainer died mid-send is reclaimed after the visibility
//! timeout, which makes delivery at-least-once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::schedule::{after_attempt, is_success_status, Transition};
use crate::config::WebhookConfig;
use crate::error::{Result, ScrapeError};
use crate::traits::{WebhookRequest, WebhookStore, WebhookTransport};
use crate::types::{DeadLetter, DeliveryFailure, WebhookDelivery};

/// Counts from one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub claimed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

pub struct WebhookDispatcher<S> {
    store: Arc<S>,
    transport: Arc<dyn WebhookTransport>,
    config: WebhookConfig,
}

impl<S: WebhookStore> WebhookDispatcher<S> {
    pub fn new(store: Arc<S>, transport: Arc<dyn WebhookTransport>, config: WebhookConfig) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Queue a payload for delivery, due immediately.
    pub async fn enqueue_delivery(
        &self,
        job_id: Uuid,
        url: &str,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let delivery = WebhookDelivery::new(job_id, url, payload, self.config.max_attempts, now);
        self.store.insert_delivery(&delivery).await?;
        debug!(delivery_id = %delivery.id, job_id = %job_id, "webhook delivery queued");
        Ok(delivery.id)
    }

    /// Claim due entries (up to the batch size) and attempt each once.
    pub async fn drain_due(&self, now: DateTime<Utc>) -> Result<DrainReport> {
        let visibility = chrono::Duration::from_std(self.config.visibility_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let entries = self
            .store
            .claim_due_deliveries(now, now - visibility, self.config.batch_size)
            .await?;

        let mut report = DrainReport {
            claimed: entries.len(),
            ..Default::default()
        };

        // Entries in one batch are independent; send them concurrently.
        let results = join_all(entries.iter().map(|entry| self.deliver(entry, now))).await;
        for result in results {
            match result? {
                Transition::Delivered => report.delivered += 1,
                Transition::Retry { .. } => report.retried += 1,
                Transition::DeadLetter => report.dead_lettered += 1,
            }
        }

        if report.claimed > 0 {
            debug!(?report, "webhook drain pass finished");
        }
        Ok(report)
    }

    /// Attempt one claimed entry and record the resulting transition.
    async fn deliver(&self, entry: &WebhookDelivery, now: DateTime<Utc>) -> Result<Transition> {
        let attempt = entry.attempts + 1;
        let request = self.build_request(entry, attempt)?;

        let error = match self.transport.post(&request).await {
            Ok(status) if is_success_status(status) => None,
            Ok(status) => Some(format!("http {}", status)),
            Err(e) => Some(e.to_string()),
        };

        let transition = after_attempt(attempt, entry.max_attempts, error.is_none(), now);
        let failure = DeliveryFailure {
            attempt,
            error: error.clone().unwrap_or_default(),
            at: now,
        };

        match &transition {
            Transition::Delivered => {
                self.store.mark_delivered(entry.id, attempt, now).await?;
                info!(delivery_id = %entry.id, job_id = %entry.job_id, attempt, "webhook delivered");
            }
            Transition::Retry { next_retry_at } => {
                self.store
                    .reschedule_delivery(entry.id, &failure, *next_retry_at)
                    .await?;
                warn!(
                    delivery_id = %entry.id,
                    attempt,
                    error = %failure.error,
                    next_retry_at = %next_retry_at,
                    "webhook delivery failed, will retry"
                );
            }
            Transition::DeadLetter => {
                self.store
                    .dead_letter_delivery(entry.id, &failure, now)
                    .await?;
                warn!(
                    delivery_id = %entry.id,
                    job_id = %entry.job_id,
                    attempts = attempt,
                    error = %failure.error,
                    "webhook delivery dead-lettered"
                );
            }
        }

        Ok(transition)
    }

    /// Serialize an entry into a signed request.
    ///
    /// `X-Content-SHA256` carries the hex digest of the exact body bytes so
    /// receivers can check integrity; `Authorization` carries the shared
    /// token when one is configured.
    pub fn build_request(&self, entry: &WebhookDelivery, attempt: i32) -> Result<WebhookRequest> {
        let body = serde_json::to_vec(&entry.payload)?;
        let digest = hex::encode(Sha256::digest(&body));

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
            ("X-Webhook-Job-Id".to_string(), entry.job_id.to_string()),
            ("X-Webhook-Delivery-Id".to_string(), entry.id.to_string()),
            ("X-Webhook-Attempt".to_string(), attempt.to_string()),
            ("X-Content-SHA256".to_string(), digest),
        ];
        if let Some(token) = &self.config.auth_token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        Ok(WebhookRequest {
            url: entry.url.clone(),
            headers,
            body,
        })
    }

    pub async fn dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
        Ok(self.store.list_dead_letters(limit).await?)
    }

    /// Re-queue a dead letter as a fresh delivery with a full attempt budget.
    pub async fn replay_dead_letter(&self, id: Uuid, now: DateTime<Utc>) -> Result<Uuid> {
        let dead = self
            .store
            .get_dead_letter(id)
            .await?
            .ok_or(ScrapeError::DeadLetterNotFound { id })?;

        let delivery = WebhookDelivery::new(
            dead.job_id,
            dead.url.clone(),
            dead.payload.clone(),
            self.config.max_attempts,
            now,
        );
        if !self.store.replay_dead_letter(id, &delivery, now).await? {
            return Err(ScrapeError::DeadLetterNotFound { id });
        }

        info!(dead_letter_id = %id, delivery_id = %delivery.id, "dead letter replayed");
        Ok(delivery.id)
    }
}
