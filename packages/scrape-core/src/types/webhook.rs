//! Webhook delivery queue entries, payloads and dead letters.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{JobStatus, ScrapeJob, ScrapedRecord};
use super::tier::Tier;
use crate::error::ParseEnumError;

/// Per-entry state machine:
/// `pending -> processing -> {delivered | pending (next_retry_at) | dead_lettered}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Delivered,
    DeadLettered,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::DeadLettered => "dead_lettered",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "processing" => Ok(DeliveryStatus::Processing),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "dead_lettered" => Ok(DeliveryStatus::DeadLettered),
            other => Err(ParseEnumError::new("delivery status", other)),
        }
    }
}

/// One failed attempt in a delivery's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub attempt: i32,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    /// Attempts made so far.
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub error_history: Vec<DeliveryFailure>,
    /// When the current `processing` claim was taken.
    pub claimed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl WebhookDelivery {
    /// A pending entry due immediately.
    pub fn new(
        job_id: Uuid,
        url: impl Into<String>,
        payload: serde_json::Value,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            url: url.into(),
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            max_attempts,
            next_retry_at: now,
            last_error: None,
            error_history: Vec::new(),
            claimed_at: None,
            delivered_at: None,
            created_at: now,
        }
    }
}

/// Terminal copy of a delivery that exhausted its attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub delivery_id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub payload: serde_json::Value,
    pub total_attempts: i32,
    pub last_error: String,
    pub error_history: Vec<DeliveryFailure>,
    pub created_at: DateTime<Utc>,
    pub replayed_at: Option<DateTime<Utc>>,
}

impl DeadLetter {
    pub fn from_delivery(delivery: &WebhookDelivery, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            delivery_id: delivery.id,
            job_id: delivery.job_id,
            url: delivery.url.clone(),
            payload: delivery.payload.clone(),
            total_attempts: delivery.attempts,
            last_error: delivery.last_error.clone().unwrap_or_default(),
            error_history: delivery.error_history.clone(),
            created_at: now,
            replayed_at: None,
        }
    }
}

/// Record counts per data type, plus the failure reason if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total_records: usize,
    pub records_by_type: IndexMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultSummary {
    pub fn from_records(records: &[ScrapedRecord], error: Option<String>) -> Self {
        let mut records_by_type = IndexMap::new();
        for record in records {
            *records_by_type.entry(record.data_type.clone()).or_insert(0) += 1;
        }
        Self {
            total_records: records.len(),
            records_by_type,
            error,
        }
    }
}

/// Body POSTed to a caller's callback URL when a job finishes.
///
/// Receivers deduplicate on `job_id`; the queue is at-least-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub job_id: Uuid,
    pub domain: String,
    pub status: JobStatus,
    pub strategy_used: Option<Tier>,
    pub cost_usd: Decimal,
    pub duration_ms: i64,
    pub pages_scraped: i32,
    pub result_summary: ResultSummary,
    pub completed_at: DateTime<Utc>,
}

impl WebhookPayload {
    pub const EVENT: &'static str = "scrape_job.finished";

    /// Build from a job that already carries its terminal outcome.
    pub fn for_job(job: &ScrapeJob, summary: ResultSummary, now: DateTime<Utc>) -> Self {
        Self {
            event: Self::EVENT.to_string(),
            job_id: job.id,
            domain: job.domain.clone(),
            status: job.status,
            strategy_used: job.strategy_used,
            cost_usd: job.cost_usd.unwrap_or_default(),
            duration_ms: job.duration_ms.unwrap_or_default(),
            pages_scraped: job.pages_scraped.unwrap_or_default(),
            result_summary: summary,
            completed_at: job.completed_at.unwrap_or(now),
        }
    }
}
