//! Scrape jobs and the records they produce.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::budget::BudgetCeilings;
use super::tier::Tier;
use crate::error::ParseEnumError;

/// Lifecycle of a scrape job.
///
/// Transitions only move forward: `pending -> running -> {completed | failed}`.
/// A redelivered job stays `running`; it is never reset to `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseEnumError::new("job status", other)),
        }
    }
}

/// Input for creating a scrape job.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewScrapeJob {
    #[builder(setter(into))]
    pub domain: String,
    pub data_types: Vec<String>,
    #[builder(default = 50)]
    pub max_pages: i32,
    #[builder(default, setter(strip_option, into))]
    pub template_id: Option<String>,
    /// 1..=10, higher runs first.
    #[builder(default = 5)]
    pub priority: i32,
    #[builder(default, setter(strip_option, into))]
    pub org_id: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub callback_url: Option<String>,
    #[builder(default)]
    pub budget: BudgetCeilings,
    #[builder(default, setter(strip_option))]
    pub discovery_id: Option<Uuid>,
}

/// A unit of work against one domain, persisted as a row of the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: Uuid,
    pub domain: String,
    pub data_types: Vec<String>,
    pub template_id: Option<String>,
    pub max_pages: i32,
    pub priority: i32,
    pub status: JobStatus,
    pub strategy_used: Option<Tier>,
    pub error_message: Option<String>,
    /// Set only once terminal.
    pub cost_usd: Option<Decimal>,
    /// Set only once terminal.
    pub duration_ms: Option<i64>,
    pub pages_scraped: Option<i32>,
    pub org_id: Option<String>,
    pub callback_url: Option<String>,
    /// Per-job ceiling overrides, merged over the configured defaults.
    pub budget: BudgetCeilings,
    pub discovery_id: Option<Uuid>,

    // Lease bookkeeping
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub delivery_count: i32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScrapeJob {
    /// Create a pending job from submission input.
    pub fn new(input: NewScrapeJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            domain: input.domain,
            data_types: input.data_types,
            template_id: input.template_id,
            max_pages: input.max_pages,
            priority: input.priority,
            status: JobStatus::Pending,
            strategy_used: None,
            error_message: None,
            cost_usd: None,
            duration_ms: None,
            pages_scraped: None,
            org_id: input.org_id,
            callback_url: input.callback_url,
            budget: input.budget,
            discovery_id: input.discovery_id,
            worker_id: None,
            lease_expires_at: None,
            delivery_count: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Entry URL handed to the fetch capability.
    pub fn target_url(&self) -> String {
        format!("https://{}/", self.domain)
    }

    /// Whether a running job's lease has lapsed and it may be redelivered.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Running
            && self.lease_expires_at.map(|at| at < now).unwrap_or(true)
    }

    /// Whether a queue claim may hand this job to a worker.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending || self.lease_expired(now)
    }

    /// Apply a terminal outcome in place.
    pub fn apply_outcome(&mut self, outcome: &JobOutcome) {
        self.status = outcome.status;
        self.strategy_used = outcome.strategy_used;
        self.error_message = outcome.error_message.clone();
        self.cost_usd = Some(outcome.cost_usd);
        self.duration_ms = Some(outcome.duration_ms);
        self.pages_scraped = Some(outcome.pages_scraped);
        self.completed_at = Some(outcome.completed_at);
        self.worker_id = None;
        self.lease_expires_at = None;
    }
}

/// Terminal state written for a job in one conditional update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub strategy_used: Option<Tier>,
    pub error_message: Option<String>,
    pub cost_usd: Decimal,
    pub duration_ms: i64,
    pub pages_scraped: i32,
    pub completed_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn completed(
        strategy: Tier,
        cost_usd: Decimal,
        duration_ms: i64,
        pages_scraped: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: JobStatus::Completed,
            strategy_used: Some(strategy),
            error_message: None,
            cost_usd,
            duration_ms,
            pages_scraped,
            completed_at: now,
        }
    }

    pub fn failed(
        strategy: Option<Tier>,
        reason: impl Into<String>,
        cost_usd: Decimal,
        duration_ms: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            status: JobStatus::Failed,
            strategy_used: strategy,
            error_message: Some(reason.into()),
            cost_usd,
            duration_ms,
            pages_scraped: 0,
            completed_at: now,
        }
    }
}

/// A structured record produced by the extractor for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub domain: String,
    pub data_type: String,
    pub source_url: String,
    pub title: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> ScrapeJob {
        ScrapeJob::new(
            NewScrapeJob::builder()
                .domain("example.com")
                .data_types(vec!["contacts".into()])
                .build(),
            Utc::now(),
        )
    }

    #[test]
    fn test_status_never_moves_backwards() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn test_builder_defaults() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.max_pages, 50);
        assert_eq!(job.priority, 5);
        assert!(job.cost_usd.is_none());
        assert_eq!(job.target_url(), "https://example.com/");
    }

    #[test]
    fn test_running_job_is_claimable_only_after_lease_expiry() {
        let now = Utc::now();
        let mut job = job();
        job.status = JobStatus::Running;
        job.lease_expires_at = Some(now + Duration::minutes(5));
        assert!(!job.is_claimable(now));
        assert!(job.is_claimable(now + Duration::minutes(6)));
    }
}
