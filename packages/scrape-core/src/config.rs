//! Configuration types for the orchestration core.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::types::{BudgetCeilings, Tier};

/// Escalation engine thresholds and cost estimates.
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// Responses with fewer content bytes than this count as blocked.
    pub min_content_length: usize,
    /// Block count at which a domain no longer starts at the cheapest tier.
    pub block_threshold: i32,
    /// Smoothing factor for the rolling success rate.
    pub success_rate_alpha: f64,
    pub plain_request_cost: Decimal,
    pub rendered_browser_cost: Decimal,
    pub residential_proxy_cost: Decimal,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            min_content_length: 200,
            block_threshold: 3,
            success_rate_alpha: 0.2,
            plain_request_cost: Decimal::new(1, 4),
            rendered_browser_cost: Decimal::new(2, 3),
            residential_proxy_cost: Decimal::new(4, 3),
        }
    }
}

impl EscalationConfig {
    /// Expected cost of one attempt at `tier`, used for pre-attempt budget checks.
    pub fn estimated_cost(&self, tier: Tier) -> Decimal {
        match tier {
            Tier::PlainRequest => self.plain_request_cost,
            Tier::RenderedBrowser => self.rendered_browser_cost,
            Tier::ResidentialProxy => self.residential_proxy_cost,
        }
    }
}

/// Spend ceilings applied when a job carries no override.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub default_ceilings: BudgetCeilings,
    /// Fraction of a ceiling at which a warning alert fires.
    pub alert_fraction: Decimal,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_ceilings: BudgetCeilings::default(),
            alert_fraction: Decimal::new(8, 1),
        }
    }
}

/// Queue lease and worker loop settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long a claim stays invisible to other workers
    pub lease_duration: Duration,
    /// How often to extend the lease of a running job
    pub heartbeat_interval: Duration,
    /// Shortest wait between polls
    pub min_poll_interval: Duration,
    /// Longest wait between polls when the queue is idle
    pub max_poll_interval: Duration,
    /// Per-attempt fetch timeout
    pub fetch_timeout: Duration,
    /// Deliveries after which a job is abandoned as failed
    pub max_deliveries: i32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            lease_duration: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
            min_poll_interval: Duration::from_secs(1),
            max_poll_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(30),
            max_deliveries: 5,
        }
    }
}

/// Webhook delivery queue settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub max_attempts: i32,
    /// Entries left in `processing` longer than this are reclaimed.
    pub visibility_timeout: Duration,
    /// Entries claimed per drain pass.
    pub batch_size: i64,
    pub request_timeout: Duration,
    /// Sent as a bearer token when set.
    pub auth_token: Option<String>,
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::webhook::schedule::MAX_ATTEMPTS,
            visibility_timeout: Duration::from_secs(300),
            batch_size: 20,
            request_timeout: Duration::from_secs(10),
            auth_token: None,
            user_agent: "scrape-orchestrator-webhook/1.0".to_string(),
        }
    }
}

/// Discovery pipeline settings.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Domains scraped within this window are skipped.
    pub recency_window: chrono::Duration,
    /// Upper bound on domains spawned by one discovery run.
    pub max_domains_per_query: usize,
    /// Attempts per search page for retryable errors.
    pub search_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub search_retry_base: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            recency_window: chrono::Duration::days(7),
            max_domains_per_query: 50,
            search_attempts: 3,
            search_retry_base: Duration::from_millis(500),
        }
    }
}

/// Recurring trigger settings.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Cron expression for the trigger cycle (seconds field first).
    pub schedule: String,
    /// Discoveries stuck in `searching` longer than this are failed.
    pub stale_discovery_timeout: chrono::Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            schedule: "0 */15 * * * *".to_string(),
            stale_discovery_timeout: chrono::Duration::minutes(30),
        }
    }
}

/// Aggregated configuration for all orchestration components.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub escalation: EscalationConfig,
    pub budget: BudgetConfig,
    pub worker: WorkerConfig,
    pub webhook: WebhookConfig,
    pub discovery: DiscoveryConfig,
    pub trigger: TriggerConfig,
}
