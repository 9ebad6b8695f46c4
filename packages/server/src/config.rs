use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use scrape_core::{BudgetCeilings, OrchestratorConfig};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Rendering service used for the browser and proxy tiers.
    pub fetch_service_url: String,
    pub search_service_url: String,
    pub worker_count: usize,
    pub fetch_timeout: Duration,
    pub webhook_auth_token: Option<String>,
    pub trigger_schedule: String,
    pub default_budget: BudgetCeilings,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            fetch_service_url: service_url("FETCH_SERVICE_URL")?,
            search_service_url: service_url("SEARCH_SERVICE_URL")?,
            worker_count: env::var("WORKER_COUNT")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("WORKER_COUNT must be a valid number")?,
            fetch_timeout: Duration::from_secs(
                env::var("FETCH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("FETCH_TIMEOUT_SECS must be a valid number")?,
            ),
            webhook_auth_token: env::var("WEBHOOK_AUTH_TOKEN").ok(),
            trigger_schedule: env::var("TRIGGER_SCHEDULE")
                .unwrap_or_else(|_| "0 */15 * * * *".to_string()),
            default_budget: BudgetCeilings {
                domain_daily_usd: optional_usd("DOMAIN_DAILY_BUDGET_USD")?,
                domain_monthly_usd: optional_usd("DOMAIN_MONTHLY_BUDGET_USD")?,
                org_daily_usd: optional_usd("ORG_DAILY_BUDGET_USD")?,
                org_monthly_usd: optional_usd("ORG_MONTHLY_BUDGET_USD")?,
            },
        })
    }

    /// Core configuration with this process's overrides applied.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.worker.fetch_timeout = self.fetch_timeout;
        config.webhook.auth_token = self.webhook_auth_token.clone();
        config.budget.default_ceilings = self.default_budget.clone();
        config.trigger.schedule = self.trigger_schedule.clone();
        config
    }
}

fn service_url(name: &str) -> Result<String> {
    let value = env::var(name).with_context(|| format!("{} must be set", name))?;
    let parsed = url::Url::parse(value.trim())
        .with_context(|| format!("{} must be an absolute URL", name))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{} must use http or https", name);
    }
    Ok(value.trim().trim_end_matches('/').to_string())
}

fn optional_usd(name: &str) -> Result<Option<Decimal>> {
    match env::var(name) {
        Ok(value) => Decimal::from_str(value.trim())
            .map(Some)
            .with_context(|| format!("{} must be a decimal amount", name)),
        Err(_) => Ok(None),
    }
}
