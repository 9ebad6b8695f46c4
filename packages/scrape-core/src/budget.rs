//! Cost and budget tracking.
//!
//! Spend lives in a per-job ledger: each job's running total is upserted
//! after every attempt, so a redelivered job overwrites its entry instead of
//! adding to it. Window spend is the sum of ledger entries recorded in the
//! current UTC day or month.
//!
//! The budget is checked before every attempt, including escalations. A job
//! in flight is never killed; it just stops escalating once the next attempt
//! would cross a ceiling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{BudgetConfig, EscalationConfig};
use crate::error::Result;
use crate::traits::{AlertSink, LedgerStore};
use crate::types::{
    AlertLevel, BudgetAlert, BudgetCeilings, BudgetDecision, BudgetScope, BudgetWindow, CostEntry,
    Tier,
};

const WINDOWS: [BudgetWindow; 2] = [BudgetWindow::Daily, BudgetWindow::Monthly];

/// One ceiling that applies to a job.
#[derive(Debug, Clone, PartialEq)]
struct Limit<'a> {
    scope: BudgetScope,
    key: &'a str,
    window: BudgetWindow,
    ceiling: Decimal,
}

pub struct CostTracker<S> {
    store: Arc<S>,
    config: BudgetConfig,
    estimates: EscalationConfig,
    alerts: Arc<dyn AlertSink>,
}

impl<S> Clone for CostTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            estimates: self.estimates.clone(),
            alerts: self.alerts.clone(),
        }
    }
}

impl<S: LedgerStore> CostTracker<S> {
    pub fn new(
        store: Arc<S>,
        config: BudgetConfig,
        estimates: EscalationConfig,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            store,
            config,
            estimates,
            alerts,
        }
    }

    fn limits<'a>(
        &self,
        domain: &'a str,
        org_id: Option<&'a str>,
        overrides: &BudgetCeilings,
    ) -> Vec<Limit<'a>> {
        let ceilings = overrides.or(&self.config.default_ceilings);
        let mut keys = vec![(BudgetScope::Domain, domain)];
        if let Some(org) = org_id {
            keys.push((BudgetScope::Org, org));
        }

        keys.into_iter()
            .flat_map(|(scope, key)| WINDOWS.into_iter().map(move |window| (scope, key, window)))
            .filter_map(|(scope, key, window)| {
                ceilings.get(scope, window).map(|ceiling| Limit {
                    scope,
                    key,
                    window,
                    ceiling,
                })
            })
            .collect()
    }

    /// Whether an attempt at `next` may start.
    ///
    /// Denied when a window is already at its ceiling, or when the tier's
    /// estimated cost would take it past the ceiling.
    pub async fn check_budget(
        &self,
        domain: &str,
        org_id: Option<&str>,
        overrides: &BudgetCeilings,
        next: Tier,
        now: DateTime<Utc>,
    ) -> Result<BudgetDecision> {
        let estimate = self.estimates.estimated_cost(next);

        for limit in self.limits(domain, org_id, overrides) {
            let spent = self
                .store
                .spend_since(limit.scope, limit.key, limit.window.start_of(now))
                .await?;

            let reason = if spent >= limit.ceiling {
                Some(format!(
                    "budget exceeded: {} {} {} spend ${} reached ceiling ${}",
                    limit.scope.as_str(),
                    limit.key,
                    limit.window.as_str(),
                    spent,
                    limit.ceiling
                ))
            } else if spent + estimate > limit.ceiling {
                Some(format!(
                    "budget exceeded: {} attempt (${}) would take {} {} {} spend ${} past ceiling ${}",
                    next,
                    estimate,
                    limit.scope.as_str(),
                    limit.key,
                    limit.window.as_str(),
                    spent,
                    limit.ceiling
                ))
            } else {
                None
            };

            if let Some(reason) = reason {
                debug!(domain = %domain, tier = %next, reason = %reason, "budget check denied");
                return Ok(BudgetDecision::Denied { reason });
            }
        }

        Ok(BudgetDecision::Allowed)
    }

    /// Record a job's running total and raise any newly crossed alerts.
    ///
    /// `total_usd` is the job's cumulative cost so far, not a delta.
    pub async fn record_cost(
        &self,
        job_id: Uuid,
        domain: &str,
        org_id: Option<&str>,
        overrides: &BudgetCeilings,
        total_usd: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Vec<BudgetAlert>> {
        self.store
            .record_job_cost(&CostEntry {
                job_id,
                domain: domain.to_string(),
                org_id: org_id.map(str::to_string),
                amount_usd: total_usd,
                recorded_at: now,
            })
            .await?;

        let mut raised = Vec::new();
        for limit in self.limits(domain, org_id, overrides) {
            let spent = self
                .store
                .spend_since(limit.scope, limit.key, limit.window.start_of(now))
                .await?;

            for (level, threshold) in [
                (AlertLevel::Warning, limit.ceiling * self.config.alert_fraction),
                (AlertLevel::Exceeded, limit.ceiling),
            ] {
                if spent < threshold {
                    continue;
                }
                let alert = BudgetAlert {
                    scope: limit.scope,
                    key: limit.key.to_string(),
                    window: limit.window,
                    window_key: limit.window.key(now),
                    level,
                    spent_usd: spent,
                    ceiling_usd: limit.ceiling,
                    raised_at: now,
                };
                if self.store.claim_alert(&alert).await? {
                    warn!(alert = %alert, "budget alert");
                    self.alerts.alert(&alert).await;
                    raised.push(alert);
                }
            }
        }

        Ok(raised)
    }

    /// Spend attributed to `key` in the window containing `now`.
    pub async fn window_spend(
        &self,
        scope: BudgetScope,
        key: &str,
        window: BudgetWindow,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        Ok(self
            .store
            .spend_since(scope, key, window.start_of(now))
            .await?)
    }
}
