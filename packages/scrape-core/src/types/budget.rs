//! Budget ceilings, spend windows and alerts.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Who a spend figure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    Domain,
    Org,
}

impl BudgetScope {
    pub fn as_str(self) -> &'static str {
        match self {
            BudgetScope::Domain => "domain",
            BudgetScope::Org => "org",
        }
    }
}

/// Calendar window a ceiling applies to. Windows are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetWindow {
    Daily,
    Monthly,
}

impl BudgetWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            BudgetWindow::Daily => "daily",
            BudgetWindow::Monthly => "monthly",
        }
    }

    /// Start of the window containing `now`.
    pub fn start_of(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let (year, month, day) = match self {
            BudgetWindow::Daily => (now.year(), now.month(), now.day()),
            BudgetWindow::Monthly => (now.year(), now.month(), 1),
        };
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .single()
            .unwrap_or(now)
    }

    /// Stable identifier of the window containing `now`, used to
    /// deduplicate alerts (`2026-10-17` or `2026-10`).
    pub fn key(self, now: DateTime<Utc>) -> String {
        match self {
            BudgetWindow::Daily => now.format("%Y-%m-%d").to_string(),
            BudgetWindow::Monthly => now.format("%Y-%m").to_string(),
        }
    }
}

/// Optional spend ceilings. Unset ceilings are unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCeilings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_daily_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_monthly_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_daily_usd: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_monthly_usd: Option<Decimal>,
}

impl BudgetCeilings {
    /// Fill unset ceilings from `defaults`. Values set on `self` win.
    pub fn or(&self, defaults: &BudgetCeilings) -> BudgetCeilings {
        BudgetCeilings {
            domain_daily_usd: self.domain_daily_usd.or(defaults.domain_daily_usd),
            domain_monthly_usd: self.domain_monthly_usd.or(defaults.domain_monthly_usd),
            org_daily_usd: self.org_daily_usd.or(defaults.org_daily_usd),
            org_monthly_usd: self.org_monthly_usd.or(defaults.org_monthly_usd),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &BudgetCeilings::default()
    }

    /// The ceiling configured for a scope/window pair.
    pub fn get(&self, scope: BudgetScope, window: BudgetWindow) -> Option<Decimal> {
        match (scope, window) {
            (BudgetScope::Domain, BudgetWindow::Daily) => self.domain_daily_usd,
            (BudgetScope::Domain, BudgetWindow::Monthly) => self.domain_monthly_usd,
            (BudgetScope::Org, BudgetWindow::Daily) => self.org_daily_usd,
            (BudgetScope::Org, BudgetWindow::Monthly) => self.org_monthly_usd,
        }
    }
}

/// Result of a pre-attempt budget check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetDecision {
    Allowed,
    Denied { reason: String },
}

impl BudgetDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, BudgetDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Spend crossed the configured alert fraction.
    Warning,
    /// Spend reached the ceiling.
    Exceeded,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Exceeded => "exceeded",
        }
    }
}

/// A threshold crossing, emitted at most once per scope, window and level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub scope: BudgetScope,
    /// Domain name or org id.
    pub key: String,
    pub window: BudgetWindow,
    pub window_key: String,
    pub level: AlertLevel,
    pub spent_usd: Decimal,
    pub ceiling_usd: Decimal,
    pub raised_at: DateTime<Utc>,
}

impl fmt::Display for BudgetAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} budget {}: ${} of ${}",
            self.scope.as_str(),
            self.key,
            self.window.as_str(),
            self.level.as_str(),
            self.spent_usd,
            self.ceiling_usd
        )
    }
}

/// Running spend of one job, overwritten on every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub job_id: uuid::Uuid,
    pub domain: String,
    pub org_id: Option<String>,
    pub amount_usd: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_is_utc_midnight_and_month_start() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 15, 42, 7).unwrap();
        assert_eq!(
            BudgetWindow::Daily.start_of(now),
            Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap()
        );
        assert_eq!(
            BudgetWindow::Monthly.start_of(now),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(BudgetWindow::Daily.key(now), "2026-10-17");
        assert_eq!(BudgetWindow::Monthly.key(now), "2026-10");
    }

    #[test]
    fn test_overrides_win_over_defaults() {
        let defaults = BudgetCeilings {
            domain_daily_usd: Some(Decimal::new(100, 2)),
            org_monthly_usd: Some(Decimal::new(50, 0)),
            ..Default::default()
        };
        let overrides = BudgetCeilings {
            domain_daily_usd: Some(Decimal::new(25, 2)),
            ..Default::default()
        };

        let merged = overrides.or(&defaults);
        assert_eq!(merged.domain_daily_usd, Some(Decimal::new(25, 2)));
        assert_eq!(merged.org_monthly_usd, Some(Decimal::new(50, 0)));
        assert_eq!(merged.domain_monthly_usd, None);
    }
}
