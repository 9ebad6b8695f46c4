//! Recurring scrape and discovery configuration.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::budget::BudgetCeilings;
use super::discovery::SearchParams;
use crate::error::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    /// Fixed period between runs. Months are 30 days.
    pub fn period(self) -> Duration {
        match self {
            Frequency::Daily => Duration::days(1),
            Frequency::Weekly => Duration::days(7),
            Frequency::Biweekly => Duration::days(14),
            Frequency::Monthly => Duration::days(30),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Biweekly => "biweekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// The run after `prior`, advanced in whole periods until it is later
    /// than `now`.
    ///
    /// Advancing from the prior value rather than from `now` keeps the
    /// schedule's phase. Periods missed while the trigger was down are
    /// skipped, not replayed.
    ///
    /// The step from `prior` is exactly one period only while the row is at
    /// most one period overdue. A row further behind moves by a whole
    /// multiple of the period: a weekly row with `prior` on Oct 1 claimed on
    /// Oct 9 lands on Oct 15, not Oct 8.
    pub fn next_run_after(self, prior: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period();
        let mut next = prior + period;
        if next <= now {
            let behind = (now - next).num_seconds() / period.num_seconds() + 1;
            next += period * behind as i32;
        }
        next
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(ParseEnumError::new("frequency", other)),
        }
    }
}

/// Recurring scrape of one domain, keyed by domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDomain {
    pub domain: String,
    pub data_types: Vec<String>,
    pub template_id: Option<String>,
    pub frequency: Frequency,
    pub max_pages: i32,
    pub priority: i32,
    pub webhook_url: Option<String>,
    pub org_id: Option<String>,
    pub budget: BudgetCeilings,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Recurring discovery for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSearch {
    pub id: Uuid,
    pub query: String,
    pub params: SearchParams,
    pub data_types: Vec<String>,
    pub frequency: Frequency,
    pub max_pages_per_domain: i32,
    pub priority: i32,
    pub webhook_url: Option<String>,
    pub org_id: Option<String>,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
    pub total_runs: i64,
    pub total_domains_discovered: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for registering (or re-registering) a tracked domain.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewTrackedDomain {
    #[builder(setter(into))]
    pub domain: String,
    pub data_types: Vec<String>,
    #[builder(default, setter(strip_option, into))]
    pub template_id: Option<String>,
    #[builder(default = Frequency::Weekly)]
    pub frequency: Frequency,
    #[builder(default = 50)]
    pub max_pages: i32,
    #[builder(default = 5)]
    pub priority: i32,
    #[builder(default, setter(strip_option, into))]
    pub webhook_url: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub org_id: Option<String>,
    #[builder(default)]
    pub budget: BudgetCeilings,
}

impl TrackedDomain {
    /// Active row whose first run is one period after `now`.
    pub fn new(input: NewTrackedDomain, now: DateTime<Utc>) -> Self {
        Self {
            domain: input.domain,
            data_types: input.data_types,
            template_id: input.template_id,
            frequency: input.frequency,
            max_pages: input.max_pages,
            priority: input.priority,
            webhook_url: input.webhook_url,
            org_id: input.org_id,
            budget: input.budget,
            is_active: true,
            last_run_at: None,
            next_run_at: now + input.frequency.period(),
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct NewTrackedSearch {
    #[builder(setter(into))]
    pub query: String,
    #[builder(default)]
    pub params: SearchParams,
    pub data_types: Vec<String>,
    #[builder(default = Frequency::Weekly)]
    pub frequency: Frequency,
    #[builder(default = 50)]
    pub max_pages_per_domain: i32,
    #[builder(default = 5)]
    pub priority: i32,
    #[builder(default, setter(strip_option, into))]
    pub webhook_url: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub org_id: Option<String>,
}

impl TrackedSearch {
    pub fn new(input: NewTrackedSearch, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            query: input.query,
            params: input.params,
            data_types: input.data_types,
            frequency: input.frequency,
            max_pages_per_domain: input.max_pages_per_domain,
            priority: input.priority,
            webhook_url: input.webhook_url,
            org_id: input.org_id,
            is_active: true,
            last_run_at: None,
            next_run_at: now + input.frequency.period(),
            total_runs: 0,
            total_domains_discovered: 0,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_weekly_advances_seven_days_from_prior_value() {
        let prior = Utc.with_ymd_and_hms(2026, 10, 10, 9, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 10, 9, 20, 0).unwrap();
        assert_eq!(
            Frequency::Weekly.next_run_after(prior, now),
            Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_long_outage_skips_missed_runs_but_keeps_phase() {
        let prior = Utc.with_ymd_and_hms(2026, 10, 1, 6, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 4, 12, 0, 0).unwrap();
        assert_eq!(
            Frequency::Daily.next_run_after(prior, now),
            Utc.with_ymd_and_hms(2026, 10, 5, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_weekly_row_two_periods_behind_moves_fourteen_days() {
        let prior = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 9, 0, 0, 0).unwrap();
        let next = Frequency::Weekly.next_run_after(prior, now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap());
        assert_eq!(next - prior, Duration::days(14));
    }

    #[test]
    fn test_next_run_landing_exactly_on_now_is_pushed_forward() {
        let prior = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 2, 0, 0, 0).unwrap();
        assert_eq!(
            Frequency::Daily.next_run_after(prior, now),
            Utc.with_ymd_and_hms(2026, 10, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_registration_schedules_first_run_one_period_out() {
        let now = Utc.with_ymd_and_hms(2026, 10, 10, 9, 0, 0).unwrap();
        let tracked = TrackedDomain::new(
            NewTrackedDomain::builder()
                .domain("example.com")
                .data_types(vec!["business_info".to_string()])
                .frequency(Frequency::Biweekly)
                .build(),
            now,
        );
        assert!(tracked.is_active);
        assert_eq!(tracked.next_run_at, now + Duration::days(14));
        assert_eq!(tracked.last_run_at, None);
    }
}
