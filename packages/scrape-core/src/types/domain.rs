//! Per-domain feedback state read by the escalation engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::tier::Tier;

/// One row per domain, updated after attempts and job outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMetadata {
    pub domain: String,
    pub last_successful_strategy: Option<Tier>,
    /// Consecutive block signals since the last success.
    pub block_count: i32,
    /// Exponentially smoothed success rate in `0.0..=1.0`.
    pub success_rate: f64,
    /// Mean cost of successful jobs.
    pub avg_cost_usd: Decimal,
    pub success_count: i64,
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// An observation folded into a domain's metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataUpdate {
    /// An attempt hit a block, captcha or too-short response.
    Blocked,
    /// A job completed at `tier` with the given total cost.
    Succeeded { tier: Tier, cost_usd: Decimal },
    /// A job ended failed after making at least one attempt.
    Failed,
}

impl MetadataUpdate {
    /// Sample fed into the smoothed success rate, if this update carries one.
    pub fn success_sample(&self) -> Option<f64> {
        match self {
            MetadataUpdate::Blocked => Some(0.0),
            MetadataUpdate::Succeeded { .. } => Some(1.0),
            MetadataUpdate::Failed => None,
        }
    }
}

impl DomainMetadata {
    /// Metadata for a domain seen for the first time.
    pub fn empty(domain: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            domain: domain.into(),
            last_successful_strategy: None,
            block_count: 0,
            success_rate: 0.0,
            avg_cost_usd: Decimal::ZERO,
            success_count: 0,
            last_scraped_at: None,
            updated_at: now,
        }
    }

    /// Fold an update into this row.
    ///
    /// The first sample seeds the rate; later samples are smoothed with
    /// `alpha`. The relational store applies the same arithmetic in SQL.
    pub fn apply(&mut self, update: &MetadataUpdate, alpha: f64, now: DateTime<Utc>) {
        let first_sample = self.success_count == 0
            && self.block_count == 0
            && self.last_successful_strategy.is_none()
            && self.last_scraped_at.is_none();

        if let Some(sample) = update.success_sample() {
            self.success_rate = if first_sample {
                sample
            } else {
                self.success_rate * (1.0 - alpha) + alpha * sample
            };
        }

        match update {
            MetadataUpdate::Blocked => {
                self.block_count += 1;
            }
            MetadataUpdate::Succeeded { tier, cost_usd } => {
                self.last_successful_strategy = Some(*tier);
                self.block_count = 0;
                self.success_count += 1;
                self.avg_cost_usd +=
                    (*cost_usd - self.avg_cost_usd) / Decimal::from(self.success_count);
                self.last_scraped_at = Some(now);
            }
            MetadataUpdate::Failed => {
                self.last_scraped_at = Some(now);
            }
        }

        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_resets_blocks_and_records_tier() {
        let now = Utc::now();
        let mut meta = DomainMetadata::empty("example.com", now);
        meta.apply(&MetadataUpdate::Blocked, 0.2, now);
        meta.apply(&MetadataUpdate::Blocked, 0.2, now);
        assert_eq!(meta.block_count, 2);
        assert_eq!(meta.success_rate, 0.0);

        meta.apply(
            &MetadataUpdate::Succeeded {
                tier: Tier::RenderedBrowser,
                cost_usd: Decimal::new(2, 3),
            },
            0.2,
            now,
        );
        assert_eq!(meta.block_count, 0);
        assert_eq!(meta.last_successful_strategy, Some(Tier::RenderedBrowser));
        assert!((meta.success_rate - 0.2).abs() < 1e-9);
        assert_eq!(meta.avg_cost_usd, Decimal::new(2, 3));
        assert_eq!(meta.last_scraped_at, Some(now));
    }

    #[test]
    fn test_average_cost_is_mean_of_successes() {
        let now = Utc::now();
        let mut meta = DomainMetadata::empty("example.com", now);
        for cost in [Decimal::new(1, 3), Decimal::new(3, 3)] {
            meta.apply(
                &MetadataUpdate::Succeeded {
                    tier: Tier::PlainRequest,
                    cost_usd: cost,
                },
                0.2,
                now,
            );
        }
        assert_eq!(meta.avg_cost_usd, Decimal::new(2, 3));
        assert!((meta.success_rate - 1.0).abs() < 1e-9);
    }
}
