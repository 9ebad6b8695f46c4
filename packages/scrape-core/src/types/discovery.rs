//! Query-driven discovery batches and their per-domain links.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::{ParseEnumError, ScrapeError};

/// Search engine mode passed through to the search capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Auto,
    Filter,
    Glimpse,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Auto => "auto",
            SearchMode::Filter => "filter",
            SearchMode::Glimpse => "glimpse",
        }
    }
}

impl FromStr for SearchMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(SearchMode::Auto),
            "filter" => Ok(SearchMode::Filter),
            "glimpse" => Ok(SearchMode::Glimpse),
            other => Err(ParseEnumError::new("search mode", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub mode: SearchMode,
    /// Consecutive result pages to request, 1..=10.
    #[serde(default = "default_search_pages")]
    pub search_pages: u32,
    /// 1..=50.
    #[serde(default = "default_results_per_page")]
    pub results_per_page: u32,
}

fn default_search_pages() -> u32 {
    3
}

fn default_results_per_page() -> u32 {
    10
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            mode: SearchMode::Auto,
            search_pages: default_search_pages(),
            results_per_page: default_results_per_page(),
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if !(1..=10).contains(&self.search_pages) {
            return Err(ScrapeError::validation("search_pages must be between 1 and 10"));
        }
        if !(1..=50).contains(&self.results_per_page) {
            return Err(ScrapeError::validation(
                "results_per_page must be between 1 and 50",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    Searching,
    Scraping,
    Completed,
    Failed,
}

impl DiscoveryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DiscoveryStatus::Completed | DiscoveryStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryStatus::Searching => "searching",
            DiscoveryStatus::Scraping => "scraping",
            DiscoveryStatus::Completed => "completed",
            DiscoveryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "searching" => Ok(DiscoveryStatus::Searching),
            "scraping" => Ok(DiscoveryStatus::Scraping),
            "completed" => Ok(DiscoveryStatus::Completed),
            "failed" => Ok(DiscoveryStatus::Failed),
            other => Err(ParseEnumError::new("discovery status", other)),
        }
    }
}

/// Input for starting a discovery run.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewDiscovery {
    #[builder(setter(into))]
    pub query: String,
    #[builder(default)]
    pub params: SearchParams,
    pub data_types: Vec<String>,
    #[builder(default = 50)]
    pub max_pages_per_domain: i32,
    #[builder(default = 5)]
    pub priority: i32,
    #[builder(default, setter(strip_option, into))]
    pub org_id: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub callback_url: Option<String>,
    #[builder(default, setter(strip_option))]
    pub tracked_search_id: Option<Uuid>,
}

/// Parent of a query-driven batch of scrape jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryJob {
    pub id: Uuid,
    pub query: String,
    pub params: SearchParams,
    pub data_types: Vec<String>,
    pub max_pages_per_domain: i32,
    pub priority: i32,
    pub org_id: Option<String>,
    pub callback_url: Option<String>,
    pub tracked_search_id: Option<Uuid>,
    pub status: DiscoveryStatus,
    pub domains_found: i32,
    pub domains_skipped: i32,
    pub total_cost_usd: Decimal,
    /// Combined search hits as returned upstream.
    pub raw_results: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DiscoveryJob {
    pub fn new(input: NewDiscovery, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            query: input.query,
            params: input.params,
            data_types: input.data_types,
            max_pages_per_domain: input.max_pages_per_domain,
            priority: input.priority,
            org_id: input.org_id,
            callback_url: input.callback_url,
            tracked_search_id: input.tracked_search_id,
            status: DiscoveryStatus::Searching,
            domains_found: 0,
            domains_skipped: 0,
            total_cost_usd: Decimal::ZERO,
            raw_results: None,
            error_message: None,
            created_at: now,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Scraping,
    Completed,
    Skipped,
    Failed,
}

impl LinkStatus {
    /// Whether the linked work is still outstanding.
    pub fn is_open(self) -> bool {
        matches!(self, LinkStatus::Pending | LinkStatus::Scraping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Scraping => "scraping",
            LinkStatus::Completed => "completed",
            LinkStatus::Skipped => "skipped",
            LinkStatus::Failed => "failed",
        }
    }
}

impl FromStr for LinkStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LinkStatus::Pending),
            "scraping" => Ok(LinkStatus::Scraping),
            "completed" => Ok(LinkStatus::Completed),
            "skipped" => Ok(LinkStatus::Skipped),
            "failed" => Ok(LinkStatus::Failed),
            other => Err(ParseEnumError::new("link status", other)),
        }
    }
}

/// Links a discovery job to the domain it found and the job it spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryJobDomain {
    pub id: Uuid,
    pub discovery_id: Uuid,
    pub domain: String,
    /// Absent for skipped domains.
    pub scrape_job_id: Option<Uuid>,
    pub source_url: String,
    pub source_title: Option<String>,
    pub source_snippet: Option<String>,
    pub relevance_score: Option<f64>,
    pub status: LinkStatus,
    pub skip_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a search hit points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Ordinary website, handled by the scrape pipeline.
    Domain,
    Video,
    ProfessionalNetwork,
    SocialMedia,
}

impl DestinationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DestinationKind::Domain => "domain",
            DestinationKind::Video => "video",
            DestinationKind::ProfessionalNetwork => "professional_network",
            DestinationKind::SocialMedia => "social_media",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_params_bounds() {
        assert!(SearchParams::default().validate().is_ok());
        let too_many_pages = SearchParams {
            search_pages: 11,
            ..Default::default()
        };
        assert!(too_many_pages.validate().is_err());
        let empty_page = SearchParams {
            results_per_page: 0,
            ..Default::default()
        };
        assert!(empty_page.validate().is_err());
    }
}
