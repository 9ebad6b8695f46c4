//! Collaborators that consume fetched content or routed search hits.

use async_trait::async_trait;
use uuid::Uuid;

use super::fetcher::FetchResponse;
use super::searcher::SearchHit;
use crate::error::ExtractError;
use crate::types::{DestinationKind, ScrapeJob};

/// A record produced from fetched content, before it is tied to a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    pub data_type: String,
    pub source_url: String,
    pub title: Option<String>,
    pub payload: serde_json::Value,
}

/// Output of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub pages_scraped: i32,
    pub records: Vec<ExtractedRecord>,
}

/// Turns a successful fetch into structured records.
///
/// Field parsing and per-site templates live behind this trait.
#[async_trait]
pub trait RecordExtractor: Send + Sync {
    async fn extract(
        &self,
        job: &ScrapeJob,
        response: &FetchResponse,
    ) -> Result<Extraction, ExtractError>;
}

/// Receives search hits that point at non-domain destinations
/// (video hosts, professional networks, social media).
#[async_trait]
pub trait DestinationHandler: Send + Sync {
    async fn handle(&self, discovery_id: Uuid, kind: DestinationKind, hit: &SearchHit);
}
