//! Testing utilities including mock implementations.
//!
//! These are useful for exercising the orchestration core without real
//! fetchers, search engines or webhook receivers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{ExtractError, FetchError, SearchError, TransportError};
use crate::traits::{
    AlertSink, DestinationHandler, ExtractedRecord, Extraction, FetchRequest, FetchResponse,
    Fetcher, RecordExtractor, SearchHit, SearchQuery, SearchResponse, Searcher, WebhookRequest,
    WebhookTransport,
};
use crate::types::{BudgetAlert, DestinationKind, ScrapeJob, Tier};

/// A page body long enough to pass the minimum content check.
pub fn sample_page() -> String {
    format!("<html><body>{}</body></html>", "Acme Plumbing, 612-555-0100. ".repeat(20))
}

/// A mock fetcher with scripted outcomes.
///
/// Scripted outcomes are consumed in order; once exhausted, the per-tier
/// default applies, then a clean page costing the tier's default estimate.
#[derive(Default)]
pub struct MockFetcher {
    script: Arc<RwLock<VecDeque<Result<FetchResponse, FetchError>>>>,
    per_tier: Arc<RwLock<HashMap<Tier, FetchResponse>>>,
    delay: Option<Duration>,
    requests: Arc<RwLock<Vec<FetchRequest>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next outcome.
    pub fn then(self, outcome: Result<FetchResponse, FetchError>) -> Self {
        self.script.write().unwrap().push_back(outcome);
        self
    }

    /// Queue a response.
    pub fn then_respond(self, response: FetchResponse) -> Self {
        self.then(Ok(response))
    }

    /// Always answer `tier` with `response` once the script is empty.
    pub fn with_tier_response(self, tier: Tier, response: FetchResponse) -> Self {
        self.per_tier.write().unwrap().insert(tier, response);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.read().unwrap().clone()
    }

    /// Tiers requested, in order.
    pub fn tiers(&self) -> Vec<Tier> {
        self.requests().into_iter().map(|r| r.tier).collect()
    }
}

fn default_cost(tier: Tier) -> Decimal {
    crate::config::EscalationConfig::default().estimated_cost(tier)
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests.write().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(outcome) = self.script.write().unwrap().pop_front() {
            return outcome;
        }
        if let Some(response) = self.per_tier.read().unwrap().get(&request.tier) {
            return Ok(response.clone());
        }
        Ok(FetchResponse::ok(sample_page(), default_cost(request.tier)))
    }
}

/// A mock searcher serving fixed pages.
#[derive(Default)]
pub struct MockSearcher {
    pages: Arc<RwLock<HashMap<u32, Vec<SearchHit>>>>,
    failures: Arc<RwLock<VecDeque<SearchError>>>,
    always_fail: Option<SearchError>,
    queries: Arc<RwLock<Vec<SearchQuery>>>,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `hits` for 1-based page `page`. Unset pages are empty.
    pub fn with_page(self, page: u32, hits: Vec<SearchHit>) -> Self {
        self.pages.write().unwrap().insert(page, hits);
        self
    }

    /// Fail the next call with `error`, then behave normally.
    pub fn failing_once(self, error: SearchError) -> Self {
        self.failures.write().unwrap().push_back(error);
        self
    }

    /// Fail every call.
    pub fn always_failing(mut self, error: SearchError) -> Self {
        self.always_fail = Some(error);
        self
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.read().unwrap().clone()
    }
}

#[async_trait]
impl Searcher for MockSearcher {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        self.queries.write().unwrap().push(query.clone());
        if let Some(error) = &self.always_fail {
            return Err(error.clone());
        }
        if let Some(error) = self.failures.write().unwrap().pop_front() {
            return Err(error);
        }
        let results = self
            .pages
            .read()
            .unwrap()
            .get(&query.page)
            .cloned()
            .unwrap_or_default();
        Ok(SearchResponse {
            results,
            ..Default::default()
        })
    }
}

/// A mock extractor producing one record per requested data type.
#[derive(Default)]
pub struct MockExtractor {
    fail_with: Option<String>,
    calls: Arc<RwLock<Vec<Uuid>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.fail_with = Some(reason.into());
        self
    }

    /// Job ids extraction ran for.
    pub fn calls(&self) -> Vec<Uuid> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl RecordExtractor for MockExtractor {
    async fn extract(
        &self,
        job: &ScrapeJob,
        _response: &FetchResponse,
    ) -> Result<Extraction, ExtractError> {
        self.calls.write().unwrap().push(job.id);
        if let Some(reason) = &self.fail_with {
            return Err(ExtractError(reason.clone()));
        }
        Ok(Extraction {
            pages_scraped: 1,
            records: job
                .data_types
                .iter()
                .map(|data_type| ExtractedRecord {
                    data_type: data_type.clone(),
                    source_url: job.target_url(),
                    title: Some(job.domain.clone()),
                    payload: serde_json::json!({ "domain": job.domain }),
                })
                .collect(),
        })
    }
}

/// A mock webhook transport answering with scripted status codes.
///
/// Answers 200 once the script is exhausted.
#[derive(Default)]
pub struct MockTransport {
    script: Arc<RwLock<VecDeque<Result<u16, TransportError>>>>,
    requests: Arc<RwLock<Vec<WebhookRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, outcome: Result<u16, TransportError>) -> Self {
        self.script.write().unwrap().push_back(outcome);
        self
    }

    /// Answer the next `n` requests with `status`.
    pub fn then_status(self, status: u16, n: usize) -> Self {
        for _ in 0..n {
            self.script.write().unwrap().push_back(Ok(status));
        }
        self
    }

    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.read().unwrap().clone()
    }
}

#[async_trait]
impl WebhookTransport for MockTransport {
    async fn post(&self, request: &WebhookRequest) -> Result<u16, TransportError> {
        self.requests.write().unwrap().push(request.clone());
        self.script.write().unwrap().pop_front().unwrap_or(Ok(200))
    }
}

/// Alert sink that keeps every alert for assertions.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: RwLock<Vec<BudgetAlert>>,
}

impl RecordingAlertSink {
    pub fn alerts(&self) -> Vec<BudgetAlert> {
        self.alerts.read().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn alert(&self, alert: &BudgetAlert) {
        self.alerts.write().unwrap().push(alert.clone());
    }
}

/// Destination handler that keeps every routed hit.
#[derive(Default)]
pub struct RecordingDestinationHandler {
    routed: RwLock<Vec<(Uuid, DestinationKind, String)>>,
}

impl RecordingDestinationHandler {
    pub fn routed(&self) -> Vec<(Uuid, DestinationKind, String)> {
        self.routed.read().unwrap().clone()
    }
}

#[async_trait]
impl DestinationHandler for RecordingDestinationHandler {
    async fn handle(&self, discovery_id: Uuid, kind: DestinationKind, hit: &SearchHit) {
        self.routed
            .write()
            .unwrap()
            .push((discovery_id, kind, hit.url.clone()));
    }
}
