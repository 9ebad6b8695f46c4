// Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use scrape_core::testing::{
    MockExtractor, MockFetcher, MockSearcher, MockTransport, RecordingAlertSink,
};
use scrape_core::{
    DiscoveryPipeline, FetchResponse, JobProcessor, JobStore, MemoryStore, NewScrapeJob,
    OrchestratorConfig, ScrapeJob, WebhookDispatcher,
};

pub const WORKER: &str = "worker-test";

/// Defaults with timeouts and backoffs shrunk for tests.
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.worker.fetch_timeout = Duration::from_millis(50);
    config.discovery.search_retry_base = Duration::from_millis(1);
    config
}

/// Dollars in units of $0.0001.
pub fn usd(ten_thousandths: i64) -> Decimal {
    Decimal::new(ten_thousandths, 4)
}

/// A response that looks like a 403 block page.
pub fn forbidden(cost: Decimal) -> FetchResponse {
    FetchResponse::ok("Access denied", cost).with_status(403)
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub fetcher: Arc<MockFetcher>,
    pub extractor: Arc<MockExtractor>,
    pub alerts: Arc<RecordingAlertSink>,
    pub config: OrchestratorConfig,
}

impl Harness {
    pub fn new(fetcher: MockFetcher) -> Self {
        Self::with_config(fetcher, test_config())
    }

    pub fn with_config(fetcher: MockFetcher, config: OrchestratorConfig) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(MockExtractor::new()),
            alerts: Arc::new(RecordingAlertSink::default()),
            config,
        }
    }

    pub fn with_extractor(mut self, extractor: MockExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn processor(&self) -> JobProcessor<MemoryStore> {
        JobProcessor::new(
            self.store.clone(),
            self.fetcher.clone(),
            self.extractor.clone(),
            self.alerts.clone(),
            self.config.clone(),
        )
    }

    /// Insert a pending job and claim it as `WORKER`.
    pub async fn claimed(&self, input: NewScrapeJob) -> ScrapeJob {
        let now = Utc::now();
        let job = ScrapeJob::new(input, now);
        self.store.insert_job(&job).await.unwrap();
        let mut claimed = self
            .store
            .claim_jobs(WORKER, 1, now, now + chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1, "expected the inserted job to be claimable");
        claimed.remove(0)
    }

    pub async fn job(&self, id: uuid::Uuid) -> ScrapeJob {
        self.store.get_job(id).await.unwrap().expect("job exists")
    }
}

pub fn job_for(domain: &str) -> NewScrapeJob {
    NewScrapeJob::builder()
        .domain(domain)
        .data_types(vec!["business_info".to_string(), "contacts".to_string()])
        .build()
}

pub fn dispatcher(
    store: Arc<MemoryStore>,
    transport: Arc<MockTransport>,
) -> WebhookDispatcher<MemoryStore> {
    WebhookDispatcher::new(store, transport, test_config().webhook)
}

pub fn pipeline(store: Arc<MemoryStore>, searcher: Arc<MockSearcher>) -> DiscoveryPipeline<MemoryStore> {
    DiscoveryPipeline::new(store, searcher, test_config().discovery)
}

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}
