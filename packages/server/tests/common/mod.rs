// Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use scrape_core::testing::{MockExtractor, MockFetcher, MockSearcher, MockTransport, RecordingAlertSink};
use scrape_core::{
    DiscoveryPipeline, JobProcessor, MemoryStore, NewScrapeJob, Orchestrator, OrchestratorConfig,
    WebhookDispatcher,
};
use serde_json::Value;
use server_core::server::{build_app, AppState};
use tower::ServiceExt;

/// Defaults with timeouts and backoffs shrunk for tests.
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.worker.fetch_timeout = Duration::from_millis(200);
    config.worker.min_poll_interval = Duration::from_millis(10);
    config.worker.max_poll_interval = Duration::from_millis(20);
    config.discovery.search_retry_base = Duration::from_millis(1);
    config
}

/// In-memory wiring of every component the server hosts.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub searcher: Arc<MockSearcher>,
    pub transport: Arc<MockTransport>,
    pub config: OrchestratorConfig,
    pub webhooks: Arc<WebhookDispatcher<MemoryStore>>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_searcher(MockSearcher::new())
    }

    pub fn with_searcher(searcher: MockSearcher) -> Self {
        Self::build(searcher, MockTransport::new())
    }

    pub fn build(searcher: MockSearcher, transport: MockTransport) -> Self {
        let config = test_config();
        let store = Arc::new(MemoryStore::new());
        let searcher = Arc::new(searcher);
        let transport = Arc::new(transport);

        let pipeline = Arc::new(DiscoveryPipeline::new(
            store.clone(),
            searcher.clone(),
            config.discovery.clone(),
        ));
        let webhooks = Arc::new(WebhookDispatcher::new(
            store.clone(),
            transport.clone(),
            config.webhook.clone(),
        ));
        let orchestrator = Orchestrator::new(store.clone(), pipeline, webhooks.clone());

        Self {
            router: build_app(AppState::new(orchestrator)),
            store,
            searcher,
            transport,
            config,
            webhooks,
        }
    }

    pub fn processor(&self, fetcher: MockFetcher) -> Arc<JobProcessor<MemoryStore>> {
        Arc::new(JobProcessor::new(
            self.store.clone(),
            Arc::new(fetcher),
            Arc::new(MockExtractor::new()),
            Arc::new(RecordingAlertSink::default()),
            self.config.clone(),
        ))
    }

    /// Send one request through the router and decode the JSON body
    /// (`Value::Null` when the body is empty).
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }
}

pub fn job_for(domain: &str) -> NewScrapeJob {
    NewScrapeJob::builder()
        .domain(domain)
        .data_types(vec!["business_info".to_string()])
        .build()
}
