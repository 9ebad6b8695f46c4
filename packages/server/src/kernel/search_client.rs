//! Search service client.
//!
//! `GET {base}/search?q=&mode=&pageno=&limit=` returning
//! `{ query, results: [...], suggestions, answers }`. Server errors and
//! connection failures are reported as `Unavailable` (the discovery pipeline
//! retries those); 4xx responses are `InvalidParameters` and are not retried.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scrape_core::{SearchError, SearchQuery, SearchResponse, Searcher};
use tracing::debug;

pub struct SearchClient {
    base_url: String,
    client: reqwest::Client,
}

impl SearchClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Searcher for SearchClient {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
        let page = query.page.to_string();
        let limit = query.results_per_page.to_string();

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query.query.as_str()),
                ("mode", query.mode.as_str()),
                ("pageno", page.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::InvalidParameters(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            return Err(SearchError::Unavailable(format!("search service returned {}", status)));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Unavailable(format!("invalid search response: {}", e)))?;

        debug!(
            query = %query.query,
            page = query.page,
            results = parsed.results.len(),
            "search page fetched"
        );
        Ok(parsed)
    }
}
