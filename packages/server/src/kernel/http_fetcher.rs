//! HTTP fetcher for the three escalation tiers.
//!
//! - `PlainRequest` is a direct GET from this process.
//! - `RenderedBrowser` and `ResidentialProxy` are delegated to the rendering
//!   service at `FETCH_SERVICE_URL`, which runs the headless browser (and the
//!   proxy pool) and reports back what it saw.
//!
//! The direct tier has no metered cost of its own, so it reports the
//! configured tier estimate. The rendering service reports its own cost and
//! falls back to the estimate when it does not.

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use scrape_core::{EscalationConfig, FetchError, FetchRequest, FetchResponse, Fetcher, Tier};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Markers that identify a challenge page instead of real content.
const CAPTCHA_MARKERS: &[&str] = &[
    "captcha",
    "challenge-form",
    "cf-browser-verification",
    "recaptcha",
    "hcaptcha",
    "turnstile",
];

/// Browser-like User-Agent for the direct tier
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Rendering service request
#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    tier: Tier,
    timeout_ms: u64,
}

/// Rendering service response
#[derive(Debug, Deserialize)]
struct RenderResponse {
    status_code: u16,
    #[serde(default)]
    content: String,
    #[serde(default)]
    blocked: bool,
    #[serde(default)]
    captcha_detected: bool,
    #[serde(default)]
    cost_usd: Option<Decimal>,
}

pub struct HttpFetcher {
    client: reqwest::Client,
    render_url: String,
    costs: EscalationConfig,
}

impl HttpFetcher {
    pub fn new(fetch_service_url: &str, costs: EscalationConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            render_url: format!("{}/render", fetch_service_url.trim_end_matches('/')),
            costs,
        })
    }

    async fn fetch_direct(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let response = self
            .client
            .get(&request.url)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| map_error(e, started))?;

        let status_code = response.status().as_u16();
        let content = response.text().await.map_err(|e| map_error(e, started))?;
        let captcha_detected = detect_captcha(&content);

        Ok(FetchResponse {
            status_code,
            content,
            blocked: false,
            captcha_detected,
            cost_usd: self.costs.estimated_cost(request.tier),
            duration_ms: elapsed_ms(started),
        })
    }

    async fn fetch_rendered(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let started = Instant::now();
        let body = RenderRequest {
            url: &request.url,
            tier: request.tier,
            timeout_ms: request.timeout.as_millis() as u64,
        };

        let response = self
            .client
            .post(&self.render_url)
            .json(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| map_error(e, started))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(FetchError::Transport(format!(
                "rendering service error {}: {}",
                status, text
            )));
        }

        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Transport(format!("invalid rendering response: {}", e)))?;

        Ok(FetchResponse {
            status_code: rendered.status_code,
            captcha_detected: rendered.captcha_detected || detect_captcha(&rendered.content),
            content: rendered.content,
            blocked: rendered.blocked,
            cost_usd: rendered
                .cost_usd
                .unwrap_or_else(|| self.costs.estimated_cost(request.tier)),
            duration_ms: elapsed_ms(started),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        debug!(url = %request.url, tier = %request.tier, "fetching");
        match request.tier {
            Tier::PlainRequest => self.fetch_direct(request).await,
            Tier::RenderedBrowser | Tier::ResidentialProxy => self.fetch_rendered(request).await,
        }
    }
}

fn map_error(error: reqwest::Error, started: Instant) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            elapsed_ms: elapsed_ms(started),
        }
    } else {
        FetchError::Transport(error.to_string())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Case-insensitive scan for challenge-page markers.
pub fn detect_captcha(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    CAPTCHA_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_captcha() {
        assert!(detect_captcha("<div class=\"g-recaptcha\"></div>"));
        assert!(detect_captcha("<form id=\"challenge-form\">"));
        assert!(detect_captcha("Please complete the CAPTCHA"));
        assert!(!detect_captcha("<html><body>Welcome to Acme Plumbing</body></html>"));
    }

    #[test]
    fn test_render_url_is_normalized() {
        let fetcher = HttpFetcher::new("http://render.internal:9000/", EscalationConfig::default()).unwrap();
        assert_eq!(fetcher.render_url, "http://render.internal:9000/render");
    }
}
