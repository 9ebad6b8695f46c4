//! Fetch capability contract.
//!
//! The core never fetches pages itself. A `Fetcher` is handed a URL and a
//! tier and reports what happened; the escalation engine decides what to do
//! next. Implementations own nothing persistent.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::FetchError;
use crate::types::Tier;

/// One fetch attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub tier: Tier,
    pub timeout: Duration,
}

/// What the fetch capability observed for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status_code: u16,
    pub content: String,
    pub blocked: bool,
    pub captcha_detected: bool,
    pub cost_usd: Decimal,
    pub duration_ms: u64,
}

impl FetchResponse {
    /// A clean 200 response with the given body.
    pub fn ok(content: impl Into<String>, cost_usd: Decimal) -> Self {
        Self {
            status_code: 200,
            content: content.into(),
            blocked: false,
            captcha_detected: false,
            cost_usd,
            duration_ms: 0,
        }
    }

    /// Set the HTTP status.
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Flag the response as blocked.
    pub fn blocked(mut self) -> Self {
        self.blocked = true;
        self
    }

    /// Flag a captcha or challenge page.
    pub fn with_captcha(mut self) -> Self {
        self.captcha_detected = true;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Fetches one URL at a requested tier.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}
