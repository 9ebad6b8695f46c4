//! Escalation engine: which tier to try first, and what to do after an attempt.
//!
//! Both decisions are pure functions over explicit enums. Given the same
//! sequence of attempt outcomes the engine always produces the same tiers.
//!
//! ```text
//! select_strategy(metadata) ──► tier
//!                                 │
//!                 fetch(tier) ──► classify ──► Signal
//!                                                │
//!                         should_escalate(tier, signal) ──► Verdict
//!                                                          ├─ Success
//!                                                          ├─ Escalate(next tier)
//!                                                          ├─ Exhausted ("manual review required")
//!                                                          └─ Fail(reason)
//! ```

use crate::config::EscalationConfig;
use crate::error::FetchError;
use crate::traits::FetchResponse;
use crate::types::{DomainMetadata, Tier};

pub const MANUAL_REVIEW_REQUIRED: &str = "manual review required";

/// Classified outcome of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Usable content.
    Ok,
    /// Captcha or challenge page.
    Captcha,
    /// Blocked flag, 403/429/503, or content too short to be real.
    Blocked(String),
    /// Timeout, transport error or other 5xx.
    Transient(String),
    /// A response that no tier will fix (404, 410, other 4xx).
    Fatal(String),
}

impl Signal {
    /// Whether this signal counts against the domain's block count.
    pub fn is_block(&self) -> bool {
        matches!(self, Signal::Captcha | Signal::Blocked(_))
    }
}

/// What the job should do after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Escalate { next: Tier, reason: String },
    /// Already at the most capable tier and still failing.
    Exhausted,
    Fail { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct EscalationEngine {
    config: EscalationConfig,
}

impl EscalationEngine {
    pub fn new(config: EscalationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// First tier for a job against a domain.
    ///
    /// A known last-successful tier is reused while blocks stay below the
    /// threshold. At or above the threshold the cheapest tier is never
    /// chosen: the job starts at the rendered browser or the last
    /// successful tier, whichever is more capable.
    pub fn select_strategy(&self, metadata: Option<&DomainMetadata>) -> Tier {
        let Some(meta) = metadata else {
            return Tier::cheapest();
        };

        if meta.block_count >= self.config.block_threshold {
            let floor = Tier::RenderedBrowser;
            return meta
                .last_successful_strategy
                .map(|tier| tier.max(floor))
                .unwrap_or(floor);
        }

        meta.last_successful_strategy.unwrap_or_else(Tier::cheapest)
    }

    /// Classify an attempt. Captcha wins over every other signal.
    pub fn classify(&self, result: &Result<FetchResponse, FetchError>) -> Signal {
        let response = match result {
            Ok(response) => response,
            Err(e) => return Signal::Transient(e.to_string()),
        };

        if response.captcha_detected {
            return Signal::Captcha;
        }
        if response.blocked {
            return Signal::Blocked("blocked".to_string());
        }

        match response.status_code {
            403 | 429 | 503 => Signal::Blocked(format!("http {}", response.status_code)),
            500..=599 => Signal::Transient(format!("http {}", response.status_code)),
            400..=499 => Signal::Fatal(format!("http {}", response.status_code)),
            _ if response.content.len() < self.config.min_content_length => Signal::Blocked(
                format!("content too short ({} bytes)", response.content.len()),
            ),
            _ => Signal::Ok,
        }
    }

    /// Decide the next step after an attempt at `current`.
    ///
    /// Captcha jumps straight to the proxy tier; every other retryable
    /// signal moves one tier up. Nothing escalates past the top tier.
    pub fn should_escalate(&self, current: Tier, signal: &Signal) -> Verdict {
        match signal {
            Signal::Ok => Verdict::Success,
            Signal::Fatal(reason) => Verdict::Fail {
                reason: reason.clone(),
            },
            Signal::Captcha => {
                if current.is_most_capable() {
                    Verdict::Exhausted
                } else {
                    Verdict::Escalate {
                        next: Tier::most_capable(),
                        reason: "captcha".to_string(),
                    }
                }
            }
            Signal::Blocked(reason) | Signal::Transient(reason) => match current.next() {
                Some(next) => Verdict::Escalate {
                    next,
                    reason: reason.clone(),
                },
                None => Verdict::Exhausted,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn engine() -> EscalationEngine {
        EscalationEngine::default()
    }

    fn page() -> String {
        "<html>".to_string() + &"x".repeat(400) + "</html>"
    }

    fn meta(last: Option<Tier>, blocks: i32) -> DomainMetadata {
        let mut meta = DomainMetadata::empty("example.com", Utc::now());
        meta.last_successful_strategy = last;
        meta.block_count = blocks;
        meta
    }

    #[test]
    fn test_unknown_domain_starts_cheapest() {
        assert_eq!(engine().select_strategy(None), Tier::PlainRequest);
        assert_eq!(engine().select_strategy(Some(&meta(None, 0))), Tier::PlainRequest);
    }

    #[test]
    fn test_reuses_last_successful_tier_while_blocks_are_low() {
        let m = meta(Some(Tier::RenderedBrowser), 1);
        assert_eq!(engine().select_strategy(Some(&m)), Tier::RenderedBrowser);
    }

    #[test]
    fn test_heavily_blocked_domain_never_starts_cheapest() {
        for last in [None, Some(Tier::PlainRequest)] {
            let m = meta(last, 3);
            assert_eq!(engine().select_strategy(Some(&m)), Tier::RenderedBrowser);
        }
        let m = meta(Some(Tier::ResidentialProxy), 7);
        assert_eq!(engine().select_strategy(Some(&m)), Tier::ResidentialProxy);
    }

    #[test]
    fn test_blocked_plain_request_escalates_to_browser() {
        let e = engine();
        let signal = e.classify(&Ok(FetchResponse::ok(page(), Decimal::ZERO).blocked()));
        assert!(signal.is_block());
        assert_eq!(
            e.should_escalate(Tier::PlainRequest, &signal),
            Verdict::Escalate {
                next: Tier::RenderedBrowser,
                reason: "blocked".into()
            }
        );
    }

    #[test]
    fn test_captcha_always_jumps_to_proxy() {
        let e = engine();
        let signal = e.classify(&Ok(FetchResponse::ok(page(), Decimal::ZERO).with_captcha()));
        assert_eq!(signal, Signal::Captcha);
        for tier in [Tier::PlainRequest, Tier::RenderedBrowser] {
            match e.should_escalate(tier, &signal) {
                Verdict::Escalate { next, .. } => assert_eq!(next, Tier::ResidentialProxy),
                other => panic!("expected escalation, got {:?}", other),
            }
        }
        assert_eq!(
            e.should_escalate(Tier::ResidentialProxy, &signal),
            Verdict::Exhausted
        );
    }

    #[test]
    fn test_status_codes_and_short_content() {
        let e = engine();
        for status in [403, 429, 503] {
            let signal = e.classify(&Ok(FetchResponse::ok(page(), Decimal::ZERO).with_status(status)));
            assert!(signal.is_block(), "status {} should block", status);
        }

        let short = e.classify(&Ok(FetchResponse::ok("<html></html>", Decimal::ZERO)));
        assert!(short.is_block());

        let not_found = e.classify(&Ok(FetchResponse::ok(page(), Decimal::ZERO).with_status(404)));
        assert_eq!(
            e.should_escalate(Tier::PlainRequest, &not_found),
            Verdict::Fail {
                reason: "http 404".into()
            }
        );

        let ok = e.classify(&Ok(FetchResponse::ok(page(), Decimal::ZERO)));
        assert_eq!(e.should_escalate(Tier::PlainRequest, &ok), Verdict::Success);
    }

    #[test]
    fn test_timeout_feeds_escalation_like_a_block() {
        let e = engine();
        let signal = e.classify(&Err(FetchError::Timeout { elapsed_ms: 30_000 }));
        assert!(matches!(signal, Signal::Transient(_)));
        assert!(!signal.is_block());
        assert!(matches!(
            e.should_escalate(Tier::RenderedBrowser, &signal),
            Verdict::Escalate {
                next: Tier::ResidentialProxy,
                ..
            }
        ));
        assert_eq!(
            e.should_escalate(Tier::ResidentialProxy, &signal),
            Verdict::Exhausted
        );
    }
}
