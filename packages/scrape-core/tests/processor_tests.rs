//! Integration tests for the per-job escalation loop.
//!
//! Covers tier escalation, cost accounting, budget stops, domain feedback,
//! redelivery and the webhook outbox, all against MemoryStore.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use scrape_core::testing::{MockExtractor, MockFetcher};
use scrape_core::{
    BudgetCeilings, BudgetScope, BudgetWindow, FetchError, FetchResponse, JobProcessor, JobStatus,
    JobStore, MemoryStore, MetadataStore, MetadataUpdate, NewScrapeJob, Signal, Tier,
    WebhookPayload, MANUAL_REVIEW_REQUIRED,
};

use crate::common::{forbidden, job_for, usd, Harness, WORKER};

// =============================================================================
// Escalation
// =============================================================================

#[tokio::test]
async fn test_clean_fetch_completes_at_cheapest_tier() {
    let harness = Harness::new(MockFetcher::new());
    let job = harness.claimed(job_for("acme-plumbing.com")).await;

    let report = harness.processor().process(&job).await.unwrap();

    assert!(report.transitioned);
    assert_eq!(report.outcome.status, JobStatus::Completed);
    assert_eq!(report.outcome.strategy_used, Some(Tier::PlainRequest));
    assert_eq!(report.outcome.cost_usd, usd(1));
    assert_eq!(harness.fetcher.tiers(), vec![Tier::PlainRequest]);

    let stored = harness.job(job.id).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.cost_usd, Some(usd(1)));
    assert_eq!(stored.pages_scraped, Some(1));
    assert!(stored.worker_id.is_none());

    let records = harness.store.records_for_job(job.id).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(harness.store.published_records().unwrap().len(), 2);

    let meta = harness.store.get_metadata("acme-plumbing.com").await.unwrap().unwrap();
    assert_eq!(meta.last_successful_strategy, Some(Tier::PlainRequest));
    assert_eq!(meta.success_count, 1);
    assert!(meta.last_scraped_at.is_some());
}

#[tokio::test]
async fn test_forbidden_escalates_and_total_cost_sums_attempts() {
    let fetcher = MockFetcher::new()
        .then_respond(forbidden(usd(1)))
        .then_respond(FetchResponse::ok(scrape_core::testing::sample_page(), usd(20)));
    let harness = Harness::new(fetcher);
    let job = harness.claimed(job_for("example.com")).await;

    let report = harness.processor().process(&job).await.unwrap();

    assert_eq!(harness.fetcher.tiers(), vec![Tier::PlainRequest, Tier::RenderedBrowser]);
    assert_eq!(report.outcome.status, JobStatus::Completed);
    assert_eq!(report.outcome.strategy_used, Some(Tier::RenderedBrowser));

    let attempt_sum: rust_decimal::Decimal = report.attempts.iter().map(|a| a.cost_usd).sum();
    assert_eq!(report.outcome.cost_usd, attempt_sum);
    assert_eq!(report.outcome.cost_usd, usd(21));

    // The block is recorded, then cleared by the success.
    let meta = harness.store.get_metadata("example.com").await.unwrap().unwrap();
    assert_eq!(meta.block_count, 0);
    assert_eq!(meta.last_successful_strategy, Some(Tier::RenderedBrowser));
}

#[tokio::test]
async fn test_blocked_at_every_tier_fails_for_manual_review() {
    let fetcher = MockFetcher::new()
        .with_tier_response(Tier::PlainRequest, forbidden(usd(1)))
        .with_tier_response(Tier::RenderedBrowser, forbidden(usd(20)))
        .with_tier_response(Tier::ResidentialProxy, forbidden(usd(40)));
    let harness = Harness::new(fetcher);
    let job = harness.claimed(job_for("fortress.example")).await;

    let report = harness.processor().process(&job).await.unwrap();

    assert_eq!(report.outcome.status, JobStatus::Failed);
    assert_eq!(report.outcome.error_message.as_deref(), Some(MANUAL_REVIEW_REQUIRED));
    assert_eq!(report.outcome.strategy_used, Some(Tier::ResidentialProxy));
    assert_eq!(report.outcome.cost_usd, usd(61));
    assert_eq!(
        harness.fetcher.tiers(),
        vec![Tier::PlainRequest, Tier::RenderedBrowser, Tier::ResidentialProxy]
    );

    let meta = harness.store.get_metadata("fortress.example").await.unwrap().unwrap();
    assert_eq!(meta.block_count, 3);
    assert_eq!(meta.success_rate, 0.0);
}

#[tokio::test]
async fn test_captcha_jumps_to_most_capable_tier() {
    let fetcher = MockFetcher::new().then_respond(
        FetchResponse::ok(scrape_core::testing::sample_page(), usd(1)).with_captcha(),
    );
    let harness = Harness::new(fetcher);
    let job = harness.claimed(job_for("example.com")).await;

    let report = harness.processor().process(&job).await.unwrap();

    assert_eq!(harness.fetcher.tiers(), vec![Tier::PlainRequest, Tier::ResidentialProxy]);
    assert_eq!(report.attempts[0].signal, Signal::Captcha);
    assert_eq!(report.outcome.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_not_found_fails_without_escalating() {
    let fetcher = MockFetcher::new()
        .then_respond(FetchResponse::ok("gone", usd(1)).with_status(404));
    let harness = Harness::new(fetcher);
    let job = harness.claimed(job_for("example.com")).await;

    let report = harness.processor().process(&job).await.unwrap();

    assert_eq!(harness.fetcher.tiers(), vec![Tier::PlainRequest]);
    assert_eq!(report.outcome.status, JobStatus::Failed);
    assert_eq!(report.outcome.error_message.as_deref(), Some("http 404"));
}

#[tokio::test]
async fn test_timeouts_escalate_like_blocks() {
    let fetcher = MockFetcher::new().with_delay(std::time::Duration::from_millis(500));
    let harness = Harness::new(fetcher);
    let job = harness.claimed(job_for("slow.example")).await;

    let report = harness.processor().process(&job).await.unwrap();

    assert_eq!(report.attempts.len(), 3);
    assert!(report
        .attempts
        .iter()
        .all(|a| matches!(a.signal, Signal::Transient(_))));
    assert_eq!(report.outcome.status, JobStatus::Failed);
    assert_eq!(report.outcome.error_message.as_deref(), Some(MANUAL_REVIEW_REQUIRED));
    assert_eq!(report.outcome.cost_usd, usd(0));
}

#[tokio::test]
async fn test_transport_error_escalates() {
    let fetcher = MockFetcher::new().then(Err(FetchError::Transport("connection reset".into())));
    let harness = Harness::new(fetcher);
    let job = harness.claimed(job_for("example.com")).await;

    let report = harness.processor().process(&job).await.unwrap();

    assert_eq!(harness.fetcher.tiers(), vec![Tier::PlainRequest, Tier::RenderedBrowser]);
    assert_eq!(report.outcome.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_escalation_is_deterministic_for_same_inputs() {
    let script = || {
        MockFetcher::new()
            .then_respond(forbidden(usd(1)))
            .then_respond(FetchResponse::ok("short", usd(20)))
    };

    let mut runs = Vec::new();
    for _ in 0..2 {
        let harness = Harness::new(script());
        let job = harness.claimed(job_for("example.com")).await;
        let report = harness.processor().process(&job).await.unwrap();
        runs.push((harness.fetcher.tiers(), report.outcome.status, report.outcome.cost_usd));
    }

    assert_eq!(runs[0], runs[1]);
}

// =============================================================================
// Domain feedback
// =============================================================================

#[tokio::test]
async fn test_repeatedly_blocked_domain_starts_at_rendered_browser() {
    let harness = Harness::new(MockFetcher::new());
    for _ in 0..3 {
        harness
            .store
            .update_metadata("walled.example", &MetadataUpdate::Blocked, 0.2, Utc::now())
            .await
            .unwrap();
    }
    let job = harness.claimed(job_for("walled.example")).await;

    harness.processor().process(&job).await.unwrap();

    assert_eq!(harness.fetcher.tiers(), vec![Tier::RenderedBrowser]);
}

#[tokio::test]
async fn test_last_successful_tier_is_reused() {
    let harness = Harness::new(MockFetcher::new());
    harness
        .store
        .update_metadata(
            "example.com",
            &MetadataUpdate::Succeeded {
                tier: Tier::ResidentialProxy,
                cost_usd: usd(40),
            },
            0.2,
            Utc::now(),
        )
        .await
        .unwrap();
    let job = harness.claimed(job_for("example.com")).await;

    harness.processor().process(&job).await.unwrap();

    assert_eq!(harness.fetcher.tiers(), vec![Tier::ResidentialProxy]);
}

// =============================================================================
// Budgets
// =============================================================================

#[tokio::test]
async fn test_budget_stops_escalation_before_next_attempt() {
    let fetcher = MockFetcher::new()
        .then_respond(forbidden(usd(1)))
        .then_respond(forbidden(usd(20)));
    let harness = Harness::new(fetcher);
    let input = NewScrapeJob::builder()
        .domain("pricey.example")
        .data_types(vec!["business_info".to_string()])
        .budget(BudgetCeilings {
            domain_daily_usd: Some(usd(30)),
            ..Default::default()
        })
        .build();
    let job = harness.claimed(input).await;

    let report = harness.processor().process(&job).await.unwrap();

    // The proxy estimate ($0.004) would take $0.0021 past $0.003.
    assert_eq!(harness.fetcher.tiers(), vec![Tier::PlainRequest, Tier::RenderedBrowser]);
    assert_eq!(report.outcome.status, JobStatus::Failed);
    assert!(report
        .outcome
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("budget exceeded"));
    assert_eq!(report.outcome.cost_usd, usd(21));
}

#[tokio::test]
async fn test_exhausted_budget_denies_first_attempt() {
    let mut config = common::test_config();
    config.budget.default_ceilings.domain_daily_usd = Some(usd(1));
    let harness = Harness::with_config(MockFetcher::new(), config);

    let first = harness.claimed(job_for("example.com")).await;
    let report = harness.processor().process(&first).await.unwrap();
    assert_eq!(report.outcome.status, JobStatus::Completed);

    let second = harness.claimed(job_for("example.com")).await;
    let report = harness.processor().process(&second).await.unwrap();
    assert_eq!(report.outcome.status, JobStatus::Failed);
    assert!(report.attempts.is_empty());
    assert_eq!(harness.fetcher.tiers().len(), 1);

    // Spend hit the ceiling exactly once: one warning and one exceeded alert.
    let levels: Vec<_> = harness.alerts.alerts().iter().map(|a| a.level).collect();
    assert_eq!(levels.len(), 2);
}

// =============================================================================
// Redelivery and terminal writes
// =============================================================================

#[tokio::test]
async fn test_redelivered_job_overwrites_cost_instead_of_adding() {
    let harness = Harness::new(MockFetcher::new());
    let job = harness.claimed(job_for("example.com")).await;
    let processor = harness.processor();

    let first = processor.process(&job).await.unwrap();
    assert!(first.transitioned);

    // A second delivery of the same job (e.g. after a lost ack) re-runs in full.
    let second = processor.process(&job).await.unwrap();
    assert!(!second.transitioned);

    let spent = processor
        .costs()
        .window_spend(BudgetScope::Domain, "example.com", BudgetWindow::Daily, Utc::now())
        .await
        .unwrap();
    assert_eq!(spent, usd(1));
    assert_eq!(harness.store.records_for_job(job.id).await.unwrap().len(), 2);
    assert_eq!(harness.job(job.id).await.status, JobStatus::Completed);

    // Only the delivery that finished the job feeds back and publishes.
    let meta = harness.store.get_metadata("example.com").await.unwrap().unwrap();
    assert_eq!(meta.success_count, 1);
    assert_eq!(meta.avg_cost_usd, usd(1));
    assert_eq!(harness.store.published_records().unwrap().len(), 2);
}

async fn daily_spend(processor: &JobProcessor<MemoryStore>) -> rust_decimal::Decimal {
    processor
        .costs()
        .window_spend(BudgetScope::Domain, "example.com", BudgetWindow::Daily, Utc::now())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_crashed_delivery_is_redelivered_and_cost_overwritten() {
    let fetcher = MockFetcher::new()
        .then_respond(forbidden(usd(1)))
        .then_respond(FetchResponse::ok(scrape_core::testing::sample_page(), usd(20)));
    let harness = Harness::new(fetcher);
    let job = harness.claimed(job_for("example.com")).await;

    // First delivery: one blocked attempt is charged, then the worker dies
    // while the second fetch is in flight.
    let mut slow_config = common::test_config();
    slow_config.worker.fetch_timeout = Duration::from_secs(5);
    let crashing = JobProcessor::new(
        harness.store.clone(),
        Arc::new(
            MockFetcher::new()
                .then_respond(forbidden(usd(1)))
                .with_delay(Duration::from_millis(200)),
        ),
        harness.extractor.clone(),
        harness.alerts.clone(),
        slow_config,
    );
    let crashed = tokio::time::timeout(Duration::from_millis(300), crashing.process(&job)).await;
    assert!(crashed.is_err());

    let processor = harness.processor();
    assert_eq!(daily_spend(&processor).await, usd(1));
    assert_eq!(harness.job(job.id).await.status, JobStatus::Running);

    // Second delivery under a new lease runs to completion.
    let later = Utc::now() + chrono::Duration::minutes(10);
    let mut redelivered = harness
        .store
        .claim_jobs("worker-2", 1, later, later + chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(redelivered.len(), 1);
    let redelivered = redelivered.remove(0);
    assert_eq!(redelivered.delivery_count, 2);

    let report = processor.process(&redelivered).await.unwrap();
    assert!(report.transitioned);
    assert_eq!(report.outcome.cost_usd, usd(21));

    let stored = harness.job(job.id).await;
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.cost_usd, Some(usd(21)));
    assert_eq!(daily_spend(&processor).await, usd(21));

    // The job is terminal; nothing can finish it a second time.
    assert!(!processor.abandon(&redelivered).await.unwrap());
    assert_eq!(harness.job(job.id).await.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_expired_lease_is_redelivered_with_higher_delivery_count() {
    let harness = Harness::new(MockFetcher::new());
    let job = harness.claimed(job_for("example.com")).await;
    assert_eq!(job.delivery_count, 1);

    // The worker dies; once the lease lapses another worker picks it up.
    let later = Utc::now() + chrono::Duration::minutes(10);
    let redelivered = harness
        .store
        .claim_jobs("worker-2", 10, later, later + chrono::Duration::minutes(5))
        .await
        .unwrap();

    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].id, job.id);
    assert_eq!(redelivered[0].delivery_count, 2);
    assert_eq!(redelivered[0].status, JobStatus::Running);
    assert_eq!(redelivered[0].worker_id.as_deref(), Some("worker-2"));

    // The original worker can no longer heartbeat its lost lease.
    assert!(!harness
        .store
        .extend_lease(job.id, WORKER, later + chrono::Duration::minutes(5))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_abandon_fails_over_delivered_job() {
    let harness = Harness::new(MockFetcher::new());
    let mut job = harness.claimed(job_for("example.com")).await;
    job.delivery_count = 6;

    let transitioned = harness.processor().abandon(&job).await.unwrap();

    assert!(transitioned);
    let stored = harness.job(job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("abandoned after 5 deliveries"));
    assert!(harness.fetcher.tiers().is_empty());
}

#[tokio::test]
async fn test_abandoned_job_keeps_cost_of_earlier_deliveries() {
    let harness = Harness::new(MockFetcher::new());
    let mut job = harness.claimed(job_for("example.com")).await;
    let processor = harness.processor();

    // Earlier deliveries charged $0.0021 before dying.
    processor
        .costs()
        .record_cost(job.id, "example.com", None, &job.budget, usd(21), Utc::now())
        .await
        .unwrap();
    job.delivery_count = 6;

    assert!(processor.abandon(&job).await.unwrap());

    let stored = harness.job(job.id).await;
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.cost_usd, Some(usd(21)));
    assert_eq!(daily_spend(&processor).await, usd(21));
}

#[tokio::test]
async fn test_extraction_failure_fails_job_with_reason() {
    let harness = Harness::new(MockFetcher::new()).with_extractor(MockExtractor::new().failing("no parser"));
    let job = harness.claimed(job_for("example.com")).await;

    let report = harness.processor().process(&job).await.unwrap();

    assert_eq!(report.outcome.status, JobStatus::Failed);
    assert_eq!(report.outcome.strategy_used, Some(Tier::PlainRequest));
    assert_eq!(
        report.outcome.error_message.as_deref(),
        Some("extraction failed: no parser")
    );
}

// =============================================================================
// Webhook outbox
// =============================================================================

#[tokio::test]
async fn test_callback_job_enqueues_delivery_with_terminal_write() {
    let harness = Harness::new(MockFetcher::new());
    let input = NewScrapeJob::builder()
        .domain("example.com")
        .data_types(vec!["business_info".to_string()])
        .callback_url("https://hooks.example.net/scrapes")
        .build();
    let job = harness.claimed(input).await;

    harness.processor().process(&job).await.unwrap();

    let queued = harness.store.queued_deliveries().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].job_id, job.id);
    assert_eq!(queued[0].url, "https://hooks.example.net/scrapes");

    let payload: WebhookPayload = serde_json::from_value(queued[0].payload.clone()).unwrap();
    assert_eq!(payload.event, WebhookPayload::EVENT);
    assert_eq!(payload.status, JobStatus::Completed);
    assert_eq!(payload.result_summary.total_records, 1);
    assert_eq!(payload.result_summary.records_by_type["business_info"], 1);
}

#[tokio::test]
async fn test_job_without_callback_enqueues_nothing() {
    let harness = Harness::new(MockFetcher::new());
    let job = harness.claimed(job_for("example.com")).await;

    harness.processor().process(&job).await.unwrap();

    assert!(harness.store.queued_deliveries().unwrap().is_empty());
}
