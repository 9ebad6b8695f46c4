//! Integration tests for the discovery pipeline.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use scrape_core::discovery::{SKIP_DOMAIN_CAP, SKIP_RECENTLY_SCRAPED};
use scrape_core::testing::{MockFetcher, MockSearcher, RecordingDestinationHandler};
use scrape_core::{
    DestinationKind, DiscoveryPipeline, DiscoveryStatus, DiscoveryStore, JobStatus, JobStore,
    LinkStatus, MemoryStore, MetadataStore, MetadataUpdate, NewDiscovery, SearchError, SearchHit,
    SearchParams, Tier,
};

use crate::common::{at, pipeline, test_config, Harness, WORKER};

fn discovery(query: &str) -> NewDiscovery {
    NewDiscovery::builder()
        .query(query)
        .data_types(vec!["contacts".to_string()])
        .priority(7)
        .build()
}

fn hit(url: &str, score: f64) -> SearchHit {
    SearchHit::new(url).with_score(score).with_title(url)
}

#[tokio::test]
async fn test_spawns_one_job_per_unique_domain() {
    let store = Arc::new(MemoryStore::new());
    let searcher = Arc::new(MockSearcher::new().with_page(
        1,
        vec![
            hit("https://a.com/x", 0.9),
            hit("https://www.a.com/y", 0.5),
            hit("https://b.com", 0.7),
        ],
    ));
    let now = at("2026-03-02T10:00:00Z");

    let result = pipeline(store.clone(), searcher.clone())
        .run_discovery(discovery("plumbers in denver"), now)
        .await
        .unwrap();

    assert_eq!(result.status, DiscoveryStatus::Scraping);
    assert_eq!(result.domains_found, 2);
    assert_eq!(result.domains_skipped, 0);
    assert_eq!(result.raw_results.as_ref().unwrap().as_array().unwrap().len(), 3);

    let links = store.links_for_discovery(result.id).await.unwrap();
    let a = links.iter().find(|l| l.domain == "a.com").unwrap();
    assert_eq!(a.source_url, "https://a.com/x");
    assert_eq!(a.relevance_score, Some(0.9));
    assert_eq!(a.status, LinkStatus::Pending);

    let jobs = store.jobs_for_discovery(result.id).unwrap();
    assert_eq!(jobs.len(), 2);
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.priority, 7);
        assert_eq!(job.data_types, vec!["contacts".to_string()]);
        assert!(links.iter().any(|l| l.scrape_job_id == Some(job.id)));
    }

    // A short first page means there is nothing further to ask for.
    assert_eq!(searcher.queries().len(), 1);
}

#[tokio::test]
async fn test_full_pages_fetch_up_to_requested_count() {
    let store = Arc::new(MemoryStore::new());
    let page = |n: u32| {
        (0..2)
            .map(|i| hit(&format!("https://site{}-{}.com", n, i), 0.5))
            .collect::<Vec<_>>()
    };
    let searcher = Arc::new(
        MockSearcher::new()
            .with_page(1, page(1))
            .with_page(2, page(2))
            .with_page(3, page(3)),
    );
    let input = NewDiscovery::builder()
        .query("roofers")
        .data_types(vec!["contacts".to_string()])
        .params(SearchParams {
            search_pages: 2,
            results_per_page: 2,
            ..Default::default()
        })
        .build();

    let result = pipeline(store.clone(), searcher.clone())
        .run_discovery(input, Utc::now())
        .await
        .unwrap();

    let pages: Vec<u32> = searcher.queries().iter().map(|q| q.page).collect();
    assert_eq!(pages, vec![1, 2]);
    assert_eq!(result.domains_found, 4);
}

#[tokio::test]
async fn test_recently_scraped_domains_are_skipped_with_reason() {
    let store = Arc::new(MemoryStore::new());
    let now = at("2026-03-02T10:00:00Z");
    store
        .update_metadata(
            "fresh.com",
            &MetadataUpdate::Succeeded {
                tier: Tier::PlainRequest,
                cost_usd: common::usd(1),
            },
            0.2,
            now - Duration::days(2),
        )
        .await
        .unwrap();
    store
        .update_metadata("stale.com", &MetadataUpdate::Failed, 0.2, now - Duration::days(30))
        .await
        .unwrap();
    let searcher = Arc::new(MockSearcher::new().with_page(
        1,
        vec![hit("https://fresh.com", 0.9), hit("https://stale.com", 0.8)],
    ));

    let result = pipeline(store.clone(), searcher)
        .run_discovery(discovery("dentists"), now)
        .await
        .unwrap();

    assert_eq!(result.domains_found, 2);
    assert_eq!(result.domains_skipped, 1);
    let links = store.links_for_discovery(result.id).await.unwrap();
    let fresh = links.iter().find(|l| l.domain == "fresh.com").unwrap();
    assert_eq!(fresh.status, LinkStatus::Skipped);
    assert_eq!(fresh.skip_reason.as_deref(), Some(SKIP_RECENTLY_SCRAPED));
    assert!(fresh.scrape_job_id.is_none());

    let jobs = store.jobs_for_discovery(result.id).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].domain, "stale.com");
}

#[tokio::test]
async fn test_domain_cap_limits_spawned_jobs() {
    let store = Arc::new(MemoryStore::new());
    let hits = (0..5)
        .map(|i| hit(&format!("https://shop{}.com", i), 1.0 - i as f64 / 10.0))
        .collect();
    let searcher = Arc::new(MockSearcher::new().with_page(1, hits));
    let mut config = test_config().discovery;
    config.max_domains_per_query = 3;

    let result = DiscoveryPipeline::new(store.clone(), searcher, config)
        .run_discovery(discovery("bike shops"), Utc::now())
        .await
        .unwrap();

    assert_eq!(store.jobs_for_discovery(result.id).unwrap().len(), 3);
    assert_eq!(result.domains_skipped, 2);
    let capped: Vec<_> = store
        .links_for_discovery(result.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.skip_reason.as_deref() == Some(SKIP_DOMAIN_CAP))
        .map(|l| l.domain)
        .collect();
    assert_eq!(capped, vec!["shop3.com".to_string(), "shop4.com".to_string()]);
}

#[tokio::test]
async fn test_social_and_video_hits_are_routed_not_scraped() {
    let store = Arc::new(MemoryStore::new());
    let handler = Arc::new(RecordingDestinationHandler::default());
    let searcher = Arc::new(MockSearcher::new().with_page(
        1,
        vec![
            hit("https://www.youtube.com/watch?v=1", 0.9),
            hit("https://www.linkedin.com/company/acme", 0.8),
            hit("https://acme.com", 0.7),
        ],
    ));

    let result = pipeline(store.clone(), searcher)
        .with_destination_handler(handler.clone())
        .run_discovery(discovery("acme"), Utc::now())
        .await
        .unwrap();

    let kinds: Vec<DestinationKind> = handler.routed().iter().map(|(_, kind, _)| *kind).collect();
    assert_eq!(kinds, vec![DestinationKind::Video, DestinationKind::ProfessionalNetwork]);
    assert!(handler.routed().iter().all(|(id, _, _)| *id == result.id));

    let jobs = store.jobs_for_discovery(result.id).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].domain, "acme.com");
    assert_eq!(result.domains_skipped, 2);
}

#[tokio::test]
async fn test_search_failure_marks_discovery_failed_without_jobs() {
    let store = Arc::new(MemoryStore::new());
    let searcher = Arc::new(
        MockSearcher::new().always_failing(SearchError::InvalidParameters("bad mode".into())),
    );

    let result = pipeline(store.clone(), searcher.clone())
        .run_discovery(discovery("anything"), Utc::now())
        .await
        .unwrap();

    assert_eq!(result.status, DiscoveryStatus::Failed);
    assert!(result.error_message.unwrap().contains("bad mode"));
    assert!(result.completed_at.is_some());
    assert_eq!(store.job_count().unwrap(), 0);
    // Not retryable: one call only.
    assert_eq!(searcher.queries().len(), 1);
}

#[tokio::test]
async fn test_unavailable_search_is_retried() {
    let store = Arc::new(MemoryStore::new());
    let searcher = Arc::new(
        MockSearcher::new()
            .failing_once(SearchError::Unavailable("503".into()))
            .with_page(1, vec![hit("https://a.com", 0.5)]),
    );

    let result = pipeline(store.clone(), searcher.clone())
        .run_discovery(discovery("anything"), Utc::now())
        .await
        .unwrap();

    assert_eq!(result.status, DiscoveryStatus::Scraping);
    assert_eq!(searcher.queries().len(), 2);
}

#[tokio::test]
async fn test_no_new_domains_completes_immediately() {
    let store = Arc::new(MemoryStore::new());
    let searcher = Arc::new(MockSearcher::new());

    let result = pipeline(store.clone(), searcher)
        .run_discovery(discovery("nothing matches"), Utc::now())
        .await
        .unwrap();

    assert_eq!(result.status, DiscoveryStatus::Completed);
    assert_eq!(result.domains_found, 0);
}

#[tokio::test]
async fn test_discovery_completes_when_children_finish_and_rolls_up_cost() {
    let harness = Harness::new(MockFetcher::new());
    let searcher = Arc::new(MockSearcher::new().with_page(
        1,
        vec![hit("https://a.com", 0.9), hit("https://b.com", 0.8)],
    ));
    let now = Utc::now();

    let result = pipeline(harness.store.clone(), searcher)
        .run_discovery(discovery("hvac"), now)
        .await
        .unwrap();

    let claimed = harness
        .store
        .claim_jobs(WORKER, 10, now, now + Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 2);
    let links = harness.store.links_for_discovery(result.id).await.unwrap();
    assert!(links.iter().all(|l| l.status == LinkStatus::Scraping));

    let processor = harness.processor();
    processor.process(&claimed[0]).await.unwrap();
    let halfway = harness.store.get_discovery(result.id).await.unwrap().unwrap();
    assert_eq!(halfway.status, DiscoveryStatus::Scraping);

    processor.process(&claimed[1]).await.unwrap();
    let done = harness.store.get_discovery(result.id).await.unwrap().unwrap();
    assert_eq!(done.status, DiscoveryStatus::Completed);
    assert_eq!(done.total_cost_usd, common::usd(2));
    let links = harness.store.links_for_discovery(result.id).await.unwrap();
    assert!(links.iter().all(|l| l.status == LinkStatus::Completed));
}
