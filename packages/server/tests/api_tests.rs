//! HTTP API tests against the in-memory store.

mod common;

use axum::http::StatusCode;
use scrape_core::testing::MockSearcher;
use scrape_core::SearchHit;
use serde_json::json;
use uuid::Uuid;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_reports_healthy_store() {
    let app = TestApp::new();

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["status"], "ok");
}

#[tokio::test]
async fn test_submit_scrape_then_read_status() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/scrape",
            json!({
                "domain": "https://www.Acme.com/about",
                "data_types": ["business_info", "contacts"],
                "priority": 8,
                "callback_url": "https://hooks.example.net/scrapes"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, job) = app.get(&format!("/jobs/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["domain"], "acme.com");
    assert_eq!(job["status"], "pending");
    assert_eq!(job["priority"], 8);
    assert_eq!(job["max_pages"], 50);

    let (status, records) = app.get(&format!("/jobs/{}/records", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records, json!([]));
}

#[tokio::test]
async fn test_submit_scrape_rejects_out_of_range_priority() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/scrape",
            json!({ "domain": "acme.com", "data_types": ["contacts"], "priority": 11 }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid input: priority must be between 1 and 10");
    assert_eq!(app.store.job_count().unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app.get(&format!("/jobs/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().starts_with("scrape job not found"));

    let (status, _) = app.get(&format!("/jobs/{}/records", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_discover_spawns_child_jobs() {
    let searcher = MockSearcher::new().with_page(
        1,
        vec![
            SearchHit::new("https://a.com/contact").with_score(0.9),
            SearchHit::new("https://www.b.com/").with_score(0.5),
        ],
    );
    let app = TestApp::with_searcher(searcher);

    let (status, discovery) = app
        .post(
            "/discover",
            json!({ "query": "plumbers in denver", "data_types": ["contacts"] }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(discovery["status"], "scraping");
    let id = discovery["id"].as_str().unwrap().to_string();

    let (status, view) = app.get(&format!("/discoveries/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["id"].as_str(), Some(id.as_str()));
    assert_eq!(view["domains"].as_array().unwrap().len(), 2);
    assert_eq!(app.store.job_count().unwrap(), 2);
}

#[tokio::test]
async fn test_discover_rejects_bad_search_params() {
    let app = TestApp::new();

    let (status, _) = app
        .post(
            "/discover",
            json!({
                "query": "plumbers",
                "data_types": ["contacts"],
                "params": { "search_pages": 11 }
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.searcher.queries().is_empty());
}

#[tokio::test]
async fn test_tracked_domain_register_and_cancel() {
    let app = TestApp::new();

    let (status, tracked) = app
        .post(
            "/tracked/domains",
            json!({
                "domain": "www.acme.com",
                "data_types": ["business_info"],
                "frequency": "daily",
                "webhook_url": "https://hooks.example.net/tracked"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tracked["domain"], "acme.com");
    assert_eq!(tracked["frequency"], "daily");
    assert_eq!(tracked["is_active"], true);

    let (status, _) = app.delete("/tracked/domains/acme.com").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.delete("/tracked/domains/acme.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tracked_search_register_and_cancel() {
    let app = TestApp::new();

    let (status, tracked) = app
        .post(
            "/tracked/searches",
            json!({ "query": "hvac repair", "data_types": ["contacts"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tracked["frequency"], "weekly");
    let id = tracked["id"].as_str().unwrap().to_string();

    let (status, _) = app.delete(&format!("/tracked/searches/{}", id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.delete(&format!("/tracked/searches/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dead_letters_empty_and_unknown_replay() {
    let app = TestApp::new();

    let (status, body) = app.get("/webhooks/dead-letters?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = app
        .request(
            axum::http::Method::POST,
            &format!("/webhooks/dead-letters/{}/replay", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
