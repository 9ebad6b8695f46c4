//! Application setup and router configuration.

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{delete, get, post},
    Router,
};
use scrape_core::{Orchestrator, Store};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::routes::{
    cancel_tracked_domain_handler, cancel_tracked_search_handler, dead_letters_handler,
    discovery_status_handler, health_handler, job_records_handler, job_status_handler,
    register_tracked_domain_handler, register_tracked_search_handler, replay_dead_letter_handler,
    submit_discovery_handler, submit_scrape_handler,
};

/// Shared application state
pub struct AppState<S> {
    pub orchestrator: Orchestrator<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
        }
    }
}

impl<S> AppState<S> {
    pub fn new(orchestrator: Orchestrator<S>) -> Self {
        Self { orchestrator }
    }
}

/// Build the Axum application router
pub fn build_app<S: Store + 'static>(state: AppState<S>) -> Router {
    // CORS configuration - allow any origin
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler::<S>))
        // Scrape jobs
        .route("/scrape", post(submit_scrape_handler::<S>))
        .route("/jobs/:id", get(job_status_handler::<S>))
        .route("/jobs/:id/records", get(job_records_handler::<S>))
        // Discovery
        .route("/discover", post(submit_discovery_handler::<S>))
        .route("/discoveries/:id", get(discovery_status_handler::<S>))
        // Recurring work
        .route("/tracked/domains", post(register_tracked_domain_handler::<S>))
        .route(
            "/tracked/domains/:domain",
            delete(cancel_tracked_domain_handler::<S>),
        )
        .route("/tracked/searches", post(register_tracked_search_handler::<S>))
        .route(
            "/tracked/searches/:id",
            delete(cancel_tracked_search_handler::<S>),
        )
        // Webhook dead letters
        .route("/webhooks/dead-letters", get(dead_letters_handler::<S>))
        .route(
            "/webhooks/dead-letters/:id/replay",
            post(replay_dead_letter_handler::<S>),
        )
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
