use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use scrape_core::{DiscoveryJob, DiscoveryView, NewDiscovery, SearchParams, Store};
use serde::Deserialize;
use uuid::Uuid;

use super::jobs::{default_max_pages, default_priority};
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub query: String,
    #[serde(default)]
    pub params: SearchParams,
    pub data_types: Vec<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages_per_domain: i32,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

/// `POST /discover`
///
/// Runs the search synchronously and returns once the child jobs are
/// queued. A failed search still returns the (failed) discovery record.
pub async fn submit_discovery_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Json(request): Json<DiscoverRequest>,
) -> ApiResult<(StatusCode, Json<DiscoveryJob>)> {
    let input = NewDiscovery {
        query: request.query,
        params: request.params,
        data_types: request.data_types,
        max_pages_per_domain: request.max_pages_per_domain,
        priority: request.priority,
        org_id: request.org_id,
        callback_url: request.callback_url,
        tracked_search_id: None,
    };

    let discovery = state.orchestrator.submit_discovery(input, Utc::now()).await?;
    Ok((StatusCode::ACCEPTED, Json(discovery)))
}

/// `GET /discoveries/:id`
pub async fn discovery_status_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DiscoveryView>> {
    Ok(Json(state.orchestrator.discovery_status(id).await?))
}
