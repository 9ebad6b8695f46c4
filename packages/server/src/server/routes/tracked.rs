use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use scrape_core::{
    BudgetCeilings, Frequency, NewTrackedDomain, NewTrackedSearch, SearchParams, Store,
    TrackedDomain, TrackedSearch,
};
use serde::Deserialize;
use uuid::Uuid;

use super::jobs::{default_max_pages, default_priority};
use crate::server::app::AppState;
use crate::server::error::ApiResult;

fn default_frequency() -> Frequency {
    Frequency::Weekly
}

#[derive(Debug, Deserialize)]
pub struct TrackDomainRequest {
    pub domain: String,
    pub data_types: Vec<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
    #[serde(default = "default_max_pages")]
    pub max_pages: i32,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub budget: BudgetCeilings,
}

#[derive(Debug, Deserialize)]
pub struct TrackSearchRequest {
    pub query: String,
    #[serde(default)]
    pub params: SearchParams,
    pub data_types: Vec<String>,
    #[serde(default = "default_frequency")]
    pub frequency: Frequency,
    #[serde(default = "default_max_pages")]
    pub max_pages_per_domain: i32,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
}

/// `POST /tracked/domains`
///
/// Registering an already tracked domain replaces its settings and
/// reactivates it.
pub async fn register_tracked_domain_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Json(request): Json<TrackDomainRequest>,
) -> ApiResult<(StatusCode, Json<TrackedDomain>)> {
    let input = NewTrackedDomain {
        domain: request.domain,
        data_types: request.data_types,
        template_id: request.template_id,
        frequency: request.frequency,
        max_pages: request.max_pages,
        priority: request.priority,
        webhook_url: request.webhook_url,
        org_id: request.org_id,
        budget: request.budget,
    };

    let tracked = state
        .orchestrator
        .register_tracked_domain(input, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(tracked)))
}

/// `DELETE /tracked/domains/:domain`
pub async fn cancel_tracked_domain_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Path(domain): Path<String>,
) -> ApiResult<StatusCode> {
    if state.orchestrator.cancel_tracked_domain(&domain).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

/// `POST /tracked/searches`
pub async fn register_tracked_search_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Json(request): Json<TrackSearchRequest>,
) -> ApiResult<(StatusCode, Json<TrackedSearch>)> {
    let input = NewTrackedSearch {
        query: request.query,
        params: request.params,
        data_types: request.data_types,
        frequency: request.frequency,
        max_pages_per_domain: request.max_pages_per_domain,
        priority: request.priority,
        webhook_url: request.webhook_url,
        org_id: request.org_id,
    };

    let tracked = state
        .orchestrator
        .register_tracked_search(input, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(tracked)))
}

/// `DELETE /tracked/searches/:id`
pub async fn cancel_tracked_search_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.orchestrator.cancel_tracked_search(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
