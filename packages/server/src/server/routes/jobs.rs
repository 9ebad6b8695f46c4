use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use scrape_core::{BudgetCeilings, JobStore, NewScrapeJob, ScrapeError, ScrapeJob, ScrapedRecord, Store};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    /// Bare host or URL; normalised to the root domain.
    pub domain: String,
    pub data_types: Vec<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: i32,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub org_id: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub budget: BudgetCeilings,
}

pub(crate) fn default_max_pages() -> i32 {
    50
}

pub(crate) fn default_priority() -> i32 {
    5
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScrapeAccepted {
    pub job_id: Uuid,
    pub status: String,
}

/// `POST /scrape`
pub async fn submit_scrape_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Json(request): Json<ScrapeRequest>,
) -> ApiResult<(StatusCode, Json<ScrapeAccepted>)> {
    let input = NewScrapeJob {
        domain: request.domain,
        data_types: request.data_types,
        max_pages: request.max_pages,
        template_id: request.template_id,
        priority: request.priority,
        org_id: request.org_id,
        callback_url: request.callback_url,
        budget: request.budget,
        discovery_id: None,
    };

    let job_id = state.orchestrator.submit_scrape_job(input, Utc::now()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ScrapeAccepted {
            job_id,
            status: "pending".to_string(),
        }),
    ))
}

/// `GET /jobs/:id`
pub async fn job_status_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ScrapeJob>> {
    Ok(Json(state.orchestrator.job_status(id).await?))
}

/// `GET /jobs/:id/records`
pub async fn job_records_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ScrapedRecord>>> {
    // 404 for unknown jobs rather than an empty list.
    state.orchestrator.job_status(id).await?;
    let records = state
        .orchestrator
        .store()
        .records_for_job(id)
        .await
        .map_err(ScrapeError::from)?;
    Ok(Json(records))
}
