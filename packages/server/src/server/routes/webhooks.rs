use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use scrape_core::{DeadLetter, Store};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::server::app::AppState;
use crate::server::error::ApiResult;

const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReplayAccepted {
    pub delivery_id: Uuid,
}

/// `GET /webhooks/dead-letters?limit=`
pub async fn dead_letters_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Query(query): Query<DeadLetterQuery>,
) -> ApiResult<Json<Vec<DeadLetter>>> {
    let limit = query.limit.clamp(1, MAX_LIMIT);
    Ok(Json(state.orchestrator.dead_letters(limit).await?))
}

/// `POST /webhooks/dead-letters/:id/replay`
///
/// Queues a fresh delivery of the dead-lettered payload. Each dead letter
/// can be replayed once.
pub async fn replay_dead_letter_handler<S: Store + 'static>(
    Extension(state): Extension<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<ReplayAccepted>)> {
    let delivery_id = state.orchestrator.replay_dead_letter(id, Utc::now()).await?;
    Ok((StatusCode::ACCEPTED, Json(ReplayAccepted { delivery_id })))
}
