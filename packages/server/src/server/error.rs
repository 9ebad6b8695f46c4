use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scrape_core::ScrapeError;
use serde::Serialize;

/// Error body returned by every route.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps core errors onto HTTP status codes.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ScrapeError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ScrapeError::Validation { .. } => StatusCode::BAD_REQUEST,
            ScrapeError::JobNotFound { .. }
            | ScrapeError::DiscoveryNotFound { .. }
            | ScrapeError::TrackedSearchNotFound { .. }
            | ScrapeError::DeadLetterNotFound { .. } => StatusCode::NOT_FOUND,
            ScrapeError::Search(_) => StatusCode::BAD_GATEWAY,
            ScrapeError::Store(_) | ScrapeError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        // Storage details stay in the logs.
        let message = match &self.0 {
            ScrapeError::Store(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(ScrapeError::validation("bad")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(ScrapeError::JobNotFound { id: Uuid::nil() }).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(ScrapeError::Store(scrape_core::StoreError::LockPoisoned)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
