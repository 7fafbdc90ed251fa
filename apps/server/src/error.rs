use actix_web::error::{JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use backlinkoo_shared::{BacklinkooError, CampaignId};

use crate::routes::Envelope;

/// Errors surfaced by the HTTP layer. Every variant renders as a
/// `{ "success": false, "error": "..." }` envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // 400
    #[error("invalid JSON body: {0}")]
    InvalidJson(JsonPayloadError),
    #[error("invalid path: {0}")]
    InvalidPath(PathError),
    #[error("invalid query: {0}")]
    InvalidQuery(QueryPayloadError),

    // 404
    #[error("the requested path was not found")]
    PathNotFound,

    /// A campaign was stored but running it failed; the row stays behind
    /// with status `failed`.
    #[error("campaign {campaign_id} was created but its run failed: {source}")]
    RunAfterCreate {
        campaign_id: CampaignId,
        source: BacklinkooError,
    },

    #[error(transparent)]
    Backlinkoo(#[from] BacklinkooError),
}

fn library_status(err: &BacklinkooError) -> StatusCode {
    if err.is_upstream() {
        return StatusCode::BAD_GATEWAY;
    }
    match err {
        BacklinkooError::Validation { .. } | BacklinkooError::Parse { .. } => {
            StatusCode::BAD_REQUEST
        }
        BacklinkooError::NotFound { .. } => StatusCode::NOT_FOUND,
        BacklinkooError::Conflict(_) | BacklinkooError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidJson(_) | ApiError::InvalidPath(_) | ApiError::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::PathNotFound => StatusCode::NOT_FOUND,
            ApiError::RunAfterCreate { source, .. } => library_status(source),
            ApiError::Backlinkoo(err) => library_status(err),
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, %status, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        HttpResponse::build(status).json(Envelope::<()>::error(self.to_string()))
    }
}
