use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::{ErrorKind, PoolError};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_type: String,
}

/// Error returned by every handler, rendered as `{error, error_type}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_type: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, error_type: &str) -> Self {
        Self {
            status,
            message: message.into(),
            error_type: error_type.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, ErrorKind::Validation.as_str())
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict | ErrorKind::State => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PoolError> for ApiError {
    fn from(e: PoolError) -> Self {
        let kind = e.kind();
        let error_type = match &e {
            PoolError::Upstream(feed) => feed.error_type(),
            _ => kind.as_str(),
        };
        if kind == ErrorKind::Internal {
            error!("Request failed: {}", e);
        }
        Self::new(status_for(kind), e.to_string(), error_type)
    }
}

/// Failures from the admin auth check
impl From<(StatusCode, String)> for ApiError {
    fn from((status, message): (StatusCode, String)) -> Self {
        Self::new(status, message, ErrorKind::Unauthorized.as_str())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            error_type: self.error_type,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(PoolError::AlreadyClaimed).status, StatusCode::CONFLICT);
        assert_eq!(ApiError::from(PoolError::ProtectedGrid(1)).status, StatusCode::CONFLICT);
        assert_eq!(ApiError::from(PoolError::GridNotFound(9)).status, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(PoolError::InvalidEmail).status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(PoolError::AdminRequired).status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_upstream_keeps_feed_tag() {
        let err = ApiError::from(PoolError::Upstream(FeedError::NotFoundYet));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.error_type, "game_not_found");
    }
}
