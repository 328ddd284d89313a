//! API error type and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::files::BrowserError;
use crate::kubeconfig::{StoreError, SyncError};
use crate::upstream::UpstreamError;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    /// A collaborator (the cluster manager) failed.
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        ApiError::BadGateway(err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        if err.is_upstream() {
            ApiError::BadGateway(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<BrowserError> for ApiError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::PathOutsideBoundary(_) => ApiError::Forbidden("path not allowed".to_string()),
            BrowserError::PathNotFound(_) => ApiError::NotFound(err.to_string()),
            BrowserError::NotADirectory(_) => ApiError::BadRequest(err.to_string()),
            BrowserError::PermissionDenied(_) => ApiError::Forbidden(err.to_string()),
            BrowserError::Io(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::BadGateway("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::from(UpstreamError::MissingToken).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_browser_errors() {
        let forbidden = ApiError::from(BrowserError::PathOutsideBoundary(PathBuf::from("/etc")));
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(forbidden.to_string(), "path not allowed");

        let missing = ApiError::from(BrowserError::PathNotFound(PathBuf::from("/root/x")));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_sync_error_mapping() {
        let upstream = ApiError::from(SyncError::Fetch {
            cluster: "prod".to_string(),
            source: UpstreamError::MissingToken,
        });
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        assert!(upstream.to_string().starts_with("cluster prod: "));
    }
}
