//! Cluster listing and kubeconfig endpoints.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::request_token;
use crate::api::{ApiError, ApiResult, AppState};
use crate::kubeconfig::SyncReport;
use crate::upstream::Cluster;

#[derive(Debug, Serialize)]
pub struct ClustersResponse {
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub context: String,
}

/// `GET /api/clusters`
pub async fn clusters(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ClustersResponse>> {
    let token = request_token(&headers);
    let clusters = state.clusters.list_clusters(token.as_deref()).await?;
    Ok(Json(ClustersResponse { clusters }))
}

/// `POST /api/kubeconfig/sync`
pub async fn sync(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SyncReport>> {
    let token = request_token(&headers);
    let report = state.sync.sync(token.as_deref()).await?;
    Ok(Json(report))
}

/// `GET /api/kubeconfig`
pub async fn download(State(state): State<AppState>) -> ApiResult<Response> {
    let store = state.store.clone();
    let contents = tokio::task::spawn_blocking(move || store.read())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??
        .ok_or_else(|| {
            ApiError::NotFound("kubeconfig not found; sync from the cluster manager first".to_string())
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-yaml"),
            (header::CONTENT_DISPOSITION, "attachment; filename=config"),
        ],
        contents,
    )
        .into_response())
}

/// `GET /api/context`
pub async fn context(State(state): State<AppState>) -> ApiResult<Json<ContextResponse>> {
    let store = state.store.clone();
    let context = tokio::task::spawn_blocking(move || store.current_context())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ContextResponse {
        context: context.unwrap_or_default(),
    }))
}
