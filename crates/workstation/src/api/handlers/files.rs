//! Directory listing for the file manager.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::api::{ApiResult, AppState};
use crate::files::Listing;

#[derive(Debug, Deserialize)]
pub struct FsQuery {
    pub path: Option<String>,
}

/// `GET /api/fs?path=<dir>`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<FsQuery>,
) -> ApiResult<Json<Listing>> {
    let browser = state.browser.clone();
    let listing = tokio::task::spawn_blocking(move || browser.list(query.path.as_deref()))
        .await
        .map_err(|e| crate::api::ApiError::Internal(e.to_string()))??;
    Ok(Json(listing))
}
