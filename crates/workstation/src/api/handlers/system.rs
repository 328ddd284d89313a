//! Health and runtime information.

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::session::SessionInfo;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub version: &'static str,
    pub hostname: String,
    pub krew_root: String,
    pub upstream: String,
    pub active_sessions: usize,
    pub uptime_secs: u64,
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// `GET /api/info`
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION"),
        hostname: hostname(),
        krew_root: state.config.extensions.root.to_string_lossy().into_owned(),
        upstream: state.config.upstream.url.clone(),
        active_sessions: state.sessions.count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// `GET /api/sessions`
pub async fn sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    Json(state.sessions.list())
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}
