//! Request handlers.

pub mod files;
pub mod kubeconfig;
pub mod plugins;
pub mod shell;
pub mod system;

use axum::http::{header, HeaderMap};

/// Header carrying the cluster manager token when `Authorization` is not used.
pub const TOKEN_HEADER: &str = "X-Rancher-Token";

/// Extracts the caller's cluster manager token.
///
/// A `Bearer` authorization header wins over the token header. Empty
/// values count as absent.
pub fn request_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    bearer
        .or_else(|| headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
