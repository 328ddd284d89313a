//! Router assembly.

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{self, files, kubeconfig, plugins, shell, system};
use super::AppState;

/// Builds the HTTP router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/health", get(system::health))
        .route("/api/info", get(system::info))
        .route("/api/sessions", get(system::sessions))
        .route("/api/clusters", get(kubeconfig::clusters))
        .route("/api/kubeconfig", get(kubeconfig::download))
        .route("/api/kubeconfig/sync", post(kubeconfig::sync))
        .route("/api/context", get(kubeconfig::context))
        .route("/api/plugins", get(plugins::catalog))
        .route("/api/plugins/installed", get(plugins::installed))
        .route("/api/plugins/update", post(plugins::update_index))
        .route("/api/plugins/:name", delete(plugins::uninstall))
        .route("/api/plugins/:name/install", post(plugins::install))
        .route("/api/plugins/:name/upgrade", post(plugins::upgrade))
        .route("/api/fs", get(files::list))
        .route("/api/ws/shell", get(shell::upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-rancher-token"),
        ])
}
