//! Plugin catalog and lifecycle endpoints.
//!
//! Every response carries the plugin manager's terminal output so the UI
//! can show what happened, including on failure.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::api::AppState;
use crate::extensions::{self, ExtensionError, Plugin};

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsResponse {
    pub plugins: Vec<Plugin>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub terminal_output: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl PluginsResponse {
    fn output(terminal_output: String) -> Self {
        Self {
            terminal_output,
            ..Self::default()
        }
    }

    fn failure(error: &ExtensionError, terminal_output: String) -> Response {
        tracing::warn!(error = %error, "Plugin operation failed");
        let body = Self {
            plugins: Vec::new(),
            terminal_output,
            error: error.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Output of a run, whether it succeeded or not.
fn output_of(result: &extensions::Result<String>) -> &str {
    match result {
        Ok(output) => output,
        Err(e) => e.output(),
    }
}

/// `GET /api/plugins`
pub async fn catalog(State(state): State<AppState>) -> Response {
    let installed = state.extensions.list_installed().await;
    let installed_output = output_of(&installed).to_string();

    match state.extensions.search().await {
        Ok(search_output) => {
            let plugins = extensions::build_catalog(&search_output, &installed_output);
            Json(PluginsResponse {
                plugins,
                terminal_output: format!("{}\n{}", installed_output, search_output),
                error: String::new(),
            })
            .into_response()
        }
        Err(e) => PluginsResponse::failure(&e, e.output().to_string()),
    }
}

/// `GET /api/plugins/installed`
pub async fn installed(State(state): State<AppState>) -> Response {
    match state.extensions.list_installed().await {
        Ok(output) => {
            let names: Vec<String> = extensions::parse_installed(&output).into_keys().collect();
            Json(json!({ "plugins": names })).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// `POST /api/plugins/update`
pub async fn update_index(State(state): State<AppState>) -> Response {
    match state.extensions.update_index().await {
        Ok(output) => Json(PluginsResponse::output(output)).into_response(),
        Err(e) => PluginsResponse::failure(&e, e.output().to_string()),
    }
}

/// `POST /api/plugins/:name/install`
pub async fn install(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    // A stale index is not fatal; the install reports its own failure.
    let update = state.extensions.update_index().await;
    let result = state.extensions.install(&name).await;
    finish(output_of(&update), result)
}

/// `POST /api/plugins/:name/upgrade`
pub async fn upgrade(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let update = state.extensions.update_index().await;
    let result = state.extensions.upgrade(&name).await;
    finish(output_of(&update), result)
}

/// `DELETE /api/plugins/:name`
pub async fn uninstall(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.extensions.uninstall(&name).await {
        Ok(output) => Json(PluginsResponse::output(output)).into_response(),
        Err(e) => PluginsResponse::failure(&e, e.output().to_string()),
    }
}

fn finish(update_output: &str, result: extensions::Result<String>) -> Response {
    let output = format!("{}\n{}", update_output, output_of(&result));
    match result {
        Ok(_) => Json(PluginsResponse::output(output)).into_response(),
        Err(e) => PluginsResponse::failure(&e, output),
    }
}
