//! HTTP API.
//!
//! JSON endpoints for cluster and kubeconfig management, the plugin
//! catalog and the file browser, plus the WebSocket shell endpoint.
//! Errors are reported as `{"error": "<message>"}`.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
