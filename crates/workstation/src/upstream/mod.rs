//! Client for the upstream cluster manager.
//!
//! The daemon only needs two calls: list the managed clusters and fetch a
//! generated kubeconfig for one of them. [`ClusterSource`] abstracts both so
//! the sync pipeline can run against a fake in tests.

mod client;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::UpstreamClient;

/// Errors from the upstream cluster manager.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// No credential was supplied by the caller or configured.
    #[error("no API token: set RANCHER_TOKEN or pass an Authorization header")]
    MissingToken,

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request did not complete in time.
    #[error("request to {path} timed out")]
    Timeout { path: String },

    /// Transport-level failure.
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with an error status.
    #[error("API {path} returned {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// A cluster managed by the upstream service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: String,
}

/// Source of clusters and their access credentials.
pub trait ClusterSource: Send + Sync {
    /// Lists all clusters visible to the token.
    fn list_clusters<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, Result<Vec<Cluster>>>;

    /// Fetches a kubeconfig document for one cluster.
    fn fetch_kubeconfig<'a>(
        &'a self,
        cluster_id: &'a str,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>>;
}
