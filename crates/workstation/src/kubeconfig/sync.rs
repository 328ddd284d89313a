//! Fetch, merge and persist kubeconfig from the cluster manager.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::merge::{KubeconfigMerger, MergeError};
use super::store::{KubeconfigStore, StoreError};
use crate::upstream::{ClusterSource, UpstreamError};

/// Errors from a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The cluster list could not be fetched.
    #[error(transparent)]
    ListClusters(UpstreamError),

    /// A cluster's kubeconfig could not be fetched.
    #[error("cluster {cluster}: {source}")]
    Fetch {
        cluster: String,
        #[source]
        source: UpstreamError,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The blocking write task panicked or was cancelled.
    #[error("kubeconfig write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Whether the failure came from the cluster manager rather than from
    /// local processing.
    pub fn is_upstream(&self) -> bool {
        matches!(self, SyncError::ListClusters(_) | SyncError::Fetch { .. })
    }
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub message: String,
    pub clusters: usize,
}

impl SyncReport {
    fn nothing_to_sync() -> Self {
        Self {
            message: "no clusters to sync".to_string(),
            clusters: 0,
        }
    }

    fn synced(clusters: usize) -> Self {
        Self {
            message: "kubeconfig synced".to_string(),
            clusters,
        }
    }
}

/// Rebuilds the stored kubeconfig from every cluster the manager knows.
pub struct KubeconfigSync {
    source: Arc<dyn ClusterSource>,
    merger: KubeconfigMerger,
    store: KubeconfigStore,
}

impl KubeconfigSync {
    pub fn new(source: Arc<dyn ClusterSource>, merger: KubeconfigMerger, store: KubeconfigStore) -> Self {
        Self {
            source,
            merger,
            store,
        }
    }

    pub fn store(&self) -> &KubeconfigStore {
        &self.store
    }

    /// Runs a sync.
    ///
    /// Cluster documents are fetched one at a time in list order and the
    /// first failure aborts the run. The stored file is only touched once
    /// every document is in hand and merged. An empty cluster list leaves
    /// the stored file as it was.
    pub async fn sync(&self, token: Option<&str>) -> Result<SyncReport, SyncError> {
        let clusters = self
            .source
            .list_clusters(token)
            .await
            .map_err(SyncError::ListClusters)?;

        if clusters.is_empty() {
            tracing::info!("No clusters to sync");
            return Ok(SyncReport::nothing_to_sync());
        }

        let mut documents = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            let document = self
                .source
                .fetch_kubeconfig(&cluster.id, token)
                .await
                .map_err(|source| SyncError::Fetch {
                    cluster: cluster.name.clone(),
                    source,
                })?;
            tracing::debug!(cluster = %cluster.name, id = %cluster.id, "Fetched kubeconfig");
            documents.push(document);
        }

        let merged = self.merger.merge(&documents)?;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.write(&merged)).await??;

        tracing::info!(clusters = clusters.len(), "Kubeconfig synced");
        Ok(SyncReport::synced(clusters.len()))
    }
}
