//! Shared state for request handlers.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::extensions::{ExtensionManager, KrewCli};
use crate::files::DirectoryBrowser;
use crate::kubeconfig::{KubeconfigMerger, KubeconfigStore, KubeconfigSync};
use crate::session::{SessionBridge, SessionRegistry, WelcomeComposer};
use crate::upstream::{ClusterSource, UpstreamClient};

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub clusters: Arc<dyn ClusterSource>,
    pub extensions: Arc<dyn ExtensionManager>,
    pub sync: Arc<KubeconfigSync>,
    pub store: KubeconfigStore,
    pub browser: Arc<DirectoryBrowser>,
    pub bridge: Arc<SessionBridge>,
    pub sessions: Arc<SessionRegistry>,
    pub started_at: Instant,
}

impl AppState {
    /// Builds state with the production collaborators.
    pub fn from_config(config: Config) -> Result<Self> {
        let clusters: Arc<dyn ClusterSource> = Arc::new(
            UpstreamClient::new(&config.upstream).context("Failed to create upstream client")?,
        );
        let extensions: Arc<dyn ExtensionManager> = Arc::new(KrewCli::new(&config.extensions));
        Self::with_collaborators(config, clusters, extensions)
    }

    /// Builds state around the given cluster source and plugin manager.
    pub fn with_collaborators(
        config: Config,
        clusters: Arc<dyn ClusterSource>,
        extensions: Arc<dyn ExtensionManager>,
    ) -> Result<Self> {
        let upstream_url = config.upstream.parsed_url()?;
        let merger = KubeconfigMerger::new(&upstream_url)?;
        let store = KubeconfigStore::new(config.kubeconfig.path.clone());
        let sync = KubeconfigSync::new(Arc::clone(&clusters), merger, store.clone());

        let sessions = Arc::new(SessionRegistry::new());
        let composer = WelcomeComposer::new(Arc::clone(&extensions), &config.extensions);
        let bridge = SessionBridge::new(
            &config.shell,
            &config.extensions,
            composer,
            Arc::clone(&sessions),
        );

        Ok(Self {
            browser: Arc::new(DirectoryBrowser::from_config(&config.files)),
            config: Arc::new(config),
            clusters,
            extensions,
            sync: Arc::new(sync),
            store,
            bridge: Arc::new(bridge),
            sessions,
            started_at: Instant::now(),
        })
    }
}
