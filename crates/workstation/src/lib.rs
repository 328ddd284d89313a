//! # Workstation Backend Library
//!
//! Backend for a browser-based Kubernetes workstation.
//!
//! ## Overview
//!
//! - **Shell sessions**: each browser connection gets its own interactive
//!   shell on a PTY, bridged over a WebSocket with in-band resize commands
//! - **Welcome banner**: detected host tools and installed kubectl plugins,
//!   composed under a hard deadline
//! - **Kubeconfig sync**: per-cluster credentials fetched from the cluster
//!   manager, merged into one file with loopback endpoints rewritten
//! - **Plugin management**: catalog, install, upgrade and removal through
//!   the krew CLI
//! - **File browser**: read-only listings restricted to allowed roots
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        HTTP API (axum)                       │
//! ├──────────────┬───────────────┬──────────────┬────────────────┤
//! │   Session    │  Kubeconfig   │  Extensions  │  Directory     │
//! │   Bridge     │  Sync         │  (krew CLI)  │  Browser       │
//! ├──────────────┼───────────────┤              │                │
//! │ PTY Session  │ Merger, Store │              │                │
//! │ Registry     │ Upstream API  │              │                │
//! └──────────────┴───────────────┴──────────────┴────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use workstation::api::{router, AppState};
//! use workstation::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let addr = config.server.socket_addr()?;
//!     let app = router(AppState::from_config(config)?);
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`session`]: PTY sessions, the channel bridge and the welcome banner
//! - [`extensions`]: kubectl plugin manager
//! - [`upstream`]: Cluster manager API client
//! - [`kubeconfig`]: Kubeconfig model, merge, storage and sync
//! - [`files`]: Restricted directory browsing
//! - [`api`]: HTTP routes and handlers

pub mod api;
pub mod config;
pub mod extensions;
pub mod files;
pub mod kubeconfig;
pub mod session;
pub mod upstream;

// Re-export commonly used types at the crate root for convenience
pub use config::{Config, ConfigError};
pub use extensions::{ExtensionError, ExtensionManager, KrewCli};
pub use files::{BrowserError, DirectoryBrowser};
pub use kubeconfig::{KubeconfigMerger, KubeconfigStore, KubeconfigSync, MergeError, SyncError};
pub use session::{Session, SessionBridge, SessionError, SessionRegistry, WelcomeComposer};
pub use upstream::{Cluster, ClusterSource, UpstreamClient, UpstreamError};
