//! Kubeconfig handling: the document model, merging, the persisted file
//! and the sync pipeline that ties them to the cluster manager.

pub mod document;
pub mod merge;
pub mod store;
pub mod sync;

pub use document::{Kubeconfig, NamedCluster, NamedContext, NamedUser};
pub use merge::{is_loopback, KubeconfigMerger, MergeError, UpstreamEndpoint};
pub use store::{KubeconfigStore, StoreError};
pub use sync::{KubeconfigSync, SyncError, SyncReport};
