//! Persisted kubeconfig file.
//!
//! The file holds credentials, so the directory is created owner-only and
//! the file is written owner read/write. Writes go through a temp file and
//! a rename so readers never see a partial document.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::document::Kubeconfig;

/// Mode of the directory holding the kubeconfig.
const DIR_MODE: u32 = 0o700;

/// Mode of the kubeconfig file.
const FILE_MODE: u32 = 0o600;

/// Errors from reading or writing the stored kubeconfig.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The kubeconfig file used by shells in the workstation.
#[derive(Debug, Clone)]
pub struct KubeconfigStore {
    path: PathBuf,
}

impl KubeconfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the stored document.
    pub fn write(&self, contents: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(parent)
                .map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let temp_path = self.path.with_extension("tmp");
        if let Err(source) = replace_via(&temp_path, &self.path, contents) {
            // The temp file may hold a partial document with credentials.
            if let Err(e) = fs::remove_file(&temp_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %temp_path.display(), error = %e, "Failed to remove temp kubeconfig");
                }
            }
            return Err(StoreError::Write {
                path: self.path.clone(),
                source,
            });
        }

        tracing::info!(path = %self.path.display(), bytes = contents.len(), "Wrote kubeconfig");
        Ok(())
    }

    /// Reads the stored document, or `None` if nothing has been written.
    pub fn read(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// The stored document's current context.
    ///
    /// Missing or unparseable files have no current context.
    pub fn current_context(&self) -> Option<String> {
        let contents = self.read().ok().flatten()?;
        match Kubeconfig::from_yaml(&contents) {
            Ok(doc) => doc.current().map(str::to_string),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Stored kubeconfig is not parseable");
                None
            }
        }
    }
}

/// Writes `contents` to `temp_path` with owner-only permissions, syncs it
/// and renames it over `path`.
fn replace_via(temp_path: &Path, path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(temp_path)?;
    // The mode above only applies when the temp file is new.
    file.set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(temp_path, path)
}
