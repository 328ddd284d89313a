//! Directory browsing with path validation.
//!
//! Requested paths are cleaned lexically, resolved against the default
//! directory when relative, and must fall under one of the allowed roots
//! both before and after symlinks are resolved.

use std::fs::{self, FileType, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::config::FilesConfig;

/// Timestamp format for entry modification times.
const MOD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Errors that can occur during directory browsing.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The requested path is outside allowed boundaries.
    #[error("path not allowed: {0}")]
    PathOutsideBoundary(PathBuf),

    /// The requested path does not exist.
    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    /// The requested path is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Permission denied.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A directory entry as returned to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Whether the entry is a directory.
    pub dir: bool,
    /// Full path of the entry.
    pub path: String,
    /// Size in bytes, -1 for directories.
    pub size: i64,
    /// `ls`-style permission string.
    pub mode: String,
    /// Last modification time.
    pub mod_time: String,
}

/// A listed directory.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub path: String,
    pub entries: Vec<DirectoryEntry>,
}

/// Directory browser with path validation.
pub struct DirectoryBrowser {
    /// Roots that listings must stay under.
    allowed_paths: Vec<PathBuf>,
    /// Directory for empty and relative requests.
    default_path: PathBuf,
}

impl DirectoryBrowser {
    /// Create a new directory browser.
    pub fn new(allowed_paths: Vec<PathBuf>, default_path: PathBuf) -> Self {
        Self {
            allowed_paths: allowed_paths.iter().map(|p| clean_path(p)).collect(),
            default_path: clean_path(&default_path),
        }
    }

    /// Create a browser from the files configuration.
    pub fn from_config(config: &FilesConfig) -> Self {
        Self::new(config.allowed_paths.clone(), config.default_path.clone())
    }

    /// Resolves a requested path to a cleaned absolute path.
    ///
    /// Empty requests map to the default directory and relative ones are
    /// joined onto it. The result is checked against the allowed roots.
    pub fn resolve(&self, requested: Option<&str>) -> Result<PathBuf, BrowserError> {
        let requested = requested.map(str::trim).unwrap_or_default();
        let joined = if requested.is_empty() {
            self.default_path.clone()
        } else if Path::new(requested).is_absolute() {
            PathBuf::from(requested)
        } else {
            self.default_path.join(requested)
        };

        let cleaned = clean_path(&joined);
        if !self.is_allowed(&cleaned) {
            return Err(BrowserError::PathOutsideBoundary(cleaned));
        }
        Ok(cleaned)
    }

    /// Validate that a path is within allowed boundaries once symlinks are
    /// resolved. Returns the canonical path.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, BrowserError> {
        let canonical = fs::canonicalize(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BrowserError::PathNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                BrowserError::PermissionDenied(path.to_path_buf())
            }
            _ => BrowserError::Io(e),
        })?;

        let inside = self.allowed_paths.iter().any(|allowed| {
            fs::canonicalize(allowed)
                .map(|root| canonical.starts_with(root))
                .unwrap_or(false)
        });

        if inside {
            Ok(canonical)
        } else {
            Err(BrowserError::PathOutsideBoundary(path.to_path_buf()))
        }
    }

    /// Lists a directory, sorted by name.
    pub fn list(&self, requested: Option<&str>) -> Result<Listing, BrowserError> {
        let path = self.resolve(requested)?;
        let canonical = self.validate_path(&path)?;

        if !fs::metadata(&canonical)?.is_dir() {
            return Err(BrowserError::NotADirectory(path));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&canonical)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            // Entry metadata without following symlinks.
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(describe(&path, name, &metadata));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(path = %path.display(), entries = entries.len(), "Listed directory");

        Ok(Listing {
            path: path.to_string_lossy().into_owned(),
            entries,
        })
    }

    fn is_allowed(&self, path: &Path) -> bool {
        self.allowed_paths.iter().any(|root| path.starts_with(root))
    }
}

fn describe(parent: &Path, name: String, metadata: &Metadata) -> DirectoryEntry {
    let dir = metadata.is_dir();
    let mod_time = metadata
        .modified()
        .map(|t| DateTime::<Local>::from(t).format(MOD_TIME_FORMAT).to_string())
        .unwrap_or_default();

    DirectoryEntry {
        path: parent.join(&name).to_string_lossy().into_owned(),
        name,
        dir,
        size: if dir { -1 } else { metadata.len() as i64 },
        mode: mode_string(metadata.file_type(), metadata.mode()),
        mod_time,
    }
}

/// Renders a type and permission string such as `drwxr-xr-x`.
pub fn mode_string(file_type: FileType, mode: u32) -> String {
    let kind = if file_type.is_dir() {
        'd'
    } else if file_type.is_symlink() {
        'L'
    } else if file_type.is_fifo() {
        'p'
    } else if file_type.is_socket() {
        'S'
    } else if file_type.is_block_device() || file_type.is_char_device() {
        'D'
    } else {
        '-'
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Lexically normalizes a path: drops `.`, applies `..` and never climbs
/// above the root.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => cleaned.push(p.as_os_str()),
            Component::RootDir => cleaned.push("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() && !path.is_absolute() {
                    cleaned.push("..");
                }
                if path.is_absolute() && cleaned.as_os_str().is_empty() {
                    cleaned.push("/");
                }
            }
            Component::Normal(part) => cleaned.push(part),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}
