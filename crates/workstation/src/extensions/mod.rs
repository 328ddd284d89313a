//! kubectl extension (krew plugin) management.
//!
//! The [`ExtensionManager`] trait is the seam between the daemon and the
//! plugin manager CLI. [`KrewCli`] is the production implementation; the
//! parsers here turn its tabular output into structured records.

mod krew;

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

pub use krew::KrewCli;

/// Errors from extension manager operations.
#[derive(Error, Debug)]
pub enum ExtensionError {
    /// The plugin manager could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The plugin manager ran and reported failure.
    #[error("krew {args} failed: {status}")]
    Failed {
        args: String,
        status: String,
        output: String,
    },

    /// A plugin name that cannot be passed to the plugin manager.
    #[error("invalid plugin name: {0:?}")]
    InvalidName(String),
}

impl ExtensionError {
    /// Terminal output captured from a failed run, if any.
    pub fn output(&self) -> &str {
        match self {
            ExtensionError::Failed { output, .. } => output,
            _ => "",
        }
    }
}

/// Result type for extension operations.
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// A plugin as reported by the catalog endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    pub name: String,
    pub version: String,
    pub description: String,
    pub installed: bool,
}

/// Operations on the kubectl plugin manager.
///
/// Each operation returns the combined terminal output of the underlying
/// command on success.
pub trait ExtensionManager: Send + Sync {
    /// Lists installed plugins.
    fn list_installed(&self) -> BoxFuture<'_, Result<String>>;

    /// Lists every plugin in the index.
    fn search(&self) -> BoxFuture<'_, Result<String>>;

    /// Refreshes the plugin index.
    fn update_index(&self) -> BoxFuture<'_, Result<String>>;

    /// Installs a plugin.
    fn install<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Removes a plugin.
    fn uninstall<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Upgrades a plugin.
    fn upgrade<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Extracts plugin names from `list` output, one per non-header row.
pub fn parse_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("PLUGIN"))
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// Parses `list` output into a name to version map.
///
/// Rows with fewer than two columns are dropped.
pub fn parse_installed(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let version = fields.next()?;
            (name != "PLUGIN").then(|| (name.to_string(), version.to_string()))
        })
        .collect()
}

/// Parses `search` output into name and description pairs.
///
/// The description is every column after the name, joined by single spaces.
pub fn parse_available(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 2 || fields[0] == "NAME" {
                return None;
            }
            Some((fields[0].to_string(), fields[1..].join(" ")))
        })
        .collect()
}

/// Builds the catalog from index and installed listings.
pub fn build_catalog(available: &str, installed: &str) -> Vec<Plugin> {
    let installed = parse_installed(installed);

    parse_available(available)
        .into_iter()
        .map(|(name, description)| {
            let version = installed.get(&name).cloned();
            Plugin {
                installed: version.is_some(),
                version: version.unwrap_or_default(),
                name,
                description,
            }
        })
        .collect()
}

/// Rejects names the plugin manager would read as flags or paths.
pub fn validate_name(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && !name.starts_with('-')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));

    if valid {
        Ok(name)
    } else {
        Err(ExtensionError::InvalidName(name.to_string()))
    }
}
