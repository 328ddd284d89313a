//! Configuration management for the workstation backend.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/workstation/config.toml`.
//!
//! The configuration is built once at startup (file, then environment
//! overrides, then validation) and handed to every component that needs it.
//! Nothing else in the crate reads settings from the process environment.

use std::ffi::OsString;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default address of the upstream cluster manager.
pub const DEFAULT_UPSTREAM_URL: &str = "https://rancher:443";

/// Shell initialization injected into every new terminal.
pub const DEFAULT_INIT_SEQUENCE: &str = "alias k=kubectl; alias kk='kubectl krew'\n";

/// Host tools the welcome banner looks for on the search path.
pub const DEFAULT_HOST_TOOLS: &[&str] = &["crictl", "runc", "etcdctl", "zellij", "ssh"];

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("upstream url must be an absolute http:// or https:// URL, got {0}")]
    InvalidUpstreamUrl(String),

    #[error("listen_addr must be a socket address like 0.0.0.0:3000, got {0}")]
    InvalidListenAddr(String),

    #[error("{field} must be greater than 0")]
    ZeroTimeout { field: &'static str },

    #[error("default terminal size must be positive, got {cols}x{rows}")]
    InvalidTerminalSize { cols: u16, rows: u16 },

    #[error("files.allowed_paths must contain at least one absolute path")]
    NoAllowedPaths,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the workstation backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// Upstream cluster manager.
    pub upstream: UpstreamConfig,

    /// Interactive shell sessions.
    pub shell: ShellConfig,

    /// Extension manager (kubectl krew).
    pub extensions: ExtensionsConfig,

    /// Merged kubeconfig location.
    pub kubeconfig: KubeconfigConfig,

    /// File browsing restrictions.
    pub files: FilesConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily-rotated log files. Logs go to stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub listen_addr: String,

    /// Origins allowed by CORS. `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

/// Upstream cluster manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the cluster manager API.
    pub url: String,

    /// Bearer token used when a request does not carry its own.
    pub token: Option<String>,

    /// Timeout for ordinary API calls, in seconds.
    pub timeout_secs: u64,

    /// Timeout for credential document requests, in seconds.
    pub credential_timeout_secs: u64,

    /// Skip TLS certificate verification when talking to the cluster manager.
    pub accept_invalid_certs: bool,
}

/// Interactive shell configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellConfig {
    /// Preferred command interpreter.
    pub preferred: String,

    /// Interpreter used when the preferred one is not installed.
    pub fallback: String,

    /// Value of `TERM` in the shell environment.
    pub term: String,

    /// Bytes written to the terminal before any user input.
    pub init_sequence: String,

    /// Initial terminal width.
    pub default_cols: u16,

    /// Initial terminal height.
    pub default_rows: u16,
}

/// Extension manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// kubectl binary used to invoke `kubectl krew`.
    pub kubectl: String,

    /// Extension root (`KREW_ROOT`).
    pub root: PathBuf,

    /// How long the welcome banner waits for the installed list, in seconds.
    pub welcome_timeout_secs: u64,

    /// Host tools advertised in the welcome banner when present.
    pub host_tools: Vec<String>,
}

/// Merged kubeconfig configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KubeconfigConfig {
    /// Where the merged document is written.
    pub path: PathBuf,
}

/// File browsing configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Roots that may be listed.
    pub allowed_paths: Vec<PathBuf>,

    /// Directory listed when no path is given; relative paths resolve here.
    pub default_path: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            token: None,
            timeout_secs: 30,
            credential_timeout_secs: 15,
            accept_invalid_certs: true,
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            preferred: "/bin/bash".to_string(),
            fallback: "/bin/sh".to_string(),
            term: "xterm-256color".to_string(),
            init_sequence: DEFAULT_INIT_SEQUENCE.to_string(),
            default_cols: protocol::DEFAULT_COLS,
            default_rows: protocol::DEFAULT_ROWS,
        }
    }
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            root: home_dir().join(".krew"),
            welcome_timeout_secs: 5,
            host_tools: DEFAULT_HOST_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for KubeconfigConfig {
    fn default() -> Self {
        Self {
            path: home_dir().join(".kube").join("config"),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec![
                PathBuf::from("/root"),
                PathBuf::from("/app"),
                PathBuf::from("/tmp"),
            ],
            default_path: PathBuf::from("/root"),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("workstation")
        .join("config.toml")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"))
}

impl UpstreamConfig {
    /// Parse the configured base URL.
    pub fn parsed_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.url)
            .map_err(|_| ConfigError::InvalidUpstreamUrl(self.url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidUpstreamUrl(self.url.clone()));
        }
        Ok(url)
    }

    /// Timeout for ordinary API calls.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Timeout for credential document requests.
    pub fn credential_timeout(&self) -> Duration {
        Duration::from_secs(self.credential_timeout_secs)
    }
}

impl ExtensionsConfig {
    /// Directory holding installed extension binaries.
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Environment layered on top of the inherited one for anything that
    /// should see installed extensions: `KREW_ROOT` plus a `PATH` with the
    /// extension bin directory in front.
    pub fn environment(&self) -> Vec<(String, String)> {
        let inherited = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![self.bin_dir()];
        paths.extend(std::env::split_paths(&inherited));
        let path = std::env::join_paths(paths)
            .unwrap_or_else(|_| OsString::from(self.bin_dir().as_os_str()));

        vec![
            (
                "KREW_ROOT".to_string(),
                self.root.to_string_lossy().into_owned(),
            ),
            ("PATH".to_string(), path.to_string_lossy().into_owned()),
        ]
    }

    /// How long the welcome banner waits for the installed list.
    pub fn welcome_timeout(&self) -> Duration {
        Duration::from_secs(self.welcome_timeout_secs)
    }
}

impl ServerConfig {
    /// Parse the listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.listen_addr.clone()))
    }

    /// Replace the port of the listen address, keeping the host.
    fn set_port(&mut self, port: &str) {
        let host = self
            .listen_addr
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        self.listen_addr = format!("{}:{}", host, port);
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - RANCHER_URL: Upstream cluster manager URL (trailing `/` trimmed)
    /// - RANCHER_TOKEN: Fallback bearer token for upstream calls
    /// - KREW_ROOT: Extension root directory
    /// - PORT: Listen port (host part of listen_addr is kept)
    /// - WORKSTATION_LOG_LEVEL: Override log level
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("RANCHER_URL") {
            tracing::info!("Overriding upstream url from environment: {}", url);
            self.upstream.url = url;
        }
        self.upstream.url = self.upstream.url.trim_end_matches('/').to_string();

        if let Some(token) = non_empty_env("RANCHER_TOKEN") {
            tracing::info!("Using upstream token from environment");
            self.upstream.token = Some(token);
        }

        if let Some(root) = non_empty_env("KREW_ROOT") {
            tracing::info!("Overriding extension root from environment: {}", root);
            self.extensions.root = PathBuf::from(root);
        }

        if let Some(port) = non_empty_env("PORT") {
            tracing::info!("Overriding listen port from environment: {}", port);
            self.server.set_port(&port);
        }

        if let Some(level) = non_empty_env("WORKSTATION_LOG_LEVEL") {
            tracing::info!("Overriding log_level from environment: {}", level);
            self.daemon.log_level = level;
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.upstream.parsed_url()?;
        self.server.socket_addr()?;

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "upstream.timeout_secs",
            });
        }
        if self.upstream.credential_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "upstream.credential_timeout_secs",
            });
        }
        if self.extensions.welcome_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "extensions.welcome_timeout_secs",
            });
        }

        if self.shell.default_cols == 0 || self.shell.default_rows == 0 {
            return Err(ConfigError::InvalidTerminalSize {
                cols: self.shell.default_cols,
                rows: self.shell.default_rows,
            });
        }

        if !self.files.allowed_paths.iter().any(|p| p.is_absolute()) {
            return Err(ConfigError::NoAllowedPaths);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.server.listen_addr, "0.0.0.0:3000");
        assert_eq!(config.upstream.url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.upstream.timeout_secs, 30);
        assert_eq!(config.upstream.credential_timeout_secs, 15);
        assert!(config.upstream.accept_invalid_certs);
        assert_eq!(config.shell.preferred, "/bin/bash");
        assert_eq!(config.shell.fallback, "/bin/sh");
        assert_eq!(config.extensions.welcome_timeout_secs, 5);
        assert_eq!(config.extensions.host_tools.len(), 5);
        assert!(config.kubeconfig.path.ends_with(".kube/config"));
        assert_eq!(config.files.allowed_paths.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[upstream]
url = "https://manager.example"
timeout_secs = 10

[shell]
preferred = "/bin/zsh"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.upstream.url, "https://manager.example");
        assert_eq!(config.upstream.timeout_secs, 10);
        assert_eq!(config.upstream.credential_timeout_secs, 15);
        assert_eq!(config.shell.preferred, "/bin/zsh");
        assert_eq!(config.shell.fallback, "/bin/sh");
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[upstream\nurl = 1");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[shell]
default_cols = "wide"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.upstream.token = Some("token-abc".to_string());
        original.daemon.log_dir = Some(PathBuf::from("/var/log/workstation"));
        original.files.allowed_paths = vec![PathBuf::from("/srv")];

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.daemon.log_level = "debug".to_string();
        original.shell.default_cols = 132;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_validate_upstream_url() {
        let mut config = Config::default();
        config.upstream.url = "ftp://manager".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidUpstreamUrl("ftp://manager".to_string()))
        );

        config.upstream.url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUpstreamUrl(_))
        ));
    }

    #[test]
    fn test_validate_timeouts() {
        let mut config = Config::default();
        config.upstream.credential_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout {
                field: "upstream.credential_timeout_secs"
            })
        );
    }

    #[test]
    fn test_validate_terminal_size() {
        let mut config = Config::default();
        config.shell.default_rows = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTerminalSize { cols: 80, rows: 0 })
        );
    }

    #[test]
    fn test_validate_listen_addr_and_paths() {
        let mut config = Config::default();
        config.server.listen_addr = "localhost".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr(_))
        ));

        let mut config = Config::default();
        config.files.allowed_paths = vec![PathBuf::from("relative")];
        assert_eq!(config.validate(), Err(ConfigError::NoAllowedPaths));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
        config.daemon.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extension_environment() {
        let mut config = ExtensionsConfig::default();
        config.root = PathBuf::from("/opt/krew");
        let env = config.environment();

        assert_eq!(env[0], ("KREW_ROOT".to_string(), "/opt/krew".to_string()));
        assert_eq!(env[1].0, "PATH");
        assert!(env[1].1.starts_with("/opt/krew/bin"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("RANCHER_URL", "https://manager.example:8443/");
        std::env::set_var("RANCHER_TOKEN", "token-xyz");
        std::env::set_var("KREW_ROOT", "/opt/krew");
        std::env::set_var("PORT", "8080");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("RANCHER_URL");
        std::env::remove_var("RANCHER_TOKEN");
        std::env::remove_var("KREW_ROOT");
        std::env::remove_var("PORT");

        assert_eq!(config.upstream.url, "https://manager.example:8443");
        assert_eq!(config.upstream.token.as_deref(), Some("token-xyz"));
        assert_eq!(config.extensions.root, PathBuf::from("/opt/krew"));
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides_ignore_empty() {
        std::env::set_var("RANCHER_URL", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("RANCHER_URL");

        assert_eq!(config.upstream.url, DEFAULT_UPSTREAM_URL);
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("workstation"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }
}
