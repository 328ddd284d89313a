//! Plugin manager backed by the `kubectl krew` CLI.

use std::process::Stdio;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::process::Command;

use super::{validate_name, ExtensionError, ExtensionManager, Result};
use crate::config::ExtensionsConfig;

/// Runs `kubectl krew <args>` with the extension environment.
#[derive(Debug, Clone)]
pub struct KrewCli {
    kubectl: String,
    env: Vec<(String, String)>,
}

impl KrewCli {
    /// Creates a runner from the extension configuration.
    pub fn new(config: &ExtensionsConfig) -> Self {
        Self {
            kubectl: config.kubectl.clone(),
            env: config.environment(),
        }
    }

    /// Runs the CLI and returns stdout followed by stderr.
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let joined = args.join(" ");
        tracing::debug!(args = %joined, "Running plugin manager");

        let output = Command::new(&self.kubectl)
            .arg("krew")
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtensionError::Spawn {
                command: format!("{} krew {}", self.kubectl, joined),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            tracing::warn!(args = %joined, status = %output.status, "Plugin manager failed");
            Err(ExtensionError::Failed {
                args: joined,
                status: output.status.to_string(),
                output: combined,
            })
        }
    }

    async fn run_named(&self, action: &str, name: &str) -> Result<String> {
        let name = validate_name(name)?;
        self.run(&[action, name]).await
    }
}

impl ExtensionManager for KrewCli {
    fn list_installed(&self) -> BoxFuture<'_, Result<String>> {
        self.run(&["list"]).boxed()
    }

    fn search(&self) -> BoxFuture<'_, Result<String>> {
        self.run(&["search"]).boxed()
    }

    fn update_index(&self) -> BoxFuture<'_, Result<String>> {
        self.run(&["update"]).boxed()
    }

    fn install<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>> {
        self.run_named("install", name).boxed()
    }

    fn uninstall<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>> {
        self.run_named("uninstall", name).boxed()
    }

    fn upgrade<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>> {
        self.run_named("upgrade", name).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(kubectl: &str) -> KrewCli {
        let mut config = ExtensionsConfig::default();
        config.kubectl = kubectl.to_string();
        KrewCli::new(&config)
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let result = cli("/nonexistent/kubectl").list_installed().await;
        assert!(matches!(result, Err(ExtensionError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_success_returns_output() {
        // `echo krew list` stands in for the real CLI.
        let output = cli("echo").run(&["list"]).await.unwrap();
        assert_eq!(output.trim(), "krew list");
    }

    #[tokio::test]
    async fn test_failure_carries_status() {
        let result = cli("false").run(&["update"]).await;
        match result {
            Err(ExtensionError::Failed { args, .. }) => assert_eq!(args, "update"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_environment_is_applied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("kubectl");
        std::fs::write(&script, "#!/bin/sh\necho \"$KREW_ROOT $*\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = ExtensionsConfig::default();
        config.kubectl = script.to_string_lossy().into_owned();
        config.root = "/opt/plugins".into();

        let output = KrewCli::new(&config).run(&["list"]).await.unwrap();
        assert_eq!(output.trim(), "/opt/plugins krew list");
    }

    #[tokio::test]
    async fn test_invalid_name_is_rejected_before_running() {
        let result = cli("/nonexistent/kubectl").install("--force").await;
        assert!(matches!(result, Err(ExtensionError::InvalidName(_))));
    }
}
