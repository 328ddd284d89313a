//! Welcome banner shown at the top of every browser shell.
//!
//! Composition never fails and never takes longer than the configured
//! timeout: the plugin listing runs on its own task and the composer waits
//! for whichever comes first, the listing or the deadline. Host tool
//! detection is a synchronous search-path lookup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::config::ExtensionsConfig;
use crate::extensions::{parse_names, ExtensionManager};

const LINE_END: &str = "\r\n";

/// Builds the welcome banner.
#[derive(Clone)]
pub struct WelcomeComposer {
    extensions: Arc<dyn ExtensionManager>,
    host_tools: Vec<String>,
    timeout: Duration,
}

impl WelcomeComposer {
    /// Creates a composer using the given plugin manager.
    pub fn new(extensions: Arc<dyn ExtensionManager>, config: &ExtensionsConfig) -> Self {
        Self {
            extensions,
            host_tools: config.host_tools.clone(),
            timeout: config.welcome_timeout(),
        }
    }

    /// Overrides the listing deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the host tools to look for.
    pub fn with_host_tools(mut self, tools: Vec<String>) -> Self {
        self.host_tools = tools;
        self
    }

    /// Composes the banner.
    pub async fn compose(&self) -> String {
        let extensions = self.installed_extensions().await;
        let tools = detect_host_tools(&self.host_tools);
        render_banner(&tools, &extensions)
    }

    /// Lists installed plugin names, or nothing if the listing fails or
    /// misses the deadline.
    async fn installed_extensions(&self) -> Vec<String> {
        let (tx, rx) = oneshot::channel();
        let manager = Arc::clone(&self.extensions);

        let listing = tokio::spawn(async move {
            match manager.list_installed().await {
                Ok(output) => {
                    let _ = tx.send(output);
                }
                Err(e) => tracing::debug!(error = %e, "Plugin listing failed"),
            }
        });

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(output)) => parse_names(&output),
            Ok(Err(_)) => Vec::new(),
            Err(_) => {
                tracing::debug!(timeout = ?self.timeout, "Plugin listing timed out");
                listing.abort();
                Vec::new()
            }
        }
    }
}

/// Returns the tools from `candidates` found on the search path, in order.
pub fn detect_host_tools(candidates: &[String]) -> Vec<String> {
    candidates
        .iter()
        .filter(|tool| which::which(tool.as_str()).is_ok())
        .cloned()
        .collect()
}

/// Renders the banner text. Every line ends with CR LF.
pub fn render_banner(tools: &[String], extensions: &[String]) -> String {
    let mut lines = vec![
        String::new(),
        "  ╭──────────────────────────────────────────────╮".to_string(),
        "  │  Cluster Workstation                         │".to_string(),
        "  │  k=kubectl   kk='kubectl krew'   completion  │".to_string(),
        "  ╰──────────────────────────────────────────────╯".to_string(),
        String::new(),
    ];

    if !tools.is_empty() {
        lines.push(format!("  Host tools: {}", tools.join(", ")));
        lines.push("  k ssh-jump: reach nodes through the jump host".to_string());
    }

    if !extensions.is_empty() {
        lines.push(format!("  Installed plugins: {}", extensions.join(", ")));
    }

    lines.push("  Ready. Try: kk list | k9s | zellij | k ssh-jump".to_string());
    lines.push(String::new());

    let mut banner = lines.join(LINE_END);
    banner.push_str(LINE_END);
    banner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::{ExtensionError, Result};
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::time::Instant;

    /// Listing that answers after a delay.
    struct SlowListing {
        delay: Duration,
        output: Result<String>,
    }

    impl SlowListing {
        fn answer(&self) -> Result<String> {
            match &self.output {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(ExtensionError::InvalidName("x".into())),
            }
        }
    }

    impl ExtensionManager for SlowListing {
        fn list_installed(&self) -> BoxFuture<'_, Result<String>> {
            async move {
                tokio::time::sleep(self.delay).await;
                self.answer()
            }
            .boxed()
        }
        fn search(&self) -> BoxFuture<'_, Result<String>> {
            async { Ok(String::new()) }.boxed()
        }
        fn update_index(&self) -> BoxFuture<'_, Result<String>> {
            async { Ok(String::new()) }.boxed()
        }
        fn install<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<String>> {
            async { Ok(String::new()) }.boxed()
        }
        fn uninstall<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<String>> {
            async { Ok(String::new()) }.boxed()
        }
        fn upgrade<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<String>> {
            async { Ok(String::new()) }.boxed()
        }
    }

    fn composer(delay: Duration, output: Result<String>, timeout: Duration) -> WelcomeComposer {
        WelcomeComposer::new(
            Arc::new(SlowListing { delay, output }),
            &ExtensionsConfig::default(),
        )
        .with_timeout(timeout)
        .with_host_tools(Vec::new())
    }

    #[test]
    fn test_banner_minimal() {
        let banner = render_banner(&[], &[]);
        assert!(banner.contains("Cluster Workstation"));
        assert!(banner.contains("Ready. Try:"));
        assert!(!banner.contains("Host tools"));
        assert!(!banner.contains("ssh-jump: reach"));
        assert!(!banner.contains("Installed plugins"));
    }

    #[test]
    fn test_banner_sections() {
        let banner = render_banner(
            &["crictl".to_string(), "ssh".to_string()],
            &["ctx".to_string(), "ns".to_string()],
        );
        assert!(banner.contains("  Host tools: crictl, ssh\r\n"));
        assert!(banner.contains("ssh-jump: reach nodes"));
        assert!(banner.contains("  Installed plugins: ctx, ns\r\n"));
    }

    #[test]
    fn test_banner_line_endings() {
        let banner = render_banner(&["ssh".to_string()], &["ctx".to_string()]);
        assert!(banner.ends_with("\r\n"));
        // No bare LF anywhere.
        assert_eq!(banner.matches('\n').count(), banner.matches("\r\n").count());
    }

    #[test]
    fn test_detect_host_tools() {
        let found = detect_host_tools(&[
            "sh".to_string(),
            "definitely-not-a-tool-xyz".to_string(),
        ]);
        assert_eq!(found, vec!["sh"]);
    }

    #[tokio::test]
    async fn test_compose_includes_plugins() {
        let composer = composer(
            Duration::ZERO,
            Ok("PLUGIN VERSION\nctx v0.9.5\nns v0.9.5\n".to_string()),
            Duration::from_secs(5),
        );
        let banner = composer.compose().await;
        assert!(banner.contains("Installed plugins: ctx, ns"));
    }

    #[tokio::test]
    async fn test_compose_listing_failure() {
        let composer = composer(
            Duration::ZERO,
            Err(ExtensionError::InvalidName("x".into())),
            Duration::from_secs(5),
        );
        let banner = composer.compose().await;
        assert!(!banner.contains("Installed plugins"));
        assert!(banner.contains("Ready."));
    }

    #[tokio::test]
    async fn test_compose_respects_timeout() {
        let composer = composer(
            Duration::from_secs(30),
            Ok("PLUGIN VERSION\nctx v0.9.5\n".to_string()),
            Duration::from_millis(100),
        );

        let start = Instant::now();
        let banner = composer.compose().await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!banner.contains("Installed plugins"));
        assert!(banner.contains("Ready."));
    }
}
