//! Workstation daemon.
//!
//! Serves browser shells and keeps the workstation's kubeconfig in sync
//! with the cluster manager.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use workstation::api::{self, AppState};
use workstation::config::{default_config_path, Config};
use workstation::kubeconfig::{KubeconfigMerger, KubeconfigStore, KubeconfigSync};
use workstation::upstream::UpstreamClient;

/// Workstation daemon - browser shells and kubeconfig sync.
#[derive(Parser, Debug)]
#[command(name = "workstation-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP and shell server
    Serve,

    /// Sync the kubeconfig from the cluster manager once
    Sync {
        /// API token (defaults to the configured token)
        #[arg(long, env = "RANCHER_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Merge kubeconfig files offline
    Merge {
        /// Files to merge, in priority order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write the result here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Print the default config file path instead
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Apply environment variable overrides
    config.apply_env_overrides();
    if cli.verbose {
        config.daemon.log_level = "debug".to_string();
    }

    // Validate configuration
    config.validate()?;

    let _log_guard = init_tracing(&config.daemon.log_level, config.daemon.log_dir.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Sync { token } => sync_once(config, token).await,
        Commands::Merge { files, output } => merge_files(&config, &files, output.as_deref()),
        Commands::Config { path } => {
            if path {
                println!("{}", cli.config.unwrap_or_else(default_config_path).display());
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
    }
}

/// Initializes logging. The returned guard must live as long as the process
/// when logging to files.
fn init_tracing(level: &str, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "workstation.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.server.socket_addr()?;
    tracing::info!(
        %addr,
        upstream = %config.upstream.url,
        kubeconfig = %config.kubeconfig.path.display(),
        "Workstation daemon starting"
    );

    let state = AppState::from_config(config)?;
    let sessions = state.sessions.clone();
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!(active = sessions.count(), "Closing remaining sessions");
    sessions.close_all().await;
    tracing::info!("Workstation daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

async fn sync_once(config: Config, token: Option<String>) -> anyhow::Result<()> {
    let upstream_url = config.upstream.parsed_url()?;
    let client = UpstreamClient::new(&config.upstream)?;
    let sync = KubeconfigSync::new(
        std::sync::Arc::new(client),
        KubeconfigMerger::new(&upstream_url)?,
        KubeconfigStore::new(config.kubeconfig.path.clone()),
    );

    let report = sync.sync(token.as_deref()).await?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn merge_files(config: &Config, files: &[PathBuf], output: Option<&Path>) -> anyhow::Result<()> {
    let documents = files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<String>>>()?;

    let merger = KubeconfigMerger::new(&config.upstream.parsed_url()?)?;
    let merged = merger.merge(&documents)?;

    match output {
        Some(path) => KubeconfigStore::new(path).write(&merged)?,
        None => print!("{}", merged),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_debug_assert() {
        // Verify the CLI structure is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command() {
        let cli = Cli::try_parse_from(["workstation-daemon"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::try_parse_from(["workstation-daemon", "serve", "-v"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert!(cli.verbose);
    }

    #[test]
    fn test_merge_command() {
        let cli = Cli::try_parse_from([
            "workstation-daemon",
            "merge",
            "a.yaml",
            "b.yaml",
            "--output",
            "out.yaml",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Merge { files, output }) => {
                assert_eq!(files, vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
                assert_eq!(output, Some(PathBuf::from("out.yaml")));
            }
            other => panic!("Expected Merge command, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_requires_files() {
        assert!(Cli::try_parse_from(["workstation-daemon", "merge"]).is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["workstation-daemon", "config", "--config", "/tmp/w.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.toml")));
        assert!(matches!(cli.command, Some(Commands::Config { path: false })));
    }

    #[test]
    fn test_merge_files_writes_output() {
        let temp = tempfile::tempdir().unwrap();
        let input = temp.path().join("a.yaml");
        std::fs::write(
            &input,
            "clusters:\n- name: a\n  cluster:\n    server: https://localhost:6443\ncurrent-context: a\n",
        )
        .unwrap();
        let output = temp.path().join("out").join("config");

        let mut config = Config::default();
        config.upstream.url = "https://manager.example".to_string();
        merge_files(&config, &[input], Some(&output)).unwrap();

        let merged = std::fs::read_to_string(&output).unwrap();
        assert!(merged.contains("https://manager.example:443"));
        assert!(merged.contains("insecure-skip-tls-verify: true"));
    }
}
