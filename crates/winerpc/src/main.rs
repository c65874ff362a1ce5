//! winerpc - Discord rich presence for applications running under Wine.
//!
//! Loads `config.json`, watches the process table for known applications and
//! publishes what is running to the local Discord client until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use winerpc_core::config::AppConfig;
use winerpc_core::{
    AppRegistry, CancellationToken, Config, LocalSocketConnector, MainLoop, PluginTaskState,
    RuntimeContext, SysinfoLister,
};

#[derive(Parser, Debug)]
#[command(name = "winerpc")]
#[command(about = "Discord rich presence for applications running under Wine")]
struct Args {
    /// Path to the config file
    #[arg(short, long, default_value = AppConfig::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the process poll interval from the config file
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

/// Default log filter; `RUST_LOG` takes precedence.
fn default_filter(debug: bool) -> &'static str {
    if debug {
        "winerpc=debug,winerpc_core=debug,info"
    } else {
        "info"
    }
}

/// Read the config file and apply command line overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("cannot start without {}", args.config.display()))?;

    if let Some(poll_interval_ms) = args.poll_interval_ms {
        config.poll_interval_ms = poll_interval_ms;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(args.debug)));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting {}", AppConfig::APP_NAME);

    let config = load_config(&args)?;
    let registry = AppRegistry::load_or_empty(&config.app_list_path);
    info!(
        "Client id {}, {} known apps, plugins: {:?}",
        config.app_id,
        registry.len(),
        config.plugins
    );

    let shutdown = CancellationToken::new();
    let ctx = Arc::new(RuntimeContext::new(
        Arc::new(config),
        Arc::new(registry),
        Arc::new(LocalSocketConnector::new()),
        shutdown.clone(),
    ));

    // Wait for shutdown signal
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => warn!("Cannot listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    let report = MainLoop::new(ctx, SysinfoLister::new()).run().await;

    for task in &report {
        match &task.state {
            PluginTaskState::Failed(reason) => warn!("Plugin {} failed: {}", task.name, reason),
            state => info!("Plugin {}: {}", task.name, state),
        }
    }

    info!("Exited cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(config: PathBuf, poll_interval_ms: Option<u64>) -> Args {
        Args {
            config,
            debug: false,
            poll_interval_ms,
        }
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::try_parse_from(["winerpc"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.json"));
        assert!(!args.debug);
        assert!(args.poll_interval_ms.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::try_parse_from([
            "winerpc",
            "--config",
            "/etc/winerpc.json",
            "--debug",
            "--poll-interval-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(args.config, PathBuf::from("/etc/winerpc.json"));
        assert!(args.debug);
        assert_eq!(args.poll_interval_ms, Some(250));
    }

    #[test]
    fn test_default_filter_parses() {
        for debug in [false, true] {
            assert!(default_filter(debug).parse::<EnvFilter>().is_ok());
        }
        assert!(default_filter(true).contains("winerpc_core=debug"));
    }

    #[test]
    fn test_missing_config_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_config(&args(temp_dir.path().join("config.json"), None));
        assert!(result.is_err());
    }

    #[test]
    fn test_poll_interval_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"app_id": "123", "poll_interval_ms": 5000}"#).unwrap();

        let config = load_config(&args(path, Some(250))).unwrap();

        assert_eq!(config.app_id, "123");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.app_list_path, temp_dir.path().join("apps.json"));
    }
}
