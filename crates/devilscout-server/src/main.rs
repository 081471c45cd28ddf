use std::env;
use std::sync::Arc;

use anyhow::Context;
use devilscout_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use devilscout_server::{CacheContext, StaticActiveEvents, observability};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From DEVILSCOUT_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (devilscout.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (DEVILSCOUT_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );
    observability::apply_logging_level(&cfg.logging.level);

    if cfg.tba.auth_key.is_empty() {
        tracing::warn!("tba.auth_key is empty; upstream requests will be rejected");
    }

    let active = Arc::new(StaticActiveEvents::new(cfg.active.events.iter().cloned()));
    tracing::info!(events = ?cfg.active.events, "Active events configured");

    let context = CacheContext::build(&cfg, active).context("building cache context")?;

    // First ticks fire immediately, so the polling caches warm up right away
    let scheduler = context.scheduler().start();
    tracing::info!("DevilScout cache server running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;

    tracing::info!("Shutting down");
    scheduler.shutdown().await;
    context.shutdown().await;
    Ok(())
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: DEVILSCOUT_CONFIG
/// 3. Default: devilscout.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("DEVILSCOUT_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
