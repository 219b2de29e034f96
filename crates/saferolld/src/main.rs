//! saferolld: the SafeRoll daemon.
//!
//! Single binary that assembles the rollout gating service:
//! - Rollout store and per-ring health windows (in memory)
//! - Policy engine and orchestrator
//! - REST API and Prometheus endpoint
//!
//! # Usage
//!
//! ```text
//! saferolld serve --config /etc/saferoll/saferoll.toml --listen 0.0.0.0:8000
//! saferolld config --config /etc/saferoll/saferoll.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use saferoll_core::{SaferollConfig, SystemClock};
use saferoll_rollout::Orchestrator;
use saferoll_state::RolloutStore;

const DEFAULT_LOG_FILTER: &str = "info,saferolld=debug,saferoll=debug";

#[derive(Parser)]
#[command(name = "saferolld", about = "SafeRoll ring rollout daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server.
    Serve {
        /// TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to listen on, overriding `[server] listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Log output format.
        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
    /// Print the effective configuration as TOML and exit.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            listen,
            log_format,
        } => {
            init_tracing(log_format);
            let mut config = load_config(config.as_deref())?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            run_server(config).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SaferollConfig> {
    match path {
        Some(path) => SaferollConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(SaferollConfig::default()),
    }
}

async fn run_server(config: SaferollConfig) -> anyhow::Result<()> {
    config.validate()?;
    info!("SafeRoll daemon starting");

    // ── Core services ──────────────────────────────────────────

    let store = RolloutStore::new(&config, Arc::new(SystemClock));
    info!(
        window_secs = config.window.seconds,
        window_capacity = config.window.capacity,
        cooldown_secs = config.policy.promote_cooldown_secs,
        "rollout store initialized"
    );
    let orchestrator = Orchestrator::new(store, &config);

    // ── API server ─────────────────────────────────────────────

    let router = saferoll_api::build_router(orchestrator);
    let addr = config.server.listen;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("SafeRoll daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
