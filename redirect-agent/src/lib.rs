//! Redirect Agent
//!
//! Standalone service that keeps a redirect rule table in sync with a
//! persisted redirect list and serves the admin API for commands, traffic
//! observations and rule evaluation.

use anyhow::Context;
use clap::Parser;
use redirect_common::{Command, CommandResponse};
use redirect_core::admin::{self, ApiState};
use redirect_core::{JsonFileStore, LogNotifier, MemoryRuleEngine, Metrics, RedirectService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub mod config;
pub mod logging;


pub use config::AgentConfig;

#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to serve the admin API on
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Port to serve the admin API on
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// JSON state file
    #[arg(long)]
    pub store_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Do not seed example redirects into a new state file
    #[arg(long)]
    pub no_examples: bool,
}

/// Bind the configured address and run the agent
pub async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    serve_agent(config, listener).await
}

/// Run the agent on an already bound listener
pub async fn serve_agent(config: AgentConfig, listener: TcpListener) -> anyhow::Result<()> {
    // Logging should be initialized by the caller (main or test)
    let instance_id = Uuid::new_v4();
    tracing::info!("Starting Redirect Agent {}", instance_id);
    tracing::info!("  Listen: {}", listener.local_addr()?);
    tracing::info!("  Store:  {}", config.store_path.display());

    let first_install = !config.store_path.exists();
    let store = Arc::new(
        JsonFileStore::open(&config.store_path)
            .await
            .with_context(|| format!("Failed to open store {}", config.store_path.display()))?,
    );
    let engine = Arc::new(match config.rule_limit {
        Some(limit) => MemoryRuleEngine::new().with_rule_limit(limit),
        None => MemoryRuleEngine::new(),
    });
    let metrics = Arc::new(Metrics::default());

    let service = RedirectService::spawn(
        &config.service,
        store,
        engine.clone(),
        Arc::new(LogNotifier),
        metrics.clone(),
    );

    service.bootstrap(first_install).await?;
    match service.execute(Command::ReSyncRedirects).await? {
        CommandResponse::Synced { report } if !report.is_complete() => {
            tracing::warn!("{} redirect(s) could not be installed", report.failed.len());
        }
        CommandResponse::Error { message } => {
            tracing::warn!("Initial rule sync failed: {}", message);
        }
        _ => {}
    }

    admin::serve(
        listener,
        ApiState {
            service,
            engine,
            metrics,
        },
    )
    .await?;
    Ok(())
}
