//! Redirect Agent Binary Entry Point

use clap::Parser;
use redirect_agent::{logging, run_agent, AgentConfig, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AgentConfig::load(&args)?;

    // Keeps the file writer flushing until exit
    let _guard = logging::init_logging(&config.logging)?;

    tokio::select! {
        result = run_agent(config) => {
            if let Err(e) = result {
                tracing::error!("Redirect agent failed: {:#}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping redirect agent...");
        }
    }

    Ok(())
}
