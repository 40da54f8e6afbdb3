//! websocksy entry point.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use websocksy::cli::Cli;
use websocksy::{FramingRegistry, Gateway, peer};

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing, honouring `RUST_LOG` when set.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("websocksy=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves when the process is asked to stop.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Interrupt received");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Cli::parse()
        .into_config()
        .context("Failed to load configuration")?;

    let framings = FramingRegistry::with_builtins();
    let resolver = peer::backend(&config, &framings).context("Failed to set up peer backend")?;

    let gateway = Gateway::bind(&config, resolver)
        .await
        .with_context(|| format!("Failed to listen on {}:{}", config.listen(), config.port()))?;

    gateway.run(interrupted()).await?;
    Ok(())
}
