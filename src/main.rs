//! Usage proxy binary.

use std::path::PathBuf;

use clap::Parser;

use usage_proxy::config::resolve_config;
use usage_proxy::lifecycle::{self, signals::shutdown_signal, Shutdown};
use usage_proxy::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "usage-proxy")]
#[command(about = "Reverse proxy to localhost backends with per-port usage counts", long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        store = ?config.store.kind,
        store_path = %config.store.path,
        "usage-proxy starting"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on(shutdown_signal());

    if let Err(e) = lifecycle::run(config, shutdown).await {
        tracing::error!(error = %e, "Fatal error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
