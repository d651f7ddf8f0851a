//! Dustsweep Daemon
//!
//! Intake and streaming server for dust sweeps.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (stub providers)
//! cargo run -p dustsweepd
//!
//! # Start against LI.FI
//! DUSTSWEEP_LIFI_BASE_URL=https://li.quest/v1 DUSTSWEEP_API_PORT=8081 cargo run -p dustsweepd
//! ```
//!
//! # Environment Variables
//!
//! - `DUSTSWEEP_ENV`: Environment (test, development, production)
//! - `DUSTSWEEP_API_HOST`: API host (default: 0.0.0.0)
//! - `DUSTSWEEP_API_PORT`: API port (default: 8080)
//! - `DUSTSWEEP_TREASURY_ADDRESS`: Protocol fee recipient (required in production)
//! - `DUSTSWEEP_CONTEXT_TTL_SECS`: Intent lifetime before streaming (default: 300)
//! - `DUSTSWEEP_LIFI_BASE_URL`, `DUSTSWEEP_ODOS_BASE_URL`: Route providers; stubs are used when both are unset
//! - `DUSTSWEEP_BINANCE_BASE_URL`: Native asset price source

use dustsweepd::{Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("dustsweepd=info".parse()?))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        stub_providers = config.uses_stub_providers(),
        "Dustsweep Daemon"
    );

    // Create and run daemon
    let daemon = Daemon::from_config(config);
    daemon.run().await?;

    Ok(())
}
