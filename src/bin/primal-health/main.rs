//! primal-health service entry point.

mod cli;

use clap::Parser;
use cli::{Cli, LogFormat};
use primal_health::ServerBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();
    let log_format = cli.log_format;

    // Build configuration
    let config = cli.into_config()?;

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    match log_format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    info!("primal-health v{}", env!("CARGO_PKG_VERSION"));

    // Build and run the service
    let mut server = ServerBuilder::new(config).build().await?;

    // Run until shutdown
    server.run().await?;

    info!("Goodbye!");
    Ok(())
}
