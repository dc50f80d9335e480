//! Blueprint kernel admin binary.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use blueprint_kernel::cli::{self, Cli};
use blueprint_kernel::{Config, Kernel};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Cli::parse();

    let config = Config::from_env().context("failed to load configuration")?;
    info!(database_url = %config.database_url, max_depth = config.max_depth, "configuration loaded");

    let kernel = Kernel::new(&config)
        .await
        .context("failed to initialize kernel")?;

    cli::run(args.command, &kernel).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
