use anyhow::{Result, anyhow};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;
mod runtime;
mod telemetry;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load(cli.config.as_deref())
        .map_err(|e| anyhow!("Failed to load configuration: {e}"))?;

    // Logs go to stderr so --json output stays parseable.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.logging_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let metrics = telemetry::install_metrics(&config.observability);

    let result = match cli.command {
        Commands::Sync(args) => commands::sync::run(args, config).await,
        Commands::Batch(args) => commands::batch::run(args, config).await,
        Commands::Validate(args) => commands::validate::run(args, config).await,
        Commands::Orphans(args) => commands::orphans::run(args, config).await,
        Commands::Audit(args) => commands::audit::run(args, config).await,
        Commands::InitSchema(args) => commands::schema::run(args, config).await
    };

    if let Some(handle) = metrics {
        tracing::debug!(snapshot = %handle.render(), "Sync metrics");
    }

    if let Err(e) = result {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
