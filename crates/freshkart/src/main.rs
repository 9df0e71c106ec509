use anyhow::{Context, Result};
use clap::Parser;
use freshkart_core::{PipelineConfig, RunDate};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "FreshKart daily sales consolidation", long_about = None)]
struct Cli {
    /// Date to process, formatted YYYY-MM-DD
    date: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Validate before touching the filesystem.
    let date: RunDate = cli.date.parse().inspect_err(|err| error!(%err, "invalid date"))?;
    let config = PipelineConfig::from_env();

    let summary = freshkart_core::run(&config, date)
        .await
        .inspect_err(|err| error!(%err, "pipeline failed"))
        .with_context(|| format!("pipeline failed for {date}"))?;

    info!(
        summary = %serde_json::to_string(&summary)?,
        "sales database updated"
    );
    Ok(())
}
