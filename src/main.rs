use anyhow::Result;
use clap::Parser;
use tracing::error;

use circular_radar::config::{Cli, Config};
use circular_radar::env_boot::{dev_mode_requested, ensure_dotenv};
use circular_radar::logging::{default_filter, init_tracing};
use circular_radar::orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let source = ensure_dotenv();
    init_tracing(default_filter(dev_mode_requested(source)))?;

    let cfg = match Config::from_cli(cli, source) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(%err, "invalid configuration");
            return Err(err);
        }
    };
    if let Err(err) = orchestrator::run(&cfg).await {
        error!(err = %format!("{err:#}"), "pipeline failed");
        return Err(err);
    }
    Ok(())
}
