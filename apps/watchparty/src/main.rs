use clap::Parser;
use tracing::debug;
use watchparty_core::cli::{self, Cli};
use watchparty_core::metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let result = cli::execute(cli).await;
    debug!(target: "watchparty::client", metrics = %metrics::render(), "final metrics");
    result.map_err(anyhow::Error::from)
}
