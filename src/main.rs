mod cli;
mod config;
mod encoder;
mod error;
mod integration;
mod logging;
mod output;
mod placeholder;
mod protocol;
mod receiver;
mod relay;
mod resolver;
mod watcher;

use anyhow::{Result, anyhow};
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose).map_err(|e| anyhow!("failed to initialise logging: {e}"))?;

    match cli.command {
        Commands::Watch(args) => {
            let json = args.json;
            let options = args.into_options()?;
            relay::run(options, json).await?;
        }
        Commands::Receive => {
            let stats = receiver::serve_stdio().await?;
            tracing::info!(
                frames = stats.frames,
                written = stats.written,
                removed = stats.removed,
                skipped = stats.skipped,
                "input closed"
            );
        }
    }

    Ok(())
}
