mod args;
mod commands;
mod config;
mod progress;
mod scan;
mod storage;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use config::SnowballConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config =
        SnowballConfig::load(cli.config.as_deref())?.with_overrides(cli.endpoint, cli.region);

    match cli.command {
        Commands::Sync(args) => commands::sync(&config, args).await,
        Commands::Upload(args) => commands::upload(&config, args).await,
        Commands::List(args) => commands::list(&config, args).await,
        Commands::Delete(args) => commands::delete(&config, args).await,
    }
}

/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,snowball=debug,libdispatch=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
