//! Trawl CLI
//!
//! Command-line host for the trawl engine: inspects templates and parsers,
//! and runs pipelines in a local interactive shell.

mod commands;
mod config;
mod shell;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::{Config, EngineArgs};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "trawl")]
#[command(about = "Chained reconnaissance pipelines over an interactive shell", long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so parser output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trawl_cli=info,trawl_engine=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.engine)?;

    handle_command(cli.command, &config).await
}
