mod cli;
mod control;
mod engine;
mod io;
mod model;
mod report;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let default_level = if args.silent {
        tracing::Level::ERROR
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    cli::run(args).await
}
