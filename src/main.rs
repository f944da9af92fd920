#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;
mod plotting;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy()
                .add_directive("stellar_cnn=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
