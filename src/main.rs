//! errstack - stack deduplication, occurrence counting and usage limiting
//! for error telemetry ingestion.

mod cache;
mod cli;
mod commands;
mod config;
mod core;
mod jobs;
mod notify;
mod services;
mod store;
mod types;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Controlled by RUST_LOG; logs go to stderr so command output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    cli.command.execute().await
}
