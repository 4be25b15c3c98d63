//! CLI argument definitions.

use clap::{Parser, Subcommand};

use crate::commands::{
    ConfigCmd, IngestCmd, NavigateCmd, PartitionsCmd, ProjectCmd, QuotaCmd, RetentionCmd,
    StackCmd, TenantCmd,
};

#[derive(Parser)]
#[command(name = "errstack")]
#[command(about = "errstack - error stack deduplication, occurrence counting and usage limits")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage tenants and their event limits
    Tenant(TenantCmd),

    /// Manage projects
    Project(ProjectCmd),

    /// Ingest events from a JSON Lines file
    Ingest(IngestCmd),

    /// Find the previous and next event around an event
    Navigate(NavigateCmd),

    /// Show remaining quota and usage for a tenant
    Quota(QuotaCmd),

    /// Inspect, fix, hide or delete a stack
    Stack(StackCmd),

    /// Drop event partitions older than the retention period
    Retention(RetentionCmd),

    /// List event partitions or read a rolling window
    Partitions(PartitionsCmd),

    /// Manage configuration
    Config(ConfigCmd),
}

impl Command {
    pub async fn execute(&self) -> anyhow::Result<()> {
        match self {
            Command::Tenant(cmd) => cmd.run().await,
            Command::Project(cmd) => cmd.run().await,
            Command::Ingest(cmd) => cmd.run().await,
            Command::Navigate(cmd) => cmd.run().await,
            Command::Quota(cmd) => cmd.run().await,
            Command::Stack(cmd) => cmd.run().await,
            Command::Retention(cmd) => cmd.run().await,
            Command::Partitions(cmd) => cmd.run().await,
            Command::Config(cmd) => cmd.run().await,
        }
    }
}
