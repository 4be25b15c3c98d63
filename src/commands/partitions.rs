//! Partitions command - list day partitions or read a rolling window.

use anyhow::Result;
use clap::Args;

use crate::services::Services;
use crate::store::DocumentStore;

#[derive(Args)]
pub struct PartitionsCmd {
    /// Show the newest events of a rolling window (e.g. today, last7days)
    #[arg(long, short = 'w')]
    pub window: Option<String>,

    /// Max events to show with --window
    #[arg(long, short = 'l', default_value = "20")]
    pub limit: usize,
}

impl PartitionsCmd {
    pub async fn run(&self) -> Result<()> {
        let services = Services::open().await?;

        if let Some(window) = &self.window {
            let events = services.store.window_events(window, self.limit).await?;
            if events.is_empty() {
                println!("No events in window '{}'.", window);
                return Ok(());
            }
            for event in events {
                println!(
                    "{}  {}  stack {}",
                    event.timestamp.to_rfc3339(),
                    event.id,
                    event.stack_id
                );
            }
            return Ok(());
        }

        let partitions = services.store.list_partitions().await?;
        if partitions.is_empty() {
            println!("No partitions yet. Run `errstack ingest` first.");
            return Ok(());
        }

        let total: i64 = partitions.iter().map(|p| p.events).sum();
        for partition in &partitions {
            println!("{}  {:<16}  {:>8} events", partition.date, partition.table, partition.events);
        }
        println!();
        println!("{} partition(s), {} event(s)", partitions.len(), total);

        let windows: Vec<&str> = services
            .config
            .rolling_windows
            .iter()
            .map(|w| w.name.as_str())
            .collect();
        if !windows.is_empty() {
            println!("Rolling windows: {}", windows.join(", "));
        }

        Ok(())
    }
}
