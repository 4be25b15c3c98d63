//! Retention command - drop event partitions past their maximum age.

use anyhow::Result;
use clap::Args;

use crate::jobs::{WorkItem, WorkQueue};
use crate::services::Services;

#[derive(Args)]
pub struct RetentionCmd {
    /// Maximum partition age in days (default: from config)
    #[arg(long)]
    pub max_age_days: Option<u32>,

    /// Run through the background work queue instead of inline
    #[arg(long)]
    pub queued: bool,
}

impl RetentionCmd {
    pub async fn run(&self) -> Result<()> {
        let services = Services::open().await?;
        let max_age_days = self.max_age_days.unwrap_or(services.config.retention_days);

        if self.queued {
            let (queue, worker) = WorkQueue::start(
                services.store.clone(),
                services.clock.clone(),
                services.config.operation_timeout(),
            );
            if !queue.enqueue(WorkItem::RetentionSweep { max_age_days }) {
                anyhow::bail!("Failed to queue retention sweep");
            }
            drop(queue);
            worker.await?;
            println!("Retention sweep finished (see log for details).");
            return Ok(());
        }

        let today = services.clock.now().date_naive();
        let dropped = services.sweeper().sweep(max_age_days, today).await?;

        if dropped.is_empty() {
            println!("No partitions older than {} days.", max_age_days);
        } else {
            println!("Dropped {} partition(s):", dropped.len());
            for date in dropped {
                println!("  {}", date);
            }
        }

        Ok(())
    }
}
