//! Ingest command - feed a JSON Lines file of events through the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Args;
use futures::stream::{self, StreamExt};

use crate::cache::MemoryCache;
use crate::core::Ingestor;
use crate::jobs::{WorkItem, WorkQueue};
use crate::notify::{ChannelNotifier, Notifier};
use crate::services::Services;
use crate::store::SqliteStore;
use crate::types::{IncomingEvent, IngestResult};

#[derive(Args)]
pub struct IngestCmd {
    /// JSON Lines file, one event per line
    pub file: PathBuf,

    /// Tenant the events belong to
    #[arg(long, short = 't')]
    pub tenant: String,

    /// Project the events belong to
    #[arg(long, short = 'p')]
    pub project: String,

    /// Number of batches to ingest concurrently
    #[arg(long, short = 'j', default_value = "4")]
    pub concurrency: usize,

    /// Events per batch
    #[arg(long, default_value = "100")]
    pub batch_size: usize,

    /// Skip the background retention sweep
    #[arg(long)]
    pub no_retention: bool,

    /// Print published notifications as JSON lines once ingestion finishes
    #[arg(long)]
    pub print_notifications: bool,
}

impl IngestCmd {
    pub async fn run(&self) -> Result<()> {
        let events = read_events(&self.file)?;
        if events.is_empty() {
            println!("No events in {}.", self.file.display());
            return Ok(());
        }

        let services = Services::open().await?;

        if !self.print_notifications {
            return self.ingest(&services, &services.ingestor(), events).await;
        }

        let (notifier, mut rx) = ChannelNotifier::new();
        let ingestor = services.ingestor_with(Arc::new(notifier));
        self.ingest(&services, &ingestor, events).await?;
        drop(ingestor);

        // Ends once every delayed notification has been sent.
        while let Some(notification) = rx.recv().await {
            println!("{}", serde_json::to_string(&notification)?);
        }
        Ok(())
    }

    async fn ingest<N: Notifier>(
        &self,
        services: &Services,
        ingestor: &Ingestor<SqliteStore, MemoryCache, N>,
        events: Vec<IncomingEvent>,
    ) -> Result<()> {
        let (queue, worker) = WorkQueue::start(
            services.store.clone(),
            services.clock.clone(),
            services.config.operation_timeout(),
        );
        if !self.no_retention {
            queue.enqueue(WorkItem::RetentionSweep {
                max_age_days: services.config.retention_days,
            });
        }

        let start = Instant::now();
        let total = events.len();
        let batches: Vec<Vec<IncomingEvent>> = events
            .chunks(self.batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();

        let outcomes: Vec<Result<Vec<IngestResult>>> = stream::iter(batches)
            .map(|batch| async move {
                ingestor
                    .ingest_batch(&self.tenant, &self.project, batch)
                    .await
                    .context("Ingestion failed")
            })
            .buffered(self.concurrency.max(1))
            .collect()
            .await;

        let mut accepted = 0;
        let mut line = 0;
        for outcome in outcomes {
            for result in outcome? {
                line += 1;
                if result.accepted {
                    accepted += 1;
                }
                println!(
                    "{}\t{}\t{}",
                    line,
                    result.stack_id.as_deref().unwrap_or("-"),
                    if result.accepted { "accepted" } else { "rejected" }
                );
            }
        }

        if let Err(e) = ingestor.limiter().checkpoint(&self.tenant).await {
            eprintln!("Warning: failed to checkpoint usage: {}", e);
        }

        drop(queue);
        if let Err(e) = worker.await {
            eprintln!("Warning: background worker stopped abnormally: {}", e);
        }

        println!();
        println!(
            "Ingested {}/{} events in {:.2}s",
            accepted,
            total,
            start.elapsed().as_secs_f64()
        );

        Ok(())
    }
}

fn read_events(path: &Path) -> Result<Vec<IncomingEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut events = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: IncomingEvent = serde_json::from_str(line)
            .with_context(|| format!("Invalid event on line {}", i + 1))?;
        if !event.has_signature() {
            bail!("Missing signature on line {}", i + 1);
        }
        events.push(event);
    }

    Ok(events)
}
