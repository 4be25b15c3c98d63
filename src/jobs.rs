//! Background work queue for out-of-band maintenance.
//!
//! Producers enqueue without waiting; a single spawned worker drains the
//! queue. Dropping or closing every [`WorkQueue`] handle lets the worker
//! finish what is queued and exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::{Clock, RetentionSweeper};
use crate::store::DocumentStore;

const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Drop event partitions older than `max_age_days`.
    RetentionSweep { max_age_days: u32 },
}

#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
}

impl WorkQueue {
    /// Spawn the worker and return a handle for enqueueing work.
    pub fn start<S>(store: Arc<S>, clock: Arc<dyn Clock>, timeout: Duration) -> (Self, JoinHandle<()>)
    where
        S: DocumentStore + 'static,
    {
        let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
        let sweeper = RetentionSweeper::new(store, timeout);

        let worker = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                debug!(?item, "running background job");
                match item {
                    WorkItem::RetentionSweep { max_age_days } => {
                        let today = clock.now().date_naive();
                        match sweeper.sweep(max_age_days, today).await {
                            Ok(dropped) => {
                                info!(dropped = dropped.len(), "background retention sweep done")
                            }
                            Err(e) => error!(error = %e, "background retention sweep failed"),
                        }
                    }
                }
            }
            debug!("work queue drained");
        });

        (Self { tx }, worker)
    }

    /// Queue `item` without waiting. Returns `false` if the queue is full or
    /// the worker has stopped.
    pub fn enqueue(&self, item: WorkItem) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(item)) => {
                warn!(?item, "work queue full; dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(item)) => {
                warn!(?item, "work queue closed; dropping job");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::core::ManualClock;
    use crate::store::open_store;

    #[tokio::test]
    async fn test_queued_sweep_runs_in_background() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);
        for day in [1, 25] {
            store
                .create_partition_if_absent(NaiveDate::from_ymd_opt(2026, 1, day).unwrap())
                .await
                .unwrap();
        }

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap(),
        ));
        let (queue, worker) = WorkQueue::start(store.clone(), clock, Duration::from_secs(5));

        assert!(queue.enqueue(WorkItem::RetentionSweep { max_age_days: 10 }));
        drop(queue);
        worker.await.unwrap();

        let remaining: Vec<_> = store
            .list_partitions()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.date)
            .collect();
        assert_eq!(remaining, vec![NaiveDate::from_ymd_opt(2026, 1, 25).unwrap()]);
    }
}
