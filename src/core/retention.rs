use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use tracing::{info, warn};

use super::bounded;
use crate::store::DocumentStore;
use crate::types::CoreError;

/// Drops day partitions older than a maximum age.
pub struct RetentionSweeper<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: DocumentStore> RetentionSweeper<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Drop every partition whose day is more than `max_age_days` before
    /// `today`. Returns the dropped days, oldest first.
    pub async fn sweep(&self, max_age_days: u32, today: NaiveDate) -> Result<Vec<NaiveDate>, CoreError> {
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(max_age_days)))
            .unwrap_or(NaiveDate::MIN);

        let partitions = bounded(self.timeout, self.store.list_partitions()).await?;
        let mut dropped = Vec::new();

        for partition in partitions.iter().filter(|p| p.date < cutoff) {
            match bounded(self.timeout, self.store.drop_partition(partition.date)).await {
                Ok(true) => {
                    info!(
                        partition = %partition.table,
                        events = partition.events,
                        "dropped expired partition"
                    );
                    dropped.push(partition.date);
                }
                Ok(false) => {}
                Err(e) => {
                    // Leave the rest for the next sweep.
                    warn!(partition = %partition.table, error = %e, "failed to drop partition");
                    break;
                }
            }
        }

        info!(
            max_age_days,
            %cutoff,
            dropped = dropped.len(),
            "retention sweep finished"
        );
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::store::open_store;

    #[tokio::test]
    async fn test_sweep_drops_only_old_partitions() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);
        for day in [1, 10, 20, 28] {
            store
                .create_partition_if_absent(NaiveDate::from_ymd_opt(2026, 2, day).unwrap())
                .await
                .unwrap();
        }

        let sweeper = RetentionSweeper::new(store.clone(), Duration::from_secs(5));
        let today = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap().date_naive();
        let dropped = sweeper.sweep(15, today).await.unwrap();

        assert_eq!(
            dropped,
            vec![
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            ]
        );

        let remaining: Vec<_> = store
            .list_partitions()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.date)
            .collect();
        assert_eq!(remaining.len(), 2);

        // Nothing left to drop.
        assert!(sweeper.sweep(15, today).await.unwrap().is_empty());
    }
}
