//! Ingestion-time and query-time aggregation core.
//!
//! Every component talks to the outside world only through the injected
//! [`DocumentStore`](crate::store::DocumentStore), [`Cache`](crate::cache::Cache)
//! and [`Notifier`](crate::notify::Notifier). Cross-worker coordination goes
//! through the store's conditional update or the cache's atomic increments;
//! nothing here takes an in-process lock.

#![allow(dead_code)]

mod clock;
mod counter;
mod dedup;
mod ingest;
mod navigator;
mod retention;
mod stacks;
mod usage;

pub use clock::{Clock, SystemClock};
pub use counter::OccurrenceCounter;
pub use dedup::{StackCache, StackResolver};
pub use ingest::{IngestOptions, Ingestor};
pub use navigator::{Adjacent, EventNavigator, MAX_TIE_CANDIDATES};
pub use retention::RetentionSweeper;
pub use stacks::{StackManager, StatusChange};
pub use usage::UsageLimiter;

#[cfg(test)]
pub(crate) use clock::ManualClock;

use std::future::Future;
use std::time::Duration;

use crate::types::{CacheError, StoreError};

/// Attempts allowed for a conditional document update.
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Errors that have a timeout variant.
pub(crate) trait TimedOut {
    fn timed_out() -> Self;
}

impl TimedOut for StoreError {
    fn timed_out() -> Self {
        StoreError::Timeout
    }
}

impl TimedOut for CacheError {
    fn timed_out() -> Self {
        CacheError::Timeout
    }
}

/// Run a store or cache call with an upper bound on its duration.
pub(crate) async fn bounded<T, E, F>(limit: Duration, op: F) -> Result<T, E>
where
    E: TimedOut,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, StoreError>(())
        };
        let result = bounded(Duration::from_secs(1), slow).await;
        assert!(matches!(result, Err(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, CacheError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
