//! Occurrence counter: keeps a stack's total and first/last occurrence
//! bounds correct under concurrent increments.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::dedup::StackCache;
use super::{MAX_UPDATE_ATTEMPTS, bounded};
use crate::cache::Cache;
use crate::notify::{Notification, Notifier};
use crate::store::{DocumentStore, UpdateOutcome};
use crate::types::{CoreError, Stack, StoreError};

/// Apply `count` occurrences spanning `[min, max]` to `stack`.
///
/// Returns `true` when the stack was fixed before `max` and is now regressed.
pub fn apply_occurrences(stack: &mut Stack, min: DateTime<Utc>, max: DateTime<Utc>, count: i64) -> bool {
    if stack.total_occurrences == 0 {
        stack.first_occurrence = min;
        stack.last_occurrence = max;
    } else {
        if stack.first_occurrence > min {
            stack.first_occurrence = min;
        }
        if stack.last_occurrence < max {
            stack.last_occurrence = max;
        }
    }
    stack.total_occurrences += count;

    let regressed = stack.is_fixed && stack.date_fixed.is_none_or(|fixed| fixed < max);
    if regressed {
        stack.is_fixed = false;
        stack.is_regressed = true;
    }
    regressed
}

pub struct OccurrenceCounter<S, C, N> {
    store: Arc<S>,
    cache: Arc<C>,
    stacks: StackCache<C>,
    notifier: Arc<N>,
    timeout: Duration,
    debounce: Duration,
    publish_changes: bool,
}

impl<S, C, N> OccurrenceCounter<S, C, N>
where
    S: DocumentStore,
    C: Cache,
    N: Notifier,
{
    pub fn new(
        store: Arc<S>,
        cache: Arc<C>,
        notifier: Arc<N>,
        timeout: Duration,
        debounce: Duration,
        publish_changes: bool,
    ) -> Self {
        let stacks = StackCache::new(cache.clone(), timeout);
        Self {
            store,
            cache,
            stacks,
            notifier,
            timeout,
            debounce,
            publish_changes,
        }
    }

    /// Add `count` occurrences observed between `min` and `max` to a stack.
    ///
    /// Returns the updated stack, or `None` when the update was dropped on a
    /// transient failure. Running out of conflict retries is reported as
    /// [`CoreError::RetriesExhausted`].
    pub async fn increment(
        &self,
        stack_id: &str,
        min: DateTime<Utc>,
        max: DateTime<Utc>,
        count: i64,
    ) -> Result<Option<Stack>, CoreError> {
        let (min, max) = if min > max { (max, min) } else { (min, max) };
        let regressed = AtomicBool::new(false);

        let result = bounded(
            self.timeout,
            self.store
                .update_stack(stack_id, MAX_UPDATE_ATTEMPTS, |stack| {
                    if count <= 0 {
                        return false;
                    }
                    regressed.store(apply_occurrences(stack, min, max, count), Ordering::Relaxed);
                    true
                }),
        )
        .await;

        let (stack, updated) = match settle(stack_id, result)? {
            Some(outcome) => {
                let updated = outcome.was_updated();
                (outcome.into_inner(), updated)
            }
            None => return Ok(None),
        };

        if updated {
            debug!(stack_id, count, total = stack.total_occurrences, "stack occurrences updated");
            self.stacks.invalidate(&stack).await;
            if regressed.load(Ordering::Relaxed) {
                info!(stack_id, "stack regressed");
                self.notifier.publish(
                    Notification::StackRegressed {
                        tenant_id: stack.tenant_id.clone(),
                        project_id: stack.project_id.clone(),
                        stack_id: stack.id.clone(),
                    },
                    None,
                );
            }
            self.publish_changed(&stack).await;
        }

        Ok(Some(stack))
    }

    /// Publish at most one change notification per stack per debounce window.
    async fn publish_changed(&self, stack: &Stack) {
        if !self.publish_changes {
            return;
        }

        let key = format!("stack-changed:{}", stack.id);
        let window = self.debounce.max(Duration::from_secs(1));
        let first = match bounded(self.timeout, self.cache.increment(&key, 1, window, 0)).await {
            Ok(n) => n == 1,
            Err(e) => {
                debug!(stack_id = %stack.id, error = %e, "debounce check failed; publishing anyway");
                true
            }
        };

        if first {
            self.notifier.publish(
                Notification::StackChanged {
                    tenant_id: stack.tenant_id.clone(),
                    project_id: stack.project_id.clone(),
                    stack_id: stack.id.clone(),
                },
                (!self.debounce.is_zero()).then_some(self.debounce),
            );
        }
    }
}

/// Decide what a conditional update result means for the caller.
fn settle(
    stack_id: &str,
    result: Result<UpdateOutcome<Stack>, StoreError>,
) -> Result<Option<UpdateOutcome<Stack>>, CoreError> {
    match result {
        Ok(outcome) => Ok(Some(outcome)),
        Err(StoreError::Conflict { attempts, .. }) => {
            warn!(stack_id, attempts, "dropping occurrence update after repeated conflicts");
            Err(CoreError::RetriesExhausted {
                stack_id: stack_id.to_string(),
                attempts,
            })
        }
        Err(StoreError::NotFound(_)) => Err(CoreError::StackNotFound(stack_id.to_string())),
        Err(e) if e.is_transient() => {
            warn!(stack_id, error = %e, "dropping occurrence update");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::cache::MemoryCache;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::{SqliteStore, open_store};
    use crate::types::NewStack;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, minute, 0).unwrap()
    }

    async fn setup() -> (
        tempfile::TempDir,
        Arc<SqliteStore>,
        Arc<RecordingNotifier>,
        OccurrenceCounter<SqliteStore, MemoryCache, RecordingNotifier>,
        Stack,
    ) {
        let (dir, store) = open_store().await;
        let store = Arc::new(store);
        let stack = NewStack {
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            title: "boom".into(),
            first_seen: at(30),
        }
        .into_stack("sig");
        store.insert_stack(&stack).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let counter = OccurrenceCounter::new(
            store.clone(),
            Arc::new(MemoryCache::new()),
            notifier.clone(),
            TIMEOUT,
            Duration::from_secs(5),
            true,
        );
        (dir, store, notifier, counter, stack)
    }

    #[test]
    fn test_first_increment_sets_both_bounds() {
        let mut stack = NewStack {
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            title: "boom".into(),
            first_seen: at(59),
        }
        .into_stack("sig");

        apply_occurrences(&mut stack, at(10), at(20), 2);
        assert_eq!(stack.first_occurrence, at(10));
        assert_eq!(stack.last_occurrence, at(20));
        assert_eq!(stack.total_occurrences, 2);
    }

    #[test]
    fn test_bounds_only_widen() {
        let mut stack = NewStack {
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            title: "boom".into(),
            first_seen: at(0),
        }
        .into_stack("sig");

        apply_occurrences(&mut stack, at(10), at(20), 1);
        apply_occurrences(&mut stack, at(12), at(15), 1);
        assert_eq!(stack.first_occurrence, at(10));
        assert_eq!(stack.last_occurrence, at(20));

        apply_occurrences(&mut stack, at(5), at(40), 3);
        assert_eq!(stack.first_occurrence, at(5));
        assert_eq!(stack.last_occurrence, at(40));
        assert_eq!(stack.total_occurrences, 5);
    }

    #[test]
    fn test_regression_only_after_fix_date() {
        let mut stack = NewStack {
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            title: "boom".into(),
            first_seen: at(0),
        }
        .into_stack("sig");
        stack.is_fixed = true;
        stack.date_fixed = Some(at(30));

        assert!(!apply_occurrences(&mut stack, at(10), at(20), 1));
        assert!(stack.is_fixed);

        assert!(apply_occurrences(&mut stack, at(40), at(40), 1));
        assert!(!stack.is_fixed);
        assert!(stack.is_regressed);
    }

    #[test]
    fn test_exhausted_retries_surface() {
        let result = settle(
            "s1",
            Err(StoreError::Conflict {
                id: "s1".into(),
                attempts: 3,
            }),
        );
        assert!(matches!(
            result,
            Err(CoreError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_timeout_drops_update() {
        assert!(settle("s1", Err(StoreError::Timeout)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_updates_store_and_notifies_once() {
        let (_dir, store, notifier, counter, stack) = setup().await;

        counter.increment(&stack.id, at(20), at(10), 2).await.unwrap();
        counter.increment(&stack.id, at(25), at(25), 1).await.unwrap();

        let stored = store.get_stack(&stack.id).await.unwrap().unwrap();
        assert_eq!(stored.total_occurrences, 3);
        assert_eq!(stored.first_occurrence, at(10));
        assert_eq!(stored.last_occurrence, at(25));

        // Second change falls inside the debounce window.
        assert_eq!(notifier.count("stack_changed"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_keep_invariants() {
        let (_dir, store, _notifier, counter, stack) = setup().await;
        let counter = Arc::new(counter);

        let mut handles = Vec::new();
        for i in 0..12u32 {
            let counter = counter.clone();
            let id = stack.id.clone();
            handles.push(tokio::spawn(async move {
                counter.increment(&id, at(i), at(i + 10), 1).await
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if let Ok(Some(_)) = handle.await.unwrap() {
                applied += 1;
            }
        }

        let stored = store.get_stack(&stack.id).await.unwrap().unwrap();
        assert_eq!(stored.total_occurrences, applied);
        assert!(stored.first_occurrence <= stored.last_occurrence);
    }

    #[tokio::test]
    async fn test_regression_publishes() {
        let (_dir, store, notifier, counter, stack) = setup().await;
        store
            .update_stack(&stack.id, 1, |s| {
                s.is_fixed = true;
                s.date_fixed = Some(at(1));
                true
            })
            .await
            .unwrap();

        let updated = counter.increment(&stack.id, at(5), at(5), 1).await.unwrap().unwrap();
        assert!(updated.is_regressed);
        assert_eq!(notifier.count("stack_regressed"), 1);
    }

    #[tokio::test]
    async fn test_missing_stack_is_reported() {
        let (_dir, _store, _notifier, counter, _stack) = setup().await;
        let result = counter.increment("missing", at(1), at(1), 1).await;
        assert!(matches!(result, Err(CoreError::StackNotFound(_))));
    }
}
