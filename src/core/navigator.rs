//! Previous/next navigation over events in canonical `(timestamp, id)` order.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::bounded;
use crate::store::{DocumentStore, to_stored_precision};
use crate::types::{
    CoreError, DateRange, Event, EventFilter, EventId, EventQuery, EventRef, Scope, SortOrder,
    TimeBound,
};

/// Candidates fetched per direction. Ties wider than this on one timestamp
/// may be skipped over.
pub const MAX_TIE_CANDIDATES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Adjacent {
    pub previous: Option<EventId>,
    pub next: Option<EventId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Previous,
    Next,
}

/// Pick the neighbour of `reference` among `candidates`, which come from the
/// store already ordered away from the reference (descending for previous,
/// ascending for next) and never include the reference itself.
fn neighbour(reference: &EventRef, candidates: Vec<EventRef>, direction: Direction) -> Option<EventId> {
    let tied = candidates
        .iter()
        .any(|c| c.timestamp == reference.timestamp);

    if !tied {
        return candidates.into_iter().next().map(|c| c.id);
    }

    let mut merged = candidates;
    merged.push(reference.clone());
    merged.sort();

    let position = merged.iter().position(|c| c.id == reference.id)?;
    let target = match direction {
        Direction::Previous => position.checked_sub(1)?,
        Direction::Next => position + 1,
    };
    merged.into_iter().nth(target).map(|c| c.id)
}

pub struct EventNavigator<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: DocumentStore> EventNavigator<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn previous(
        &self,
        reference: &EventRef,
        scope: &Scope,
        filter: EventFilter,
        window: DateRange,
    ) -> Result<Option<EventId>, CoreError> {
        self.adjacent(reference, scope, filter, window, Direction::Previous)
            .await
    }

    pub async fn next(
        &self,
        reference: &EventRef,
        scope: &Scope,
        filter: EventFilter,
        window: DateRange,
    ) -> Result<Option<EventId>, CoreError> {
        self.adjacent(reference, scope, filter, window, Direction::Next)
            .await
    }

    pub async fn previous_and_next(
        &self,
        reference: &EventRef,
        scope: &Scope,
        filter: EventFilter,
        window: DateRange,
    ) -> Result<Adjacent, CoreError> {
        let (previous, next) = tokio::try_join!(
            self.previous(reference, scope, filter, window),
            self.next(reference, scope, filter, window),
        )?;
        Ok(Adjacent { previous, next })
    }

    /// Load an event by id, for callers that only hold the id.
    pub async fn event(&self, event_id: &str) -> Result<Event, CoreError> {
        bounded(self.timeout, self.store.get_event(event_id))
            .await?
            .ok_or_else(|| CoreError::EventNotFound(event_id.to_string()))
    }

    async fn adjacent(
        &self,
        reference: &EventRef,
        scope: &Scope,
        filter: EventFilter,
        window: DateRange,
        direction: Direction,
    ) -> Result<Option<EventId>, CoreError> {
        // Compare at the precision candidates come back with.
        let reference = &EventRef {
            id: reference.id.clone(),
            timestamp: to_stored_precision(reference.timestamp),
        };
        if !window.contains(reference.timestamp) {
            return Ok(None);
        }

        let (bound, sort) = match direction {
            Direction::Previous => (TimeBound::AtOrBefore(reference.timestamp), SortOrder::Descending),
            Direction::Next => (TimeBound::AtOrAfter(reference.timestamp), SortOrder::Ascending),
        };

        let query = EventQuery::new(scope.clone(), window)
            .filter(filter)
            .bound(bound)
            .exclude(reference.id.clone())
            .sort(sort)
            .page(MAX_TIE_CANDIDATES, 0);

        let candidates = bounded(self.timeout, self.store.query_event_refs(&query)).await?;
        debug!(
            event_id = %reference.id,
            ?direction,
            candidates = candidates.len(),
            "navigating events"
        );

        Ok(neighbour(reference, candidates, direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    use crate::store::{SqliteStore, open_store};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 4, 18, 30, secs).unwrap()
    }

    fn day() -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2026, 7, 4, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 7, 4, 23, 59, 59).unwrap(),
        )
    }

    fn event(id: &str, timestamp: DateTime<Utc>) -> Event {
        Event {
            id: id.into(),
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            stack_id: "s1".into(),
            timestamp,
            payload: serde_json::json!({}),
            is_fixed: false,
            is_hidden: false,
        }
    }

    async fn navigator_with(events: &[Event]) -> (tempfile::TempDir, EventNavigator<SqliteStore>) {
        let (dir, store) = open_store().await;
        for event in events {
            store.insert_event(event).await.unwrap();
        }
        (dir, EventNavigator::new(Arc::new(store), TIMEOUT))
    }

    fn r(id: &str, secs: u32) -> EventRef {
        EventRef {
            id: id.into(),
            timestamp: at(secs),
        }
    }

    #[test]
    fn test_neighbour_without_ties_takes_closest() {
        let candidates = vec![r("b", 3), r("a", 1)];
        assert_eq!(
            neighbour(&r("c", 5), candidates, Direction::Previous),
            Some("b".into())
        );
    }

    #[test]
    fn test_neighbour_tie_breaks_on_id() {
        // Order from the store does not matter once ties are merged.
        let previous = vec![r("3", 0), r("1", 0)];
        assert_eq!(
            neighbour(&r("2", 0), previous, Direction::Previous),
            Some("1".into())
        );

        let next = vec![r("1", 0), r("3", 0)];
        assert_eq!(neighbour(&r("2", 0), next, Direction::Next), Some("3".into()));

        assert_eq!(neighbour(&r("1", 0), vec![r("2", 0)], Direction::Previous), None);
    }

    #[tokio::test]
    async fn test_identical_timestamps_order_by_id() {
        let events = [event("1", at(10)), event("2", at(10)), event("3", at(10))];
        let (_dir, nav) = navigator_with(&events).await;
        let scope = Scope::Stack("s1".into());

        let adjacent = nav
            .previous_and_next(&events[1].to_ref(), &scope, EventFilter::default(), day())
            .await
            .unwrap();
        assert_eq!(adjacent.previous.as_deref(), Some("1"));
        assert_eq!(adjacent.next.as_deref(), Some("3"));

        let first = nav
            .previous_and_next(&events[0].to_ref(), &scope, EventFilter::default(), day())
            .await
            .unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.next.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_next_and_previous_agree() {
        let events = [
            event("a", at(1)),
            event("b", at(5)),
            event("c", at(5)),
            event("d", at(9)),
        ];
        let (_dir, nav) = navigator_with(&events).await;
        let scope = Scope::Project("p1".into());

        for pair in events.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let next = nav
                .next(&a.to_ref(), &scope, EventFilter::default(), day())
                .await
                .unwrap();
            assert_eq!(next.as_deref(), Some(b.id.as_str()));

            let previous = nav
                .previous(&b.to_ref(), &scope, EventFilter::default(), day())
                .await
                .unwrap();
            assert_eq!(previous.as_deref(), Some(a.id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_sub_millisecond_order_survives_storage() {
        let b_at = at(0) + chrono::Duration::microseconds(500);
        let events = [event("a", at(0)), event("b", b_at), event("c", at(0))];
        let (_dir, nav) = navigator_with(&events).await;
        let scope = Scope::Stack("s1".into());

        let stored = nav.event("b").await.unwrap();
        assert_eq!(stored.timestamp, b_at);

        for reference in [events[1].to_ref(), stored.to_ref()] {
            let previous = nav
                .previous(&reference, &scope, EventFilter::default(), day())
                .await
                .unwrap();
            assert_eq!(previous.as_deref(), Some("c"));
        }

        // Nanoseconds below storage precision still tie with the stored copy.
        let mut finer = events[1].to_ref();
        finer.timestamp += chrono::Duration::nanoseconds(300);
        let previous = nav
            .previous(&finer, &scope, EventFilter::default(), day())
            .await
            .unwrap();
        assert_eq!(previous.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_all_time_window() {
        let events = [event("a", at(1)), event("b", at(2))];
        let (_dir, nav) = navigator_with(&events).await;

        let all_time = DateRange::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC);
        let adjacent = nav
            .previous_and_next(
                &events[0].to_ref(),
                &Scope::Stack("s1".into()),
                EventFilter::default(),
                all_time,
            )
            .await
            .unwrap();
        assert_eq!(adjacent.previous, None);
        assert_eq!(adjacent.next.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_reference_outside_window_has_no_neighbours() {
        let events = [event("a", at(1)), event("b", at(2))];
        let (_dir, nav) = navigator_with(&events).await;

        let window = DateRange::new(at(30), at(40));
        let adjacent = nav
            .previous_and_next(
                &events[1].to_ref(),
                &Scope::Stack("s1".into()),
                EventFilter::default(),
                window,
            )
            .await
            .unwrap();
        assert_eq!(adjacent, Adjacent::default());
    }

    #[tokio::test]
    async fn test_filter_skips_hidden_events() {
        let mut hidden = event("b", at(2));
        hidden.is_hidden = true;
        let events = [event("a", at(1)), hidden, event("c", at(3))];
        let (_dir, nav) = navigator_with(&events).await;

        let filter = EventFilter {
            is_hidden: Some(false),
            ..Default::default()
        };
        let next = nav
            .next(&events[0].to_ref(), &Scope::Stack("s1".into()), filter, day())
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_missing_event_is_reported() {
        let (_dir, nav) = navigator_with(&[]).await;
        assert!(matches!(
            nav.event("nope").await,
            Err(CoreError::EventNotFound(_))
        ));
    }
}
