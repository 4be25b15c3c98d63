use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, ProjectId, StackId, TenantId};

/// Which events a query is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Scope {
    Stack(StackId),
    Project(ProjectId),
    Tenant(TenantId),
}

impl Scope {
    pub fn column(&self) -> &'static str {
        match self {
            Scope::Stack(_) => "stack_id",
            Scope::Project(_) => "project_id",
            Scope::Tenant(_) => "tenant_id",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Scope::Stack(id) | Scope::Project(id) | Scope::Tenant(id) => id,
        }
    }
}

/// Optional narrowing on the projected stack flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub is_fixed: Option<bool>,
    pub is_hidden: Option<bool>,
}

/// Inclusive `[start, end]` time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    /// First and last UTC day the window touches, or `None` when the
    /// window is inverted.
    pub fn day_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        if self.start > self.end {
            return None;
        }
        Some((self.start.date_naive(), self.end.date_naive()))
    }
}

/// Inclusive bound on the timestamp relative to a reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    AtOrBefore(DateTime<Utc>),
    AtOrAfter(DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// An eagerly built event query: scope, filter, window, sort and page.
/// Results are ordered by `(timestamp, id)` in `sort` direction.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub scope: Scope,
    pub filter: EventFilter,
    pub range: DateRange,
    pub bound: Option<TimeBound>,
    pub exclude_id: Option<EventId>,
    pub sort: SortOrder,
    pub limit: usize,
    pub offset: usize,
}

impl EventQuery {
    pub fn new(scope: Scope, range: DateRange) -> Self {
        Self {
            scope,
            filter: EventFilter::default(),
            range,
            bound: None,
            exclude_id: None,
            sort: SortOrder::Ascending,
            limit: 100,
            offset: 0,
        }
    }

    pub fn filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn bound(mut self, bound: TimeBound) -> Self {
        self.bound = Some(bound);
        self
    }

    pub fn exclude(mut self, id: impl Into<String>) -> Self {
        self.exclude_id = Some(id.into());
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}
