//! Row models and conversions for the SQLite store.
//!
//! Instants are stored as Unix microseconds so that ordering by
//! `(timestamp, id)` is a plain integer/text comparison.

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::FromRow;

use crate::types::{Event, EventRef, Project, Stack, StoreError, Tenant, UsageSnapshot};

/// Sub-microsecond precision is not stored; callers that must read back
/// exactly what they wrote truncate with [`to_stored_precision`] first.
pub fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub fn from_micros(us: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {us}")))
}

fn from_micros_opt(us: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    us.map(from_micros).transpose()
}

/// `at` as it will read back from the store.
pub fn to_stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

// ============================================================================
// Tenant Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: String,
    pub name: String,
    pub hourly_limit: i64,
    pub monthly_limit: i64,
    pub bonus_events: i64,
    pub bonus_expiration: Option<i64>,
    pub hourly_usage: String,
    pub monthly_usage: String,
    pub last_checkpoint: Option<i64>,
    pub version: i64,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(Tenant {
            id: row.id,
            name: row.name,
            hourly_limit: row.hourly_limit,
            monthly_limit: row.monthly_limit,
            bonus_events: row.bonus_events,
            bonus_expiration: from_micros_opt(row.bonus_expiration)?,
            hourly_usage: serde_json::from_str::<UsageSnapshot>(&row.hourly_usage)?,
            monthly_usage: serde_json::from_str::<UsageSnapshot>(&row.monthly_usage)?,
            last_checkpoint: from_micros_opt(row.last_checkpoint)?,
            version: row.version,
        })
    }
}

// ============================================================================
// Project Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
        }
    }
}

// ============================================================================
// Stack Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct StackRow {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub signature_hash: String,
    pub title: String,
    pub first_occurrence: i64,
    pub last_occurrence: i64,
    pub total_occurrences: i64,
    pub is_fixed: bool,
    pub date_fixed: Option<i64>,
    pub is_hidden: bool,
    pub is_regressed: bool,
    pub created_at: i64,
    pub version: i64,
}

impl TryFrom<StackRow> for Stack {
    type Error = StoreError;

    fn try_from(row: StackRow) -> Result<Self, Self::Error> {
        Ok(Stack {
            id: row.id,
            tenant_id: row.tenant_id,
            project_id: row.project_id,
            signature_hash: row.signature_hash,
            title: row.title,
            first_occurrence: from_micros(row.first_occurrence)?,
            last_occurrence: from_micros(row.last_occurrence)?,
            total_occurrences: row.total_occurrences,
            is_fixed: row.is_fixed,
            date_fixed: from_micros_opt(row.date_fixed)?,
            is_hidden: row.is_hidden,
            is_regressed: row.is_regressed,
            created_at: from_micros(row.created_at)?,
            version: row.version,
        })
    }
}

// ============================================================================
// Event Models
// ============================================================================

/// Columns of every partition table, in table order.
pub const EVENT_COLUMNS: &str =
    "id, tenant_id, project_id, stack_id, timestamp, payload, is_fixed, is_hidden";

/// Columns selected for ordering-only queries.
pub const EVENT_REF_COLUMNS: &str = "id, timestamp";

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub stack_id: String,
    pub timestamp: i64,
    pub payload: String,
    pub is_fixed: bool,
    pub is_hidden: bool,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            tenant_id: row.tenant_id,
            project_id: row.project_id,
            stack_id: row.stack_id,
            timestamp: from_micros(row.timestamp)?,
            payload: serde_json::from_str(&row.payload)?,
            is_fixed: row.is_fixed,
            is_hidden: row.is_hidden,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct EventRefRow {
    pub id: String,
    pub timestamp: i64,
}

impl TryFrom<EventRefRow> for EventRef {
    type Error = StoreError;

    fn try_from(row: EventRefRow) -> Result<Self, Self::Error> {
        Ok(EventRef {
            id: row.id,
            timestamp: from_micros(row.timestamp)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_micros_preserve_ordering() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(500);
        assert!(to_micros(a) < to_micros(b));
        assert_eq!(from_micros(to_micros(b)).unwrap(), b);
    }

    #[test]
    fn test_stored_precision_round_trips() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_500_700);
        let stored = to_stored_precision(at);
        assert_eq!(stored.timestamp_subsec_nanos(), 1_500_000);
        assert_eq!(from_micros(to_micros(at)).unwrap(), stored);
    }

    #[test]
    fn test_out_of_range_micros_is_corrupt() {
        assert!(matches!(from_micros(i64::MAX), Err(StoreError::Corrupt(_))));
    }
}
