use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Usage counting period. The bucket string is part of every counter key, so
/// a new hour or month starts from a fresh key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKey {
    /// (year, month, day, hour)
    Hourly(DateTime<Utc>),
    /// (year, month)
    Monthly(DateTime<Utc>),
}

impl PeriodKey {
    pub fn hourly(now: DateTime<Utc>) -> Self {
        Self::Hourly(now)
    }

    pub fn monthly(now: DateTime<Utc>) -> Self {
        Self::Monthly(now)
    }

    /// Bucket identifier, e.g. `2026-10-17T05` or `2026-10`.
    pub fn bucket(&self) -> String {
        match self {
            PeriodKey::Hourly(at) => format!(
                "{:04}-{:02}-{:02}T{:02}",
                at.year(),
                at.month(),
                at.day(),
                at.hour()
            ),
            PeriodKey::Monthly(at) => format!("{:04}-{:02}", at.year(), at.month()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKey::Hourly(_) => "hourly",
            PeriodKey::Monthly(_) => "monthly",
        }
    }

    /// Counter lifetime: a little longer than the period itself.
    pub fn ttl(&self) -> Duration {
        match self {
            PeriodKey::Hourly(_) => Duration::from_secs(61 * 60),
            PeriodKey::Monthly(_) => Duration::from_secs(32 * 24 * 60 * 60),
        }
    }
}

/// Durable checkpoint of one period's usage counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Bucket this snapshot belongs to (see [`PeriodKey::bucket`]).
    pub period: String,
    pub total: i64,
    pub blocked: i64,
    pub too_big: i64,
}

impl UsageSnapshot {
    pub fn empty(period: &PeriodKey) -> Self {
        Self {
            period: period.bucket(),
            ..Default::default()
        }
    }
}

/// Remaining monthly quota for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemainingQuota {
    Unlimited,
    Remaining(i64),
}

impl std::fmt::Display for RemainingQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemainingQuota::Unlimited => write!(f, "unlimited"),
            RemainingQuota::Remaining(n) => write!(f, "{}", n),
        }
    }
}

/// Current usage as seen by the shared counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub hourly: UsageSnapshot,
    pub monthly: UsageSnapshot,
}

/// Outcome of a single usage increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageDecision {
    pub over_limit: bool,
    /// Portion of the batch attributed as blocked.
    pub blocked: i64,
    pub just_went_over_hourly: bool,
    pub just_went_over_monthly: bool,
    pub checkpointed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bucket_format() {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 7, 59, 59).unwrap();
        assert_eq!(PeriodKey::hourly(at).bucket(), "2026-01-05T07");
        assert_eq!(PeriodKey::monthly(at).bucket(), "2026-01");
    }

    #[test]
    fn test_ttl_outlives_period() {
        let at = Utc::now();
        assert!(PeriodKey::hourly(at).ttl() > Duration::from_secs(3600));
        assert!(PeriodKey::monthly(at).ttl() > Duration::from_secs(31 * 24 * 3600));
    }
}
