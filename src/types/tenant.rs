use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PeriodKey, UsageSnapshot};

/// Unique identifier for a tenant (organization).
pub type TenantId = String;

/// Unique identifier for a project.
pub type ProjectId = String;

/// Limit value meaning "no cap".
pub const UNLIMITED: i64 = -1;

/// A tenant is the billing and quota boundary that owns projects and events.
///
/// # Usage snapshots
/// `hourly_usage` and `monthly_usage` are checkpoints of the shared usage
/// counters. They seed the counters when a period starts cold and are never
/// authoritative between checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,

    /// Display name (e.g., "Acme Corporation")
    pub name: String,

    /// Maximum accepted events per hour, or [`UNLIMITED`].
    pub hourly_limit: i64,

    /// Maximum accepted events per month, or [`UNLIMITED`].
    pub monthly_limit: i64,

    /// Extra monthly events granted on top of `monthly_limit`.
    pub bonus_events: i64,

    /// When the bonus stops counting. `None` means it never expires.
    pub bonus_expiration: Option<DateTime<Utc>>,

    pub hourly_usage: UsageSnapshot,
    pub monthly_usage: UsageSnapshot,

    /// When the usage snapshots were last written.
    pub last_checkpoint: Option<DateTime<Utc>>,

    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub version: i64,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hourly_limit: UNLIMITED,
            monthly_limit: UNLIMITED,
            bonus_events: 0,
            bonus_expiration: None,
            hourly_usage: UsageSnapshot::default(),
            monthly_usage: UsageSnapshot::default(),
            last_checkpoint: None,
            version: 0,
        }
    }

    pub fn with_limits(mut self, hourly_limit: i64, monthly_limit: i64) -> Self {
        self.hourly_limit = hourly_limit;
        self.monthly_limit = monthly_limit;
        self
    }

    pub fn with_bonus(mut self, events: i64, expiration: Option<DateTime<Utc>>) -> Self {
        self.bonus_events = events;
        self.bonus_expiration = expiration;
        self
    }

    /// Hourly cap, or `None` when unlimited.
    pub fn hourly_cap(&self) -> Option<i64> {
        (self.hourly_limit >= 0).then_some(self.hourly_limit)
    }

    /// Monthly cap including any unexpired bonus, or `None` when unlimited.
    pub fn monthly_cap_with_bonus(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.monthly_limit < 0 {
            return None;
        }

        let bonus_active = self.bonus_events > 0
            && self.bonus_expiration.is_none_or(|expires| expires > now);

        if bonus_active {
            Some(self.monthly_limit + self.bonus_events)
        } else {
            Some(self.monthly_limit)
        }
    }

    /// Both caps absent: usage tracking is skipped entirely.
    pub fn is_unlimited(&self) -> bool {
        self.hourly_limit < 0 && self.monthly_limit < 0
    }

    /// Checkpointed usage for `period`, or zeros if the snapshot is for an
    /// older period.
    pub fn usage_seed(&self, period: &PeriodKey) -> UsageSnapshot {
        let snapshot = match period {
            PeriodKey::Hourly(_) => &self.hourly_usage,
            PeriodKey::Monthly(_) => &self.monthly_usage,
        };

        if snapshot.period == period.bucket() {
            snapshot.clone()
        } else {
            UsageSnapshot::empty(period)
        }
    }
}

/// A project groups stacks and events under a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub tenant_id: TenantId,
    pub name: String,
}
