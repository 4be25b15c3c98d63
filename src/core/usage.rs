//! Per-tenant usage limiting over shared cache counters.
//!
//! Each tenant has an hourly and a monthly family of counters (`total`,
//! `blocked`, `too-big`). Counters are seeded from the tenant's durable
//! snapshot when a period starts cold, and checkpointed back to the store on a
//! threshold crossing or once the checkpoint interval has elapsed.
//!
//! Threshold-crossing detection is approximate under concurrency: two racing
//! increments may both or neither observe the crossing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::{MAX_UPDATE_ATTEMPTS, bounded};
use crate::cache::Cache;
use crate::notify::{Notification, Notifier};
use crate::store::DocumentStore;
use crate::types::{
    CoreError, PeriodKey, RemainingQuota, Tenant, UsageDecision, UsageReport, UsageSnapshot,
};

const TOTAL: &str = "total";
const BLOCKED: &str = "blocked";
const TOO_BIG: &str = "too-big";

/// Lifetime of the last-checkpoint marker.
const MARKER_TTL: Duration = Duration::from_secs(32 * 24 * 60 * 60);

fn counter_key(tenant_id: &str, period: &PeriodKey, field: &str) -> String {
    format!(
        "usage:{}:{}:{}:{}",
        tenant_id,
        period.as_str(),
        period.bucket(),
        field
    )
}

fn marker_key(tenant_id: &str) -> String {
    format!("usage:{}:checkpointed-at", tenant_id)
}

/// Counter totals observed right after this call's increments.
#[derive(Debug, Clone, Copy)]
struct Totals {
    hourly: i64,
    hourly_blocked: i64,
    monthly: i64,
    monthly_blocked: i64,
}

/// Portion of `count` that pushed a counter past its cap.
///
/// The monthly cap is consulted first; when the batch alone is larger than
/// the remaining headroom, or larger than the cap, the whole batch is blocked.
fn blocked_amount(count: i64, totals: Totals, hourly_cap: Option<i64>, monthly_cap: Option<i64>) -> i64 {
    let monthly_effective = totals.monthly - totals.monthly_blocked;
    let hourly_effective = totals.hourly - totals.hourly_blocked;

    let blocked = match (monthly_cap, hourly_cap) {
        (Some(m), _) if count < m && monthly_effective > m => {
            if monthly_effective - count < m {
                monthly_effective - m
            } else {
                count
            }
        }
        (_, Some(h)) if count < h && hourly_effective > h => {
            if hourly_effective - count < h {
                hourly_effective - h
            } else {
                count
            }
        }
        _ => count,
    };

    blocked.clamp(0, count)
}

/// True only on the call that moved `total` from `<= cap` to `> cap`.
fn just_crossed(total: i64, count: i64, cap: Option<i64>) -> bool {
    cap.is_some_and(|cap| total > cap && total - count <= cap)
}

/// Merge live counters into a durable snapshot without ever moving it back.
fn merge_snapshot(stored: &mut UsageSnapshot, live: &UsageSnapshot) {
    if stored.period == live.period {
        stored.total = stored.total.max(live.total);
        stored.blocked = stored.blocked.max(live.blocked);
        stored.too_big = stored.too_big.max(live.too_big);
    } else if stored.period < live.period {
        *stored = live.clone();
    }
}

pub struct UsageLimiter<S, C, N> {
    store: Arc<S>,
    cache: Arc<C>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    checkpoint_interval: Duration,
}

impl<S, C, N> UsageLimiter<S, C, N>
where
    S: DocumentStore,
    C: Cache,
    N: Notifier,
{
    pub fn new(
        store: Arc<S>,
        cache: Arc<C>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        checkpoint_interval: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
            clock,
            timeout,
            checkpoint_interval,
        }
    }

    /// Count `count` incoming events (plus one too-big payload when
    /// `too_big`) against the tenant's quota.
    ///
    /// Infrastructure failures fail open: the batch is reported as not over
    /// the limit.
    pub async fn increment_usage(
        &self,
        tenant_id: &str,
        count: i64,
        too_big: bool,
    ) -> Result<UsageDecision, CoreError> {
        let tenant = match bounded(self.timeout, self.store.get_tenant(tenant_id)).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => return Err(CoreError::TenantNotFound(tenant_id.to_string())),
            Err(e) => {
                warn!(tenant_id, error = %e, "tenant lookup failed; accepting usage");
                return Ok(UsageDecision::default());
            }
        };

        Ok(self.increment_usage_for(&tenant, count, too_big).await)
    }

    /// Same as [`UsageLimiter::increment_usage`] for an already loaded tenant.
    pub async fn increment_usage_for(&self, tenant: &Tenant, count: i64, too_big: bool) -> UsageDecision {
        if tenant.is_unlimited() {
            return UsageDecision::default();
        }

        match self.try_increment(tenant, count.max(0), too_big).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(tenant_id = %tenant.id, count, error = %e, "usage tracking failed; accepting batch");
                UsageDecision::default()
            }
        }
    }

    async fn try_increment(&self, tenant: &Tenant, count: i64, too_big: bool) -> Result<UsageDecision, CoreError> {
        let now = self.clock.now();
        let hour = PeriodKey::hourly(now);
        let month = PeriodKey::monthly(now);
        let hour_seed = tenant.usage_seed(&hour);
        let month_seed = tenant.usage_seed(&month);

        let hourly = self.add(&tenant.id, &hour, TOTAL, count, hour_seed.total).await?;
        let monthly = self.add(&tenant.id, &month, TOTAL, count, month_seed.total).await?;

        for (period, seed) in [(&hour, hour_seed.too_big), (&month, month_seed.too_big)] {
            bounded(
                self.timeout,
                self.cache.increment_if(
                    &counter_key(&tenant.id, period, TOO_BIG),
                    1,
                    period.ttl(),
                    too_big,
                    seed,
                ),
            )
            .await?;
        }

        let totals = Totals {
            hourly,
            hourly_blocked: self.read(&tenant.id, &hour, BLOCKED, hour_seed.blocked).await?,
            monthly,
            monthly_blocked: self.read(&tenant.id, &month, BLOCKED, month_seed.blocked).await?,
        };

        let hourly_cap = tenant.hourly_cap();
        let monthly_cap = tenant.monthly_cap_with_bonus(now);
        let monthly_effective = totals.monthly - totals.monthly_blocked;

        let over_limit = hourly_cap.is_some_and(|h| totals.hourly > h)
            || monthly_cap.is_some_and(|m| monthly_effective > m);

        let blocked = if over_limit {
            blocked_amount(count, totals, hourly_cap, monthly_cap)
        } else {
            0
        };

        for (period, seed) in [(&hour, hour_seed.blocked), (&month, month_seed.blocked)] {
            bounded(
                self.timeout,
                self.cache.increment_if(
                    &counter_key(&tenant.id, period, BLOCKED),
                    blocked,
                    period.ttl(),
                    over_limit && blocked > 0,
                    seed,
                ),
            )
            .await?;
        }

        // Crossings are judged on the raw counters. Blocked events pull the
        // effective monthly total back to the cap, so it would cross again.
        let just_went_over_hourly = just_crossed(totals.hourly, count, hourly_cap);
        let just_went_over_monthly = just_crossed(totals.monthly, count, monthly_cap);

        for (crossed, is_hourly) in [(just_went_over_hourly, true), (just_went_over_monthly, false)] {
            if crossed {
                info!(tenant_id = %tenant.id, is_hourly, "tenant went over its plan limit");
                self.notifier.publish(
                    Notification::PlanOverage {
                        tenant_id: tenant.id.clone(),
                        is_hourly,
                    },
                    None,
                );
            }
        }

        let crossed = just_went_over_hourly || just_went_over_monthly;
        let checkpointed = if crossed || self.checkpoint_due(&tenant.id, now).await? {
            match self.checkpoint(&tenant.id).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(tenant_id = %tenant.id, error = %e, "usage checkpoint failed");
                    false
                }
            }
        } else {
            false
        };

        debug!(
            tenant_id = %tenant.id,
            count,
            hourly = totals.hourly,
            monthly = totals.monthly,
            over_limit,
            blocked,
            "usage incremented"
        );

        Ok(UsageDecision {
            over_limit,
            blocked,
            just_went_over_hourly,
            just_went_over_monthly,
            checkpointed,
        })
    }

    /// Remaining monthly events, bonus included.
    pub async fn get_remaining_quota(&self, tenant_id: &str) -> Result<RemainingQuota, CoreError> {
        let tenant = self.tenant(tenant_id).await?;
        let now = self.clock.now();

        let Some(cap) = tenant.monthly_cap_with_bonus(now) else {
            return Ok(RemainingQuota::Unlimited);
        };

        let month = PeriodKey::monthly(now);
        let seed = tenant.usage_seed(&month);
        let total = self.read_or_seed(tenant_id, &month, TOTAL, seed.total).await;

        Ok(RemainingQuota::Remaining((cap - total).max(0)))
    }

    /// Current counters for both periods, falling back to the durable snapshot
    /// for any counter the cache no longer holds.
    pub async fn get_usage(&self, tenant_id: &str) -> Result<UsageReport, CoreError> {
        let tenant = self.tenant(tenant_id).await?;
        Ok(self.live_usage(&tenant, self.clock.now()).await)
    }

    /// Write the live counters into the tenant's durable snapshot and reset
    /// the checkpoint marker.
    pub async fn checkpoint(&self, tenant_id: &str) -> Result<(), CoreError> {
        let tenant = self.tenant(tenant_id).await?;
        let now = self.clock.now();
        let live = self.live_usage(&tenant, now).await;

        bounded(
            self.timeout,
            self.store.update_tenant(tenant_id, MAX_UPDATE_ATTEMPTS, |stored| {
                merge_snapshot(&mut stored.hourly_usage, &live.hourly);
                merge_snapshot(&mut stored.monthly_usage, &live.monthly);
                stored.last_checkpoint = Some(now);
                true
            }),
        )
        .await?;

        if let Err(e) = bounded(
            self.timeout,
            self.cache
                .set(&marker_key(tenant_id), now.to_rfc3339(), Some(MARKER_TTL)),
        )
        .await
        {
            warn!(tenant_id, error = %e, "failed to reset checkpoint marker");
        }

        info!(
            tenant_id,
            hourly = live.hourly.total,
            monthly = live.monthly.total,
            "usage checkpointed"
        );
        Ok(())
    }

    /// Whether the checkpoint interval has elapsed since the last marker.
    /// A missing marker is set to `now` and does not count as due.
    async fn checkpoint_due(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<bool, CoreError> {
        let key = marker_key(tenant_id);
        let marker = bounded(self.timeout, self.cache.get(&key)).await?;

        let last = marker
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|at| at.with_timezone(&Utc));

        match last {
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or_default();
                Ok(elapsed >= self.checkpoint_interval)
            }
            None => {
                bounded(
                    self.timeout,
                    self.cache.set(&key, now.to_rfc3339(), Some(MARKER_TTL)),
                )
                .await?;
                Ok(false)
            }
        }
    }

    async fn live_usage(&self, tenant: &Tenant, now: DateTime<Utc>) -> UsageReport {
        let hour = PeriodKey::hourly(now);
        let month = PeriodKey::monthly(now);
        UsageReport {
            hourly: self.snapshot(tenant, &hour).await,
            monthly: self.snapshot(tenant, &month).await,
        }
    }

    async fn snapshot(&self, tenant: &Tenant, period: &PeriodKey) -> UsageSnapshot {
        let seed = tenant.usage_seed(period);
        UsageSnapshot {
            period: period.bucket(),
            total: self.read_or_seed(&tenant.id, period, TOTAL, seed.total).await,
            blocked: self.read_or_seed(&tenant.id, period, BLOCKED, seed.blocked).await,
            too_big: self.read_or_seed(&tenant.id, period, TOO_BIG, seed.too_big).await,
        }
    }

    async fn tenant(&self, tenant_id: &str) -> Result<Tenant, CoreError> {
        bounded(self.timeout, self.store.get_tenant(tenant_id))
            .await?
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))
    }

    async fn add(
        &self,
        tenant_id: &str,
        period: &PeriodKey,
        field: &str,
        delta: i64,
        seed: i64,
    ) -> Result<i64, CoreError> {
        let key = counter_key(tenant_id, period, field);
        Ok(bounded(self.timeout, self.cache.increment(&key, delta, period.ttl(), seed)).await?)
    }

    async fn read(&self, tenant_id: &str, period: &PeriodKey, field: &str, seed: i64) -> Result<i64, CoreError> {
        let key = counter_key(tenant_id, period, field);
        Ok(bounded(self.timeout, self.cache.get_i64(&key))
            .await?
            .unwrap_or(seed))
    }

    async fn read_or_seed(&self, tenant_id: &str, period: &PeriodKey, field: &str, seed: i64) -> i64 {
        match self.read(tenant_id, period, field, seed).await {
            Ok(value) => value,
            Err(e) => {
                warn!(tenant_id, field, error = %e, "usage counter read failed; using snapshot");
                seed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::cache::MemoryCache;
    use crate::core::ManualClock;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::testing::StalledStore;
    use crate::store::{SqliteStore, open_store};
    use crate::types::{CacheError, UNLIMITED};

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<SqliteStore>,
        cache: Arc<MemoryCache>,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        limiter: UsageLimiter<SqliteStore, MemoryCache, RecordingNotifier>,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 5, 10, 0).unwrap()
    }

    async fn harness(tenant: Tenant) -> Harness {
        let (dir, store) = open_store().await;
        let store = Arc::new(store);
        store.upsert_tenant(&tenant).await.unwrap();

        let cache = Arc::new(MemoryCache::new());
        let clock = Arc::new(ManualClock::new(start()));
        let notifier = Arc::new(RecordingNotifier::default());
        let limiter = UsageLimiter::new(
            store.clone(),
            cache.clone(),
            notifier.clone(),
            clock.clone(),
            TIMEOUT,
            Duration::from_secs(300),
        );

        Harness {
            _dir: dir,
            store,
            cache,
            clock,
            notifier,
            limiter,
        }
    }

    fn limiter_with<C: Cache>(
        store: Arc<SqliteStore>,
        cache: Arc<C>,
        timeout: Duration,
    ) -> UsageLimiter<SqliteStore, C, RecordingNotifier> {
        UsageLimiter::new(
            store,
            cache,
            Arc::new(RecordingNotifier::default()),
            Arc::new(ManualClock::new(start())),
            timeout,
            Duration::from_secs(300),
        )
    }

    /// Every call fails.
    struct BrokenCache;

    impl Cache for BrokenCache {
        async fn increment(&self, key: &str, _: i64, _: Duration, _: i64) -> Result<i64, CacheError> {
            Err(CacheError::TypeMismatch(key.to_string()))
        }

        async fn increment_if(
            &self,
            key: &str,
            _: i64,
            _: Duration,
            _: bool,
            _: i64,
        ) -> Result<i64, CacheError> {
            Err(CacheError::TypeMismatch(key.to_string()))
        }

        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Timeout)
        }

        async fn get_i64(&self, key: &str) -> Result<Option<i64>, CacheError> {
            Err(CacheError::TypeMismatch(key.to_string()))
        }

        async fn set(&self, _: &str, _: String, _: Option<Duration>) -> Result<(), CacheError> {
            Err(CacheError::Timeout)
        }

        async fn remove(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::Timeout)
        }
    }

    /// Every call hangs until the caller gives up.
    struct StalledCache;

    impl Cache for StalledCache {
        async fn increment(&self, _: &str, _: i64, _: Duration, _: i64) -> Result<i64, CacheError> {
            std::future::pending().await
        }

        async fn increment_if(
            &self,
            _: &str,
            _: i64,
            _: Duration,
            _: bool,
            _: i64,
        ) -> Result<i64, CacheError> {
            std::future::pending().await
        }

        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            std::future::pending().await
        }

        async fn get_i64(&self, _: &str) -> Result<Option<i64>, CacheError> {
            std::future::pending().await
        }

        async fn set(&self, _: &str, _: String, _: Option<Duration>) -> Result<(), CacheError> {
            std::future::pending().await
        }

        async fn remove(&self, _: &str) -> Result<bool, CacheError> {
            std::future::pending().await
        }
    }

    fn seeded_tenant(hourly_total: i64) -> Tenant {
        let mut tenant = Tenant::new("t1", "Acme").with_limits(100, 10_000);
        tenant.hourly_usage = UsageSnapshot {
            total: hourly_total,
            ..UsageSnapshot::empty(&PeriodKey::hourly(start()))
        };
        tenant
    }

    #[test]
    fn test_blocked_amount_is_the_overflow() {
        let totals = Totals {
            hourly: 105,
            hourly_blocked: 0,
            monthly: 105,
            monthly_blocked: 0,
        };
        assert_eq!(blocked_amount(10, totals, Some(100), None), 5);
        assert_eq!(blocked_amount(10, totals, Some(100), Some(100)), 5);
    }

    #[test]
    fn test_blocked_amount_whole_batch_once_over() {
        let totals = Totals {
            hourly: 125,
            hourly_blocked: 5,
            monthly: 125,
            monthly_blocked: 5,
        };
        assert_eq!(blocked_amount(10, totals, Some(100), None), 10);
        // A batch at least as large as the cap is blocked entirely.
        assert_eq!(blocked_amount(150, totals, Some(100), None), 150);
    }

    #[test]
    fn test_merge_snapshot_never_regresses() {
        let mut stored = UsageSnapshot {
            period: "2026-10".into(),
            total: 50,
            blocked: 2,
            too_big: 0,
        };
        merge_snapshot(
            &mut stored,
            &UsageSnapshot {
                period: "2026-10".into(),
                total: 40,
                blocked: 3,
                too_big: 1,
            },
        );
        assert_eq!((stored.total, stored.blocked, stored.too_big), (50, 3, 1));

        merge_snapshot(
            &mut stored,
            &UsageSnapshot {
                period: "2026-11".into(),
                total: 1,
                ..Default::default()
            },
        );
        assert_eq!(stored.period, "2026-11");
        assert_eq!(stored.total, 1);
    }

    #[tokio::test]
    async fn test_crossing_hourly_limit() {
        let h = harness(seeded_tenant(95)).await;

        let decision = h.limiter.increment_usage("t1", 10, false).await.unwrap();
        assert!(decision.over_limit);
        assert_eq!(decision.blocked, 5);
        assert!(decision.just_went_over_hourly);
        assert!(!decision.just_went_over_monthly);
        assert!(decision.checkpointed);

        let usage = h.limiter.get_usage("t1").await.unwrap();
        assert_eq!(usage.hourly.total, 105);
        assert_eq!(usage.hourly.blocked, 5);
        assert_eq!(h.notifier.count("plan_overage"), 1);

        // Already over: the next batch does not fire again.
        let decision = h.limiter.increment_usage("t1", 1, false).await.unwrap();
        assert!(decision.over_limit);
        assert!(!decision.just_went_over_hourly);
        assert_eq!(h.notifier.count("plan_overage"), 1);
    }

    #[tokio::test]
    async fn test_crossing_monthly_limit() {
        let tenant = Tenant::new("t1", "Acme")
            .with_limits(UNLIMITED, 100)
            .with_bonus(50, Some(start() + chrono::Duration::days(3)));
        let h = harness(tenant).await;

        let decision = h.limiter.increment_usage("t1", 140, false).await.unwrap();
        assert!(!decision.over_limit);
        assert!(!decision.just_went_over_monthly);

        // The bonus raises the cap to 150.
        let decision = h.limiter.increment_usage("t1", 20, false).await.unwrap();
        assert!(decision.over_limit);
        assert_eq!(decision.blocked, 10);
        assert!(decision.just_went_over_monthly);
        assert!(!decision.just_went_over_hourly);
        assert!(decision.checkpointed);
        assert_eq!(
            h.notifier.published(),
            vec![Notification::PlanOverage {
                tenant_id: "t1".into(),
                is_hourly: false,
            }]
        );

        for _ in 0..3 {
            let decision = h.limiter.increment_usage("t1", 5, false).await.unwrap();
            assert!(decision.over_limit);
            assert!(!decision.just_went_over_monthly);
        }
        assert_eq!(h.notifier.count("plan_overage"), 1);

        let tenant = h.store.get_tenant("t1").await.unwrap().unwrap();
        assert_eq!(tenant.monthly_usage.total, 160);
        assert_eq!(tenant.monthly_usage.blocked, 10);
    }

    #[tokio::test]
    async fn test_cache_errors_fail_open() {
        let h = harness(seeded_tenant(95)).await;
        let limiter = limiter_with(h.store.clone(), Arc::new(BrokenCache), TIMEOUT);
        let tenant = h.store.get_tenant("t1").await.unwrap().unwrap();

        let decision = limiter.increment_usage_for(&tenant, 10, false).await;
        assert_eq!(decision, UsageDecision::default());

        let decision = limiter.increment_usage("t1", 10, true).await.unwrap();
        assert_eq!(decision, UsageDecision::default());

        // Reads fall back to the durable snapshot.
        let usage = limiter.get_usage("t1").await.unwrap();
        assert_eq!(usage.hourly.total, 95);
    }

    #[tokio::test]
    async fn test_stalled_cache_fails_open() {
        let h = harness(seeded_tenant(95)).await;
        let limiter = limiter_with(h.store.clone(), Arc::new(StalledCache), Duration::from_millis(50));
        let tenant = h.store.get_tenant("t1").await.unwrap().unwrap();

        let decision = limiter.increment_usage_for(&tenant, 10, false).await;
        assert_eq!(decision, UsageDecision::default());
    }

    #[tokio::test]
    async fn test_tenant_lookup_timeout_fails_open() {
        let notifier = Arc::new(RecordingNotifier::default());
        let limiter = UsageLimiter::new(
            Arc::new(StalledStore),
            Arc::new(MemoryCache::new()),
            notifier.clone(),
            Arc::new(ManualClock::new(start())),
            Duration::from_millis(50),
            Duration::from_secs(300),
        );

        let decision = limiter.increment_usage("t1", 10, false).await.unwrap();
        assert_eq!(decision, UsageDecision::default());
        assert!(notifier.published().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_debounce() {
        let h = harness(Tenant::new("t1", "Acme").with_limits(1_000, 100_000)).await;

        let mut checkpoints = 0;
        for step in 0..4 {
            if step > 0 {
                h.clock.advance(chrono::Duration::minutes(1));
            }
            let decision = h.limiter.increment_usage("t1", 1, false).await.unwrap();
            checkpoints += decision.checkpointed as u32;
        }
        assert_eq!(checkpoints, 0);

        h.clock.advance(chrono::Duration::minutes(3));
        let decision = h.limiter.increment_usage("t1", 1, false).await.unwrap();
        assert!(decision.checkpointed);

        h.clock.advance(chrono::Duration::minutes(1));
        let decision = h.limiter.increment_usage("t1", 1, false).await.unwrap();
        assert!(!decision.checkpointed);

        let tenant = h.store.get_tenant("t1").await.unwrap().unwrap();
        assert_eq!(tenant.hourly_usage.total, 5);
        assert!(tenant.last_checkpoint.is_some());
    }

    #[tokio::test]
    async fn test_unlimited_tenant_is_a_no_op() {
        let h = harness(Tenant::new("t1", "Acme")).await;

        let decision = h.limiter.increment_usage("t1", 1_000_000, true).await.unwrap();
        assert_eq!(decision, UsageDecision::default());
        assert_eq!(
            h.limiter.get_remaining_quota("t1").await.unwrap(),
            RemainingQuota::Unlimited
        );
    }

    #[tokio::test]
    async fn test_too_big_counts_separately() {
        let h = harness(Tenant::new("t1", "Acme").with_limits(100, 1_000)).await;

        h.limiter.increment_usage("t1", 1, true).await.unwrap();
        h.limiter.increment_usage("t1", 2, false).await.unwrap();

        let usage = h.limiter.get_usage("t1").await.unwrap();
        assert_eq!(usage.monthly.total, 3);
        assert_eq!(usage.monthly.too_big, 1);
        assert_eq!(usage.hourly.too_big, 1);
    }

    #[tokio::test]
    async fn test_remaining_quota_includes_bonus() {
        let tenant = Tenant::new("t1", "Acme")
            .with_limits(UNLIMITED, 100)
            .with_bonus(50, Some(start() + chrono::Duration::days(3)));
        let h = harness(tenant).await;

        h.limiter.increment_usage("t1", 30, false).await.unwrap();
        assert_eq!(
            h.limiter.get_remaining_quota("t1").await.unwrap(),
            RemainingQuota::Remaining(120)
        );

        h.clock.advance(chrono::Duration::days(4));
        h.limiter.increment_usage("t1", 90, false).await.unwrap();
        assert_eq!(
            h.limiter.get_remaining_quota("t1").await.unwrap(),
            RemainingQuota::Remaining(0)
        );
    }

    #[tokio::test]
    async fn test_cold_period_seeds_from_snapshot() {
        let h = harness(seeded_tenant(40)).await;

        h.limiter.increment_usage("t1", 2, false).await.unwrap();
        assert_eq!(
            h.cache
                .get_i64(&counter_key("t1", &PeriodKey::hourly(start()), TOTAL))
                .await
                .unwrap(),
            Some(42)
        );
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_rejected() {
        let h = harness(Tenant::new("t1", "Acme")).await;
        let result = h.limiter.increment_usage("nobody", 1, false).await;
        assert!(matches!(result, Err(CoreError::TenantNotFound(_))));
    }
}
