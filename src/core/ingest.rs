//! Ingestion entry point: quota, stack resolution, event writes and
//! occurrence counting for a batch of events from one project.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use super::bounded;
use super::clock::Clock;
use super::counter::OccurrenceCounter;
use super::dedup::{StackCache, StackResolver};
use super::usage::UsageLimiter;
use crate::cache::Cache;
use crate::config::Config;
use crate::notify::Notifier;
use crate::store::{DocumentStore, to_stored_precision};
use crate::types::{CoreError, Event, IncomingEvent, IngestResult, NewStack, Project, Tenant};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Upper bound on every store and cache call.
    pub timeout: Duration,
    /// Serialized payloads larger than this are counted but not stored.
    pub max_event_size_bytes: usize,
    pub checkpoint_interval: Duration,
    pub stack_changed_debounce: Duration,
    pub publish_stack_changes: bool,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.operation_timeout(),
            max_event_size_bytes: config.max_event_size_bytes,
            checkpoint_interval: config.checkpoint_interval(),
            stack_changed_debounce: config.stack_changed_debounce(),
            publish_stack_changes: config.publish_stack_changes,
        }
    }
}

/// Accepted events sharing one signature hash.
struct SignatureGroup {
    hash: String,
    /// Indexes into the incoming batch.
    members: Vec<usize>,
    min: DateTime<Utc>,
    max: DateTime<Utc>,
}

/// Group `indexes` of `events` by signature hash, in first-seen order.
fn group_by_signature(events: &[IncomingEvent], indexes: &[usize]) -> Vec<SignatureGroup> {
    let mut groups: Vec<SignatureGroup> = Vec::new();
    let mut by_hash: HashMap<String, usize> = HashMap::new();

    for &i in indexes {
        let event = &events[i];
        let hash = event.signature_hash();
        let at = to_stored_precision(event.timestamp);
        match by_hash.get(&hash) {
            Some(&g) => {
                let group = &mut groups[g];
                group.members.push(i);
                group.min = group.min.min(at);
                group.max = group.max.max(at);
            }
            None => {
                by_hash.insert(hash.clone(), groups.len());
                groups.push(SignatureGroup {
                    hash,
                    members: vec![i],
                    min: at,
                    max: at,
                });
            }
        }
    }

    groups
}

fn payload_size(event: &IncomingEvent) -> usize {
    serde_json::to_vec(&event.payload)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX)
}

pub struct Ingestor<S, C, N> {
    store: Arc<S>,
    resolver: StackResolver<S, C>,
    counter: OccurrenceCounter<S, C, N>,
    limiter: UsageLimiter<S, C, N>,
    options: IngestOptions,
}

impl<S, C, N> Ingestor<S, C, N>
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
        options: IngestOptions,
    ) -> Self {
        let timeout = options.timeout;
        let resolver = StackResolver::new(
            store.clone(),
            StackCache::new(cache.clone(), timeout),
            timeout,
        );
        let counter = OccurrenceCounter::new(
            store.clone(),
            cache.clone(),
            notifier.clone(),
            timeout,
            options.stack_changed_debounce,
            options.publish_stack_changes,
        );
        let limiter = UsageLimiter::new(
            store.clone(),
            cache,
            notifier,
            clock,
            timeout,
            options.checkpoint_interval,
        );

        Self {
            store,
            resolver,
            counter,
            limiter,
            options,
        }
    }

    pub fn limiter(&self) -> &UsageLimiter<S, C, N> {
        &self.limiter
    }

    pub async fn ingest_event(
        &self,
        tenant_id: &str,
        project_id: &str,
        event: IncomingEvent,
    ) -> Result<IngestResult, CoreError> {
        let mut results = self.ingest_batch(tenant_id, project_id, vec![event]).await?;
        Ok(results.pop().unwrap_or(IngestResult {
            stack_id: None,
            event_id: None,
            accepted: false,
        }))
    }

    /// Ingest events for one project. Results are returned in input order.
    ///
    /// Only unknown tenants or projects fail the call. Over-quota, oversized
    /// and unstorable events come back with `accepted = false`.
    pub async fn ingest_batch(
        &self,
        tenant_id: &str,
        project_id: &str,
        events: Vec<IncomingEvent>,
    ) -> Result<Vec<IngestResult>, CoreError> {
        let (tenant, project) = self.load_owner(tenant_id, project_id).await?;

        let mut results: Vec<IngestResult> = events
            .iter()
            .map(|_| IngestResult {
                stack_id: None,
                event_id: None,
                accepted: false,
            })
            .collect();

        let (fits, too_big): (Vec<usize>, Vec<usize>) = (0..events.len())
            .partition(|&i| payload_size(&events[i]) <= self.options.max_event_size_bytes);

        for &i in &too_big {
            warn!(
                tenant_id,
                project_id,
                signature = %events[i].display_signature(),
                "discarding oversized event"
            );
            self.limiter.increment_usage_for(&tenant, 1, true).await;
        }

        if fits.is_empty() {
            return Ok(results);
        }

        let decision = self
            .limiter
            .increment_usage_for(&tenant, fits.len() as i64, false)
            .await;
        let admitted = if decision.over_limit {
            let blocked = usize::try_from(decision.blocked).unwrap_or(0);
            fits.len().saturating_sub(blocked)
        } else {
            fits.len()
        };
        if admitted < fits.len() {
            warn!(
                tenant_id,
                project_id,
                blocked = fits.len() - admitted,
                "tenant over quota; rejecting events"
            );
        }

        for group in group_by_signature(&events, &fits[..admitted]) {
            self.ingest_group(&tenant, &project, &events, group, &mut results)
                .await;
        }

        Ok(results)
    }

    async fn load_owner(&self, tenant_id: &str, project_id: &str) -> Result<(Tenant, Project), CoreError> {
        let tenant = bounded(self.options.timeout, self.store.get_tenant(tenant_id))
            .await?
            .ok_or_else(|| CoreError::TenantNotFound(tenant_id.to_string()))?;

        let project = bounded(self.options.timeout, self.store.get_project(project_id))
            .await?
            .filter(|p| p.tenant_id == tenant.id)
            .ok_or_else(|| CoreError::ProjectNotFound(project_id.to_string()))?;

        Ok((tenant, project))
    }

    async fn ingest_group(
        &self,
        tenant: &Tenant,
        project: &Project,
        events: &[IncomingEvent],
        group: SignatureGroup,
        results: &mut [IngestResult],
    ) {
        let first = &events[group.members[0]];
        let template = NewStack {
            tenant_id: tenant.id.clone(),
            project_id: project.id.clone(),
            title: first.title.clone().unwrap_or_else(|| first.display_signature()),
            first_seen: group.min,
        };

        let stack_id = match self
            .resolver
            .resolve_or_create(&project.id, &group.hash, template)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    project_id = %project.id,
                    signature = %group.hash,
                    events = group.members.len(),
                    error = %e,
                    "stack resolution failed; dropping events"
                );
                return;
            }
        };

        let (is_fixed, is_hidden) = match self.resolver.get_stack(&stack_id).await {
            Ok(Some(stack)) => (stack.is_fixed, stack.is_hidden),
            Ok(None) => (false, false),
            Err(e) => {
                debug!(stack_id = %stack_id, error = %e, "stack flags unavailable");
                (false, false)
            }
        };

        let mut stored = 0i64;
        for &i in &group.members {
            let incoming = &events[i];
            let event = Event {
                id: uuid::Uuid::now_v7().to_string(),
                tenant_id: tenant.id.clone(),
                project_id: project.id.clone(),
                stack_id: stack_id.clone(),
                timestamp: to_stored_precision(incoming.timestamp),
                payload: incoming.payload.clone(),
                is_fixed,
                is_hidden,
            };

            results[i].stack_id = Some(stack_id.clone());
            match bounded(self.options.timeout, self.store.insert_event(&event)).await {
                Ok(()) => {
                    stored += 1;
                    results[i].event_id = Some(event.id);
                    results[i].accepted = true;
                }
                Err(e) => {
                    warn!(stack_id = %stack_id, event_id = %event.id, error = %e, "failed to store event");
                }
            }
        }

        if stored == 0 {
            return;
        }

        match self
            .counter
            .increment(&stack_id, group.min, group.max, stored)
            .await
        {
            Ok(_) => {}
            Err(e @ CoreError::RetriesExhausted { .. }) => {
                error!(stack_id = %stack_id, count = stored, error = %e, "occurrence count lost");
            }
            Err(e) => {
                warn!(stack_id = %stack_id, count = stored, error = %e, "occurrence update failed");
            }
        }
    }
}
