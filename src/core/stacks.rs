//! Stack status changes and deletion.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::clock::Clock;
use super::dedup::StackCache;
use super::{MAX_UPDATE_ATTEMPTS, bounded};
use crate::cache::Cache;
use crate::notify::{Notification, Notifier};
use crate::store::{DocumentStore, UpdateOutcome};
use crate::types::{CoreError, Stack, StoreError};

/// Requested flag changes; `None` leaves a flag as it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusChange {
    pub fixed: Option<bool>,
    pub hidden: Option<bool>,
}

impl StatusChange {
    pub fn fixed(fixed: bool) -> Self {
        Self {
            fixed: Some(fixed),
            hidden: None,
        }
    }

    pub fn hidden(hidden: bool) -> Self {
        Self {
            fixed: None,
            hidden: Some(hidden),
        }
    }

    /// Apply to `stack`, returning whether anything changed.
    fn apply(&self, stack: &mut Stack, now: chrono::DateTime<chrono::Utc>) -> bool {
        let mut changed = false;

        if let Some(fixed) = self.fixed.filter(|f| *f != stack.is_fixed) {
            stack.is_fixed = fixed;
            stack.date_fixed = fixed.then_some(now);
            if fixed {
                stack.is_regressed = false;
            }
            changed = true;
        }

        if let Some(hidden) = self.hidden.filter(|h| *h != stack.is_hidden) {
            stack.is_hidden = hidden;
            changed = true;
        }

        changed
    }
}

pub struct StackManager<S, C, N> {
    store: Arc<S>,
    stacks: StackCache<C>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl<S, C, N> StackManager<S, C, N>
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
    ) -> Self {
        Self {
            store,
            stacks: StackCache::new(cache, timeout),
            notifier,
            clock,
            timeout,
        }
    }

    pub async fn get_stack(&self, stack_id: &str) -> Result<Stack, CoreError> {
        if let Some(stack) = self.stacks.stack(stack_id).await {
            return Ok(stack);
        }

        let stack = bounded(self.timeout, self.store.get_stack(stack_id))
            .await?
            .ok_or_else(|| CoreError::StackNotFound(stack_id.to_string()))?;
        self.stacks.remember(&stack).await;
        Ok(stack)
    }

    /// Change a stack's fixed/hidden flags and project them onto its events.
    pub async fn set_status(&self, stack_id: &str, change: StatusChange) -> Result<Stack, CoreError> {
        let now = self.clock.now();
        let result = bounded(
            self.timeout,
            self.store
                .update_stack(stack_id, MAX_UPDATE_ATTEMPTS, |stack| change.apply(stack, now)),
        )
        .await;

        let stack = match result {
            Ok(UpdateOutcome::Updated(stack)) => stack,
            Ok(UpdateOutcome::Unchanged(stack)) => return Ok(stack),
            Err(StoreError::NotFound(_)) => {
                return Err(CoreError::StackNotFound(stack_id.to_string()));
            }
            Err(StoreError::Conflict { attempts, .. }) => {
                return Err(CoreError::RetriesExhausted {
                    stack_id: stack_id.to_string(),
                    attempts,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let events = bounded(
            self.timeout,
            self.store
                .set_event_flags(&stack.id, stack.is_fixed, stack.is_hidden),
        )
        .await?;

        info!(
            stack_id,
            is_fixed = stack.is_fixed,
            is_hidden = stack.is_hidden,
            events,
            "stack status changed"
        );

        self.stacks.invalidate(&stack).await;
        self.notifier.publish(
            Notification::StackChanged {
                tenant_id: stack.tenant_id.clone(),
                project_id: stack.project_id.clone(),
                stack_id: stack.id.clone(),
            },
            None,
        );

        Ok(stack)
    }

    /// Delete a stack that no longer has any events.
    pub async fn delete_stack(&self, stack_id: &str) -> Result<(), CoreError> {
        let stack = bounded(self.timeout, self.store.get_stack(stack_id))
            .await?
            .ok_or_else(|| CoreError::StackNotFound(stack_id.to_string()))?;

        let events = bounded(self.timeout, self.store.count_stack_events(stack_id)).await?;
        if events > 0 {
            return Err(CoreError::StackHasEvents {
                stack_id: stack_id.to_string(),
                events,
            });
        }

        bounded(self.timeout, self.store.delete_stack(stack_id)).await?;
        self.stacks.invalidate(&stack).await;

        info!(stack_id, project_id = %stack.project_id, "stack deleted");
        Ok(())
    }
}
