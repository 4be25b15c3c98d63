//! Stack deduplication index.
//!
//! Resolves `(project_id, signature_hash)` to the one stack that owns it:
//! cache, then store, then create. Losing a creation race is not an error;
//! the loser re-reads and returns the winner's id.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::bounded;
use crate::cache::Cache;
use crate::store::DocumentStore;
use crate::types::{CoreError, NewStack, Stack, StackId, StoreError};

/// Lifetime of cached stack documents and signature mappings.
const STACK_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Cached stack documents keyed by id, plus signature -> id mappings.
/// Both keys for a stack are always written and invalidated together.
pub struct StackCache<C> {
    cache: Arc<C>,
    timeout: Duration,
}

impl<C> Clone for StackCache<C> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            timeout: self.timeout,
        }
    }
}

pub fn stack_key(stack_id: &str) -> String {
    format!("stack:{}", stack_id)
}

pub fn signature_key(project_id: &str, signature_hash: &str) -> String {
    format!("stack-signature:{}:{}", project_id, signature_hash)
}

impl<C: Cache> StackCache<C> {
    pub fn new(cache: Arc<C>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    pub async fn stack_id_for(&self, project_id: &str, signature_hash: &str) -> Option<StackId> {
        let key = signature_key(project_id, signature_hash);
        match bounded(self.timeout, self.cache.get(&key)).await {
            Ok(id) => id,
            Err(e) => {
                warn!(key = %key, error = %e, "stack signature cache read failed");
                None
            }
        }
    }

    pub async fn stack(&self, stack_id: &str) -> Option<Stack> {
        let key = stack_key(stack_id);
        let cached = match bounded(self.timeout, self.cache.get(&key)).await {
            Ok(cached) => cached?,
            Err(e) => {
                warn!(key = %key, error = %e, "stack cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&cached) {
            Ok(stack) => Some(stack),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cached stack");
                None
            }
        }
    }

    /// Refresh both keys for `stack`.
    pub async fn remember(&self, stack: &Stack) {
        let sig_key = signature_key(&stack.project_id, &stack.signature_hash);
        if let Err(e) = bounded(
            self.timeout,
            self.cache
                .set(&sig_key, stack.id.clone(), Some(STACK_CACHE_TTL)),
        )
        .await
        {
            warn!(stack_id = %stack.id, error = %e, "failed to cache stack signature");
        }

        let doc = match serde_json::to_string(stack) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(stack_id = %stack.id, error = %e, "failed to encode stack for cache");
                return;
            }
        };
        if let Err(e) = bounded(
            self.timeout,
            self.cache
                .set(&stack_key(&stack.id), doc, Some(STACK_CACHE_TTL)),
        )
        .await
        {
            warn!(stack_id = %stack.id, error = %e, "failed to cache stack");
        }
    }

    /// Drop both keys for `stack`.
    pub async fn invalidate(&self, stack: &Stack) {
        let keys = [
            stack_key(&stack.id),
            signature_key(&stack.project_id, &stack.signature_hash),
        ];
        for key in keys {
            if let Err(e) = bounded(self.timeout, self.cache.remove(&key)).await {
                warn!(key = %key, error = %e, "failed to invalidate stack cache");
            }
        }
    }
}

/// Resolves or creates the unique stack for a signature.
pub struct StackResolver<S, C> {
    store: Arc<S>,
    cache: StackCache<C>,
    timeout: Duration,
}

impl<S: DocumentStore, C: Cache> StackResolver<S, C> {
    pub fn new(store: Arc<S>, cache: StackCache<C>, timeout: Duration) -> Self {
        Self {
            store,
            cache,
            timeout,
        }
    }

    pub fn cache(&self) -> &StackCache<C> {
        &self.cache
    }

    /// Return the stack id for `(project_id, signature_hash)`, creating the
    /// stack from `template` if none exists yet.
    pub async fn resolve_or_create(
        &self,
        project_id: &str,
        signature_hash: &str,
        template: NewStack,
    ) -> Result<StackId, CoreError> {
        if let Some(id) = self.cache.stack_id_for(project_id, signature_hash).await {
            return Ok(id);
        }

        if let Some(stack) = self.find(project_id, signature_hash).await? {
            self.cache.remember(&stack).await;
            return Ok(stack.id);
        }

        // The dedup key is authoritative for where the stack lives.
        let mut stack = template.into_stack(signature_hash);
        stack.project_id = project_id.to_string();
        match bounded(self.timeout, self.store.insert_stack(&stack)).await {
            Ok(()) => {
                info!(
                    stack_id = %stack.id,
                    project_id,
                    signature = signature_hash,
                    "created stack"
                );
                self.cache.remember(&stack).await;
                Ok(stack.id)
            }
            Err(StoreError::Duplicate(_)) => {
                debug!(project_id, signature = signature_hash, "stack created concurrently");
                let winner = self
                    .find(project_id, signature_hash)
                    .await?
                    .ok_or_else(|| {
                        CoreError::StackNotFound(format!("{}/{}", project_id, signature_hash))
                    })?;
                self.cache.remember(&winner).await;
                Ok(winner.id)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a stack by id, preferring the cache.
    pub async fn get_stack(&self, stack_id: &str) -> Result<Option<Stack>, CoreError> {
        if let Some(stack) = self.cache.stack(stack_id).await {
            return Ok(Some(stack));
        }

        let stack = bounded(self.timeout, self.store.get_stack(stack_id)).await?;
        if let Some(stack) = &stack {
            self.cache.remember(stack).await;
        }
        Ok(stack)
    }

    async fn find(&self, project_id: &str, signature_hash: &str) -> Result<Option<Stack>, CoreError> {
        Ok(bounded(
            self.timeout,
            self.store.find_stack_by_signature(project_id, signature_hash),
        )
        .await?)
    }
}
