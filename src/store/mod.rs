//! Document store contract and its SQLite implementation.
//!
//! Layout inside the database file:
//! - `tenants`, `projects`, `stacks` - one row per document
//! - `partitions` - registry of dated event partitions
//! - `events_YYYYMMDD` - one table per UTC day of event timestamps
//! - `events_<window>` - rolling views over the most recent partitions

#![allow(dead_code)]

mod models;
mod partitions;
mod sqlite;

pub use models::to_stored_precision;
pub use partitions::{PartitionInfo, partition_table};
pub use sqlite::SqliteStore;

use std::future::Future;

use chrono::NaiveDate;

use crate::types::{
    Event, EventQuery, EventRef, Project, Stack, StoreError, Tenant,
};

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
    /// The mutation applied and was written; carries the new document.
    Updated(T),
    /// The mutation reported nothing to change; carries the current document.
    Unchanged(T),
}

impl<T> UpdateOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            UpdateOutcome::Updated(doc) | UpdateOutcome::Unchanged(doc) => doc,
        }
    }

    pub fn was_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated(_))
    }
}

/// Read/write/conditional-update contract the core needs from its store.
///
/// Conditional updates take a mutation closure that is applied to the latest
/// stored document. It returns `false` when there is nothing to write. The
/// store retries the closure on concurrent modification, up to
/// `max_attempts`, and reports [`StoreError::Conflict`] when they run out.
pub trait DocumentStore: Send + Sync {
    // ---- tenants ----

    fn get_tenant(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Tenant>, StoreError>> + Send;

    /// Insert a tenant or update its name and limits, keeping usage snapshots.
    fn upsert_tenant(&self, tenant: &Tenant) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn update_tenant<F>(
        &self,
        id: &str,
        max_attempts: u32,
        mutate: F,
    ) -> impl Future<Output = Result<UpdateOutcome<Tenant>, StoreError>> + Send
    where
        F: Fn(&mut Tenant) -> bool + Send + Sync;

    // ---- projects ----

    fn get_project(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Project>, StoreError>> + Send;

    fn upsert_project(&self, project: &Project)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    // ---- stacks ----

    fn get_stack(&self, id: &str)
    -> impl Future<Output = Result<Option<Stack>, StoreError>> + Send;

    fn find_stack_by_signature(
        &self,
        project_id: &str,
        signature_hash: &str,
    ) -> impl Future<Output = Result<Option<Stack>, StoreError>> + Send;

    /// Insert a new stack. Fails with [`StoreError::Duplicate`] when a stack
    /// with the same `(project_id, signature_hash)` already exists.
    fn insert_stack(&self, stack: &Stack) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn update_stack<F>(
        &self,
        id: &str,
        max_attempts: u32,
        mutate: F,
    ) -> impl Future<Output = Result<UpdateOutcome<Stack>, StoreError>> + Send
    where
        F: Fn(&mut Stack) -> bool + Send + Sync;

    /// Remove a stack row. Returns whether a row was deleted.
    fn delete_stack(&self, id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    // ---- events ----

    /// Idempotently create the partition for `date`. Returns `true` only for
    /// the caller that actually registered it.
    fn create_partition_if_absent(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Write an event into the partition for its UTC day.
    fn insert_event(&self, event: &Event) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_event(&self, id: &str)
    -> impl Future<Output = Result<Option<Event>, StoreError>> + Send;

    fn query_events(
        &self,
        query: &EventQuery,
    ) -> impl Future<Output = Result<Vec<Event>, StoreError>> + Send;

    /// Like [`DocumentStore::query_events`] but selects only `(id, timestamp)`.
    fn query_event_refs(
        &self,
        query: &EventQuery,
    ) -> impl Future<Output = Result<Vec<EventRef>, StoreError>> + Send;

    fn count_stack_events(
        &self,
        stack_id: &str,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Project the stack's status flags onto all of its events.
    fn set_event_flags(
        &self,
        stack_id: &str,
        is_fixed: bool,
        is_hidden: bool,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    // ---- partitions ----

    fn list_partitions(&self) -> impl Future<Output = Result<Vec<PartitionInfo>, StoreError>> + Send;

    fn drop_partition(&self, date: NaiveDate)
    -> impl Future<Output = Result<bool, StoreError>> + Send;
}

#[cfg(test)]
pub(crate) use sqlite::tests::open_store;

#[cfg(test)]
pub(crate) mod testing {
    use std::future::pending;

    use super::*;

    /// A store whose every call hangs until the caller's timeout fires.
    pub struct StalledStore;

    impl DocumentStore for StalledStore {
        async fn get_tenant(&self, _: &str) -> Result<Option<Tenant>, StoreError> {
            pending().await
        }

        async fn upsert_tenant(&self, _: &Tenant) -> Result<(), StoreError> {
            pending().await
        }

        async fn update_tenant<F>(&self, _: &str, _: u32, _: F) -> Result<UpdateOutcome<Tenant>, StoreError>
        where
            F: Fn(&mut Tenant) -> bool + Send + Sync,
        {
            pending().await
        }

        async fn get_project(&self, _: &str) -> Result<Option<Project>, StoreError> {
            pending().await
        }

        async fn upsert_project(&self, _: &Project) -> Result<(), StoreError> {
            pending().await
        }

        async fn get_stack(&self, _: &str) -> Result<Option<Stack>, StoreError> {
            pending().await
        }

        async fn find_stack_by_signature(&self, _: &str, _: &str) -> Result<Option<Stack>, StoreError> {
            pending().await
        }

        async fn insert_stack(&self, _: &Stack) -> Result<(), StoreError> {
            pending().await
        }

        async fn update_stack<F>(&self, _: &str, _: u32, _: F) -> Result<UpdateOutcome<Stack>, StoreError>
        where
            F: Fn(&mut Stack) -> bool + Send + Sync,
        {
            pending().await
        }

        async fn delete_stack(&self, _: &str) -> Result<bool, StoreError> {
            pending().await
        }

        async fn create_partition_if_absent(&self, _: NaiveDate) -> Result<bool, StoreError> {
            pending().await
        }

        async fn insert_event(&self, _: &Event) -> Result<(), StoreError> {
            pending().await
        }

        async fn get_event(&self, _: &str) -> Result<Option<Event>, StoreError> {
            pending().await
        }

        async fn query_events(&self, _: &EventQuery) -> Result<Vec<Event>, StoreError> {
            pending().await
        }

        async fn query_event_refs(&self, _: &EventQuery) -> Result<Vec<EventRef>, StoreError> {
            pending().await
        }

        async fn count_stack_events(&self, _: &str) -> Result<i64, StoreError> {
            pending().await
        }

        async fn set_event_flags(&self, _: &str, _: bool, _: bool) -> Result<u64, StoreError> {
            pending().await
        }

        async fn list_partitions(&self) -> Result<Vec<PartitionInfo>, StoreError> {
            pending().await
        }

        async fn drop_partition(&self, _: NaiveDate) -> Result<bool, StoreError> {
            pending().await
        }
    }
}
