//! Shared counter cache.
//!
//! The contract mirrors a networked cache (every call is a future): atomic
//! increments with a seed for cold keys, conditional increments, and plain
//! get/set/remove with per-key TTL.

#![allow(dead_code)]

mod memory;

pub use memory::MemoryCache;

use std::future::Future;
use std::time::Duration;

use crate::types::CacheError;

pub trait Cache: Send + Sync {
    /// Add `delta` to the counter at `key` and return the new value. A missing
    /// or expired key starts from `seed` and lives for `ttl`.
    fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Duration,
        seed: i64,
    ) -> impl Future<Output = Result<i64, CacheError>> + Send;

    /// Like [`Cache::increment`] but only applies when `condition` holds.
    /// Otherwise returns the current value, or `seed` for a cold key, without
    /// writing anything.
    fn increment_if(
        &self,
        key: &str,
        delta: i64,
        ttl: Duration,
        condition: bool,
        seed: i64,
    ) -> impl Future<Output = Result<i64, CacheError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;

    fn get_i64(&self, key: &str) -> impl Future<Output = Result<Option<i64>, CacheError>> + Send;

    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Returns whether a live entry was removed.
    fn remove(&self, key: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;
}
