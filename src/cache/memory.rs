//! In-process cache over a sharded concurrent map.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;

use super::Cache;
use crate::types::CacheError;

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Cache whose per-key operations are atomic under the map's shard lock.
/// No lock is held across an await.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Reads already ignore them.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before - self.entries.len()
    }

    fn add(&self, key: &str, delta: i64, ttl: Duration, seed: i64) -> Result<i64, CacheError> {
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let entry = occupied.get_mut();
                match &mut entry.value {
                    Value::Int(current) => {
                        *current += delta;
                        Ok(*current)
                    }
                    Value::Text(_) => Err(CacheError::TypeMismatch(key.to_string())),
                }
            }
            MapEntry::Occupied(mut stale) => {
                let value = seed + delta;
                stale.insert(Entry {
                    value: Value::Int(value),
                    expires_at: Some(now + ttl),
                });
                Ok(value)
            }
            MapEntry::Vacant(vacant) => {
                let value = seed + delta;
                vacant.insert(Entry {
                    value: Value::Int(value),
                    expires_at: Some(now + ttl),
                });
                Ok(value)
            }
        }
    }

    fn live(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }
}

impl Cache for MemoryCache {
    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Duration,
        seed: i64,
    ) -> Result<i64, CacheError> {
        self.add(key, delta, ttl, seed)
    }

    async fn increment_if(
        &self,
        key: &str,
        delta: i64,
        ttl: Duration,
        condition: bool,
        seed: i64,
    ) -> Result<i64, CacheError> {
        if condition {
            return self.add(key, delta, ttl, seed);
        }

        match self.live(key) {
            Some(Value::Int(current)) => Ok(current),
            Some(Value::Text(_)) => Err(CacheError::TypeMismatch(key.to_string())),
            None => Ok(seed),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live(key).map(|value| match value {
            Value::Int(n) => n.to_string(),
            Value::Text(s) => s,
        }))
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>, CacheError> {
        match self.live(key) {
            Some(Value::Int(n)) => Ok(Some(n)),
            Some(Value::Text(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| CacheError::TypeMismatch(key.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_increment_seeds_cold_key() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment("k", 5, HOUR, 95).await.unwrap(), 100);
        assert_eq!(cache.increment("k", 5, HOUR, 95).await.unwrap(), 105);
    }

    #[tokio::test]
    async fn test_increment_if_false_does_not_write() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment_if("k", 3, HOUR, false, 7).await.unwrap(), 7);
        assert_eq!(cache.get_i64("k").await.unwrap(), None);

        assert_eq!(cache.increment_if("k", 3, HOUR, true, 7).await.unwrap(), 10);
        assert_eq!(cache.increment_if("k", 3, HOUR, false, 7).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_expired_key_is_reseeded() {
        let cache = MemoryCache::new();
        cache
            .increment("k", 1, Duration::from_millis(1), 0)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(cache.get_i64("k").await.unwrap(), None);
        assert_eq!(cache.increment("k", 1, HOUR, 10).await.unwrap(), 11);
        assert_eq!(cache.purge_expired(), 0);
    }

    #[tokio::test]
    async fn test_text_values() {
        let cache = MemoryCache::new();
        cache.set("name", "value".into(), None).await.unwrap();
        assert_eq!(cache.get("name").await.unwrap().as_deref(), Some("value"));
        assert!(cache.increment("name", 1, HOUR, 0).await.is_err());
        assert!(cache.remove("name").await.unwrap());
        assert!(!cache.remove("name").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_atomic() {
        let cache = Arc::new(MemoryCache::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    cache.increment("hits", 1, HOUR, 0).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.get_i64("hits").await.unwrap(), Some(3200));
    }
}
