//! Wiring of the concrete store, cache and notifier used by the CLI.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::MemoryCache;
use crate::config::Config;
use crate::core::{
    Clock, EventNavigator, IngestOptions, Ingestor, RetentionSweeper, StackManager, SystemClock,
    UsageLimiter,
};
use crate::notify::{LogNotifier, Notifier};
use crate::store::SqliteStore;

pub type CliIngestor = Ingestor<SqliteStore, MemoryCache, LogNotifier>;

/// Everything a command needs, opened from the user's config.
pub struct Services {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub cache: Arc<MemoryCache>,
    pub notifier: Arc<LogNotifier>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    pub async fn open() -> Result<Self> {
        Self::from_config(Config::load()?).await
    }

    pub async fn from_config(config: Config) -> Result<Self> {
        let store = SqliteStore::open(&config)
            .await
            .with_context(|| format!("Failed to open event store at {}", config.db_path().display()))?;

        Ok(Self {
            config,
            store: Arc::new(store),
            cache: Arc::new(MemoryCache::new()),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn ingestor(&self) -> CliIngestor {
        self.ingestor_with(self.notifier.clone())
    }

    /// An ingestor that publishes through `notifier` instead of the log.
    pub fn ingestor_with<N: Notifier>(&self, notifier: Arc<N>) -> Ingestor<SqliteStore, MemoryCache, N> {
        Ingestor::new(
            self.store.clone(),
            self.cache.clone(),
            notifier,
            self.clock.clone(),
            IngestOptions::from_config(&self.config),
        )
    }

    pub fn limiter(&self) -> UsageLimiter<SqliteStore, MemoryCache, LogNotifier> {
        UsageLimiter::new(
            self.store.clone(),
            self.cache.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            self.config.operation_timeout(),
            self.config.checkpoint_interval(),
        )
    }

    pub fn stacks(&self) -> StackManager<SqliteStore, MemoryCache, LogNotifier> {
        StackManager::new(
            self.store.clone(),
            self.cache.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            self.config.operation_timeout(),
        )
    }

    pub fn navigator(&self) -> EventNavigator<SqliteStore> {
        EventNavigator::new(self.store.clone(), self.config.operation_timeout())
    }

    pub fn sweeper(&self) -> RetentionSweeper<SqliteStore> {
        RetentionSweeper::new(self.store.clone(), self.config.operation_timeout())
    }
}
