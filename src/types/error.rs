use thiserror::Error;

/// Errors raised by the document store.
///
/// Core services wrap these in `CoreError` and decide locally whether a
/// failure is dropped, retried, or surfaced.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict on {id} after {attempts} attempt(s)")]
    Conflict { id: String, attempts: u32 },

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    Corrupt(String),

    #[error("store operation timed out")]
    Timeout,
}

/// Errors raised by the shared counter cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache operation timed out")]
    Timeout,

    #[error("cache value for {0} is not an integer")]
    TypeMismatch(String),
}

/// Errors surfaced by the aggregation core to its callers.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("stack {stack_id} still has {events} event(s) and cannot be deleted")]
    StackHasEvents { stack_id: String, events: i64 },

    #[error("update of stack {stack_id} dropped after {attempts} conflicting attempt(s)")]
    RetriesExhausted { stack_id: String, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl StoreError {
    /// Transient failures are logged and dropped by the ingestion path.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout | StoreError::Database(_))
    }
}
