//! SQLite document store.

use std::cmp::Ordering;
use std::path::Path;

use chrono::{NaiveDate, Utc};
use dashmap::DashSet;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info, warn};

use super::models::{
    EVENT_COLUMNS, EVENT_REF_COLUMNS, EventRefRow, EventRow, ProjectRow, StackRow, TenantRow,
    to_micros,
};
use super::partitions::{
    PartitionInfo, create_partition_sql, create_view_sql, date_key, parse_date_key,
    partition_table, sanitize_view_name, window_partitions,
};
use super::{DocumentStore, UpdateOutcome};
use crate::config::{Config, RollingWindow};
use crate::types::{
    Event, EventQuery, EventRef, Project, SortOrder, Stack, StoreError, Tenant, TimeBound,
};

/// SQLite's default cap on terms in a compound SELECT is 500.
const MAX_UNION_TERMS: usize = 200;

/// SQLite-backed document store with one event table per UTC day.
pub struct SqliteStore {
    pool: SqlitePool,
    windows: Vec<RollingWindow>,
    /// Partitions this process has already created or seen.
    known_partitions: DashSet<NaiveDate>,
}

impl SqliteStore {
    /// Open or create the store described by `config`.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;

        Self::open_file(&config.db_path(), config).await
    }

    /// Open or create the database at the given path.
    pub async fn open_file(db_path: &Path, config: &Config) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            windows: config.rolling_windows.clone(),
            known_partitions: DashSet::new(),
        };
        store.migrate().await?;
        store.refresh_views().await?;

        Ok(store)
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                hourly_limit INTEGER NOT NULL,
                monthly_limit INTEGER NOT NULL,
                bonus_events INTEGER NOT NULL DEFAULT 0,
                bonus_expiration INTEGER,
                hourly_usage TEXT NOT NULL,
                monthly_usage TEXT NOT NULL,
                last_checkpoint INTEGER,
                version INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stacks (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                signature_hash TEXT NOT NULL,
                title TEXT NOT NULL,
                first_occurrence INTEGER NOT NULL,
                last_occurrence INTEGER NOT NULL,
                total_occurrences INTEGER NOT NULL DEFAULT 0,
                is_fixed INTEGER NOT NULL DEFAULT 0,
                date_fixed INTEGER,
                is_hidden INTEGER NOT NULL DEFAULT 0,
                is_regressed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                UNIQUE(project_id, signature_hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS partitions (
                date_key TEXT PRIMARY KEY,
                table_name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_stacks_project ON stacks(project_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Rebuild every rolling view from the partition registry.
    ///
    /// Runs in one transaction whose first statement is a write, so that
    /// concurrent rebuilds serialize on SQLite's writer lock.
    pub async fn refresh_views(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        self.rebuild_views(&mut tx).await?;
        tx.commit().await?;

        debug!(views = self.windows.len(), "rolling views refreshed");
        Ok(())
    }

    async fn rebuild_views(&self, conn: &mut SqliteConnection) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO store_meta (key, value) VALUES ('views_refreshed_at', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;

        for window in &self.windows {
            let drop = format!("DROP VIEW IF EXISTS {}", sanitize_view_name(&window.name));
            sqlx::query(&drop).execute(&mut *conn).await?;
        }

        let keys: Vec<String> =
            sqlx::query_scalar("SELECT date_key FROM partitions ORDER BY date_key")
                .fetch_all(&mut *conn)
                .await?;
        let registered: Vec<NaiveDate> = keys.iter().filter_map(|k| parse_date_key(k)).collect();

        let today = Utc::now().date_naive();
        for window in &self.windows {
            let covered = window_partitions(window, today, &registered);
            sqlx::query(&create_view_sql(window, &covered))
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Read every event in a named rolling window, newest first.
    pub async fn window_events(&self, name: &str, limit: usize) -> Result<Vec<Event>, StoreError> {
        let Some(window) = self.windows.iter().find(|w| w.name == name) else {
            return Err(StoreError::NotFound(format!("rolling window {name}")));
        };

        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM {} ORDER BY timestamp DESC, id DESC LIMIT ?",
            sanitize_view_name(&window.name)
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    // ==================== Partition Helpers ====================

    async fn registered_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT date_key FROM partitions ORDER BY date_key")
                .fetch_all(&self.pool)
                .await?;

        Ok(keys.iter().filter_map(|k| parse_date_key(k)).collect())
    }

    async fn registered_dates_between(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        // Filtered after parsing: date keys outside four-digit years do not
        // compare correctly as text.
        Ok(self
            .registered_dates()
            .await?
            .into_iter()
            .filter(|date| first <= *date && *date <= last)
            .collect())
    }

    async fn write_event(&self, event: &Event) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} ({EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            partition_table(event.partition_date())
        );

        sqlx::query(&sql)
            .bind(&event.id)
            .bind(&event.tenant_id)
            .bind(&event.project_id)
            .bind(&event.stack_id)
            .bind(to_micros(event.timestamp))
            .bind(serde_json::to_string(&event.payload)?)
            .bind(event.is_fixed)
            .bind(event.is_hidden)
            .execute(&self.pool)
            .await
            .map_err(|e| map_insert_error(e, &event.id))?;

        Ok(())
    }

    /// Run `query` over the partitions its window covers.
    async fn select_events<R>(&self, query: &EventQuery, columns: &str) -> Result<Vec<R>, StoreError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + OrderKey + Send + Unpin,
    {
        let Some((first, last)) = query.range.day_span() else {
            return Ok(vec![]);
        };

        let dates = self.registered_dates_between(first, last).await?;
        if dates.is_empty() || query.limit == 0 {
            return Ok(vec![]);
        }

        let chunks: Vec<&[NaiveDate]> = dates.chunks(MAX_UNION_TERMS).collect();
        if chunks.len() == 1 {
            return self
                .select_chunk(query, columns, chunks[0], query.limit, query.offset)
                .await;
        }

        // Each chunk yields its own top `offset + limit`; merge and page here.
        let mut merged: Vec<R> = Vec::new();
        for chunk in chunks {
            let rows = self
                .select_chunk(query, columns, chunk, query.offset + query.limit, 0)
                .await?;
            merged.extend(rows);
        }

        merged.sort_by(|a, b| {
            let ordering = compare_keys(a.order_key(), b.order_key());
            match query.sort {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });

        Ok(merged
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn select_chunk<R>(
        &self,
        query: &EventQuery,
        columns: &str,
        dates: &[NaiveDate],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<R>, StoreError>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM (");

        for (i, date) in dates.iter().enumerate() {
            if i > 0 {
                builder.push(" UNION ALL ");
            }
            builder.push(format!(
                "SELECT {columns} FROM {} WHERE {} = ",
                partition_table(*date),
                query.scope.column()
            ));
            builder.push_bind(query.scope.id().to_string());
            builder.push(" AND timestamp >= ");
            builder.push_bind(to_micros(query.range.start));
            builder.push(" AND timestamp <= ");
            builder.push_bind(to_micros(query.range.end));

            match query.bound {
                Some(TimeBound::AtOrBefore(at)) => {
                    builder.push(" AND timestamp <= ");
                    builder.push_bind(to_micros(at));
                }
                Some(TimeBound::AtOrAfter(at)) => {
                    builder.push(" AND timestamp >= ");
                    builder.push_bind(to_micros(at));
                }
                None => {}
            }

            if let Some(exclude) = &query.exclude_id {
                builder.push(" AND id <> ");
                builder.push_bind(exclude.clone());
            }
            if let Some(is_fixed) = query.filter.is_fixed {
                builder.push(" AND is_fixed = ");
                builder.push_bind(is_fixed);
            }
            if let Some(is_hidden) = query.filter.is_hidden {
                builder.push(" AND is_hidden = ");
                builder.push_bind(is_hidden);
            }
        }

        let direction = query.sort.as_sql();
        builder.push(format!(
            ") ORDER BY timestamp {direction}, id {direction} LIMIT "
        ));
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(offset as i64);

        let rows = builder.build_query_as::<R>().fetch_all(&self.pool).await?;
        Ok(rows)
    }
}

/// Rows that can be merged in canonical `(timestamp, id)` order.
trait OrderKey {
    fn order_key(&self) -> (i64, &str);
}

impl OrderKey for EventRow {
    fn order_key(&self) -> (i64, &str) {
        (self.timestamp, &self.id)
    }
}

impl OrderKey for EventRefRow {
    fn order_key(&self) -> (i64, &str) {
        (self.timestamp, &self.id)
    }
}

fn compare_keys(a: (i64, &str), b: (i64, &str)) -> Ordering {
    a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1))
}

fn map_insert_error(err: sqlx::Error, key: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(key.to_string())
        }
        _ => StoreError::Database(err),
    }
}

fn is_missing_table(err: &StoreError) -> bool {
    match err {
        StoreError::Database(sqlx::Error::Database(db)) => db.message().contains("no such table"),
        _ => false,
    }
}

impl DocumentStore for SqliteStore {
    // ==================== Tenant Operations ====================

    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query_as::<_, TenantRow>("SELECT * FROM tenants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Tenant::try_from).transpose()
    }

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, name, hourly_limit, monthly_limit, bonus_events, bonus_expiration,
                hourly_usage, monthly_usage, last_checkpoint, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                hourly_limit = excluded.hourly_limit,
                monthly_limit = excluded.monthly_limit,
                bonus_events = excluded.bonus_events,
                bonus_expiration = excluded.bonus_expiration,
                version = version + 1
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.name)
        .bind(tenant.hourly_limit)
        .bind(tenant.monthly_limit)
        .bind(tenant.bonus_events)
        .bind(tenant.bonus_expiration.map(to_micros))
        .bind(serde_json::to_string(&tenant.hourly_usage)?)
        .bind(serde_json::to_string(&tenant.monthly_usage)?)
        .bind(tenant.last_checkpoint.map(to_micros))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_tenant<F>(
        &self,
        id: &str,
        max_attempts: u32,
        mutate: F,
    ) -> Result<UpdateOutcome<Tenant>, StoreError>
    where
        F: Fn(&mut Tenant) -> bool + Send + Sync,
    {
        let attempts = max_attempts.max(1);

        for attempt in 1..=attempts {
            let Some(current) = self.get_tenant(id).await? else {
                return Err(StoreError::NotFound(format!("tenant {id}")));
            };

            let mut next = current.clone();
            if !mutate(&mut next) {
                return Ok(UpdateOutcome::Unchanged(current));
            }

            let result = sqlx::query(
                r#"
                UPDATE tenants SET
                    hourly_usage = ?, monthly_usage = ?, last_checkpoint = ?,
                    version = version + 1
                WHERE id = ? AND version = ?
                "#,
            )
            .bind(serde_json::to_string(&next.hourly_usage)?)
            .bind(serde_json::to_string(&next.monthly_usage)?)
            .bind(next.last_checkpoint.map(to_micros))
            .bind(id)
            .bind(current.version)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                next.version = current.version + 1;
                return Ok(UpdateOutcome::Updated(next));
            }

            debug!(tenant_id = id, attempt, "tenant update conflicted");
        }

        Err(StoreError::Conflict {
            id: id.to_string(),
            attempts,
        })
    }

    // ==================== Project Operations ====================

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Project::from))
    }

    async fn upsert_project(&self, project: &Project) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, tenant_id, name) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(&project.id)
        .bind(&project.tenant_id)
        .bind(&project.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Stack Operations ====================

    async fn get_stack(&self, id: &str) -> Result<Option<Stack>, StoreError> {
        let row = sqlx::query_as::<_, StackRow>("SELECT * FROM stacks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Stack::try_from).transpose()
    }

    async fn find_stack_by_signature(
        &self,
        project_id: &str,
        signature_hash: &str,
    ) -> Result<Option<Stack>, StoreError> {
        let row = sqlx::query_as::<_, StackRow>(
            "SELECT * FROM stacks WHERE project_id = ? AND signature_hash = ?",
        )
        .bind(project_id)
        .bind(signature_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Stack::try_from).transpose()
    }

    async fn insert_stack(&self, stack: &Stack) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stacks (
                id, tenant_id, project_id, signature_hash, title,
                first_occurrence, last_occurrence, total_occurrences,
                is_fixed, date_fixed, is_hidden, is_regressed, created_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&stack.id)
        .bind(&stack.tenant_id)
        .bind(&stack.project_id)
        .bind(&stack.signature_hash)
        .bind(&stack.title)
        .bind(to_micros(stack.first_occurrence))
        .bind(to_micros(stack.last_occurrence))
        .bind(stack.total_occurrences)
        .bind(stack.is_fixed)
        .bind(stack.date_fixed.map(to_micros))
        .bind(stack.is_hidden)
        .bind(stack.is_regressed)
        .bind(to_micros(stack.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &format!("{}/{}", stack.project_id, stack.signature_hash)))?;

        Ok(())
    }

    async fn update_stack<F>(
        &self,
        id: &str,
        max_attempts: u32,
        mutate: F,
    ) -> Result<UpdateOutcome<Stack>, StoreError>
    where
        F: Fn(&mut Stack) -> bool + Send + Sync,
    {
        let attempts = max_attempts.max(1);

        for attempt in 1..=attempts {
            let Some(current) = self.get_stack(id).await? else {
                return Err(StoreError::NotFound(format!("stack {id}")));
            };

            let mut next = current.clone();
            if !mutate(&mut next) {
                return Ok(UpdateOutcome::Unchanged(current));
            }

            let result = sqlx::query(
                r#"
                UPDATE stacks SET
                    title = ?, first_occurrence = ?, last_occurrence = ?,
                    total_occurrences = ?, is_fixed = ?, date_fixed = ?,
                    is_hidden = ?, is_regressed = ?, version = version + 1
                WHERE id = ? AND version = ?
                "#,
            )
            .bind(&next.title)
            .bind(to_micros(next.first_occurrence))
            .bind(to_micros(next.last_occurrence))
            .bind(next.total_occurrences)
            .bind(next.is_fixed)
            .bind(next.date_fixed.map(to_micros))
            .bind(next.is_hidden)
            .bind(next.is_regressed)
            .bind(id)
            .bind(current.version)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                next.version = current.version + 1;
                return Ok(UpdateOutcome::Updated(next));
            }

            debug!(stack_id = id, attempt, "stack update conflicted");
        }

        Err(StoreError::Conflict {
            id: id.to_string(),
            attempts,
        })
    }

    async fn delete_stack(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM stacks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ==================== Event Operations ====================

    async fn create_partition_if_absent(&self, date: NaiveDate) -> Result<bool, StoreError> {
        if self.known_partitions.contains(&date) {
            return Ok(false);
        }

        for statement in create_partition_sql(date) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO partitions (date_key, table_name, created_at) VALUES (?, ?, ?)",
        )
        .bind(date_key(date))
        .bind(partition_table(date))
        .bind(to_micros(Utc::now()))
        .execute(&self.pool)
        .await?;

        self.known_partitions.insert(date);

        let created = result.rows_affected() == 1;
        if created {
            info!(partition = %date, "created event partition");
            if let Err(e) = self.refresh_views().await {
                warn!(partition = %date, error = %e, "failed to refresh rolling views");
            }
        }

        Ok(created)
    }

    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let date = event.partition_date();
        self.create_partition_if_absent(date).await?;

        match self.write_event(event).await {
            Err(e) if is_missing_table(&e) => {
                // Dropped by a retention sweep after we cached it as known.
                self.known_partitions.remove(&date);
                self.create_partition_if_absent(date).await?;
                self.write_event(event).await
            }
            other => other,
        }
    }

    async fn get_event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let dates = self.registered_dates().await?;

        for chunk in dates.rchunks(MAX_UNION_TERMS) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("");
            for (i, date) in chunk.iter().enumerate() {
                if i > 0 {
                    builder.push(" UNION ALL ");
                }
                builder.push(format!(
                    "SELECT {EVENT_COLUMNS} FROM {} WHERE id = ",
                    partition_table(*date)
                ));
                builder.push_bind(id.to_string());
            }
            builder.push(" LIMIT 1");

            let row = builder
                .build_query_as::<EventRow>()
                .fetch_optional(&self.pool)
                .await?;

            if let Some(row) = row {
                return Event::try_from(row).map(Some);
            }
        }

        Ok(None)
    }

    async fn query_events(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = self.select_events(query, EVENT_COLUMNS).await?;
        rows.into_iter().map(Event::try_from).collect()
    }

    async fn query_event_refs(&self, query: &EventQuery) -> Result<Vec<EventRef>, StoreError> {
        let rows: Vec<EventRefRow> = self.select_events(query, EVENT_REF_COLUMNS).await?;
        rows.into_iter().map(EventRef::try_from).collect()
    }

    async fn count_stack_events(&self, stack_id: &str) -> Result<i64, StoreError> {
        let mut total = 0;
        for date in self.registered_dates().await? {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE stack_id = ?",
                partition_table(date)
            );
            let count: i64 = sqlx::query_scalar(&sql)
                .bind(stack_id)
                .fetch_one(&self.pool)
                .await?;
            total += count;
        }

        Ok(total)
    }

    async fn set_event_flags(
        &self,
        stack_id: &str,
        is_fixed: bool,
        is_hidden: bool,
    ) -> Result<u64, StoreError> {
        let mut updated = 0;
        for date in self.registered_dates().await? {
            let sql = format!(
                "UPDATE {} SET is_fixed = ?, is_hidden = ? WHERE stack_id = ?",
                partition_table(date)
            );
            let result = sqlx::query(&sql)
                .bind(is_fixed)
                .bind(is_hidden)
                .bind(stack_id)
                .execute(&self.pool)
                .await?;
            updated += result.rows_affected();
        }

        Ok(updated)
    }

    // ==================== Partition Operations ====================

    async fn list_partitions(&self) -> Result<Vec<PartitionInfo>, StoreError> {
        let mut partitions = Vec::new();
        for date in self.registered_dates().await? {
            let table = partition_table(date);
            let events: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            partitions.push(PartitionInfo {
                date,
                table,
                events,
            });
        }

        Ok(partitions)
    }

    async fn drop_partition(&self, date: NaiveDate) -> Result<bool, StoreError> {
        // Registry row, views and table go together or not at all.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM partitions WHERE date_key = ?")
            .bind(date_key(date))
            .execute(&mut *tx)
            .await?;

        // Views must stop referencing the table before it goes away.
        self.rebuild_views(&mut tx).await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", partition_table(date)))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        self.known_partitions.remove(&date);

        Ok(result.rows_affected() > 0)
    }
}
