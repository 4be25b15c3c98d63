//! Partition naming and rolling-view SQL.
//!
//! One table per UTC day:
//! ```text
//! events_20261017   <- events whose timestamp falls on 2026-10-17 (UTC)
//! ```

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::models::EVENT_COLUMNS;
use crate::config::RollingWindow;

/// A registered partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    pub date: NaiveDate,
    pub table: String,
    pub events: i64,
}

/// Table name for the partition holding `date`.
pub fn partition_table(date: NaiveDate) -> String {
    format!("events_{}", date.format("%Y%m%d"))
}

/// Registry key for the partition holding `date`. Sorts chronologically.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// DDL for a partition table and its indexes.
pub fn create_partition_sql(date: NaiveDate) -> Vec<String> {
    let table = partition_table(date);
    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                stack_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                payload TEXT NOT NULL,
                is_fixed INTEGER NOT NULL DEFAULT 0,
                is_hidden INTEGER NOT NULL DEFAULT 0
            )
            "#
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_stack ON {table}(stack_id, timestamp, id)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_project ON {table}(project_id, timestamp, id)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_tenant ON {table}(tenant_id, timestamp, id)"),
    ]
}

/// Sanitize a window name for use in a view name.
pub fn sanitize_view_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    format!("events_{}", cleaned)
}

/// Partitions a window covers when viewed from `today`.
pub fn window_partitions(window: &RollingWindow, today: NaiveDate, registered: &[NaiveDate]) -> Vec<NaiveDate> {
    let first = window_start(window, today);
    registered
        .iter()
        .copied()
        .filter(|date| *date >= first)
        .collect()
}

fn window_start(window: &RollingWindow, today: NaiveDate) -> NaiveDate {
    let span = i64::from(window.days.max(1)) - 1;
    today - Duration::days(span)
}

/// `CREATE VIEW` statement for a rolling window.
///
/// The lower bound is evaluated by SQLite at read time, so the view keeps
/// sliding between rebuilds. Rebuilds only need to happen when the set of
/// partitions changes.
pub fn create_view_sql(window: &RollingWindow, partitions: &[NaiveDate]) -> String {
    let view = sanitize_view_name(&window.name);
    let span = i64::from(window.days.max(1)) - 1;
    let lower_bound = format!(
        "CAST(strftime('%s', 'now', 'start of day', '-{span} days') AS INTEGER) * 1000000"
    );

    if partitions.is_empty() {
        return format!(
            "CREATE VIEW IF NOT EXISTS {view} AS \
             SELECT '' AS id, '' AS tenant_id, '' AS project_id, '' AS stack_id, \
             0 AS timestamp, '' AS payload, 0 AS is_fixed, 0 AS is_hidden WHERE 0"
        );
    }

    let selects: Vec<String> = partitions
        .iter()
        .map(|date| {
            format!(
                "SELECT {EVENT_COLUMNS} FROM {} WHERE timestamp >= {lower_bound}",
                partition_table(*date)
            )
        })
        .collect();

    format!(
        "CREATE VIEW IF NOT EXISTS {view} AS {}",
        selects.join(" UNION ALL ")
    )
}
