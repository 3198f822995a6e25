//! Table replication specs: columns, indexes, and incremental cursors.
//!
//! These types are deserialized straight from the `tables:` section of the
//! YAML configuration and flow unchanged through extraction, staging and merge.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp rendering used in cursor filters (`YYYY-MM-DD hh:mm:ss`).
pub const CURSOR_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One replicated table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source (ClickHouse) table name, used verbatim in the FROM clause.
    pub source: String,

    /// Destination (PostgreSQL) table name.
    pub destination: String,

    /// Secondary indexes to create on the destination.
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,

    /// Ordered column mapping. The order is the row order of every batch.
    pub columns: Vec<ColumnSpec>,

    /// Incremental extraction cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorSpec>,
}

/// A column mapping between source and destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Source column name or expression.
    pub source: String,

    /// Destination column name.
    pub destination: String,

    /// Destination type declarator, e.g. `bigint` or `text[]`.
    #[serde(rename = "type")]
    pub data_type: String,

    /// Part of the primary key.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary: bool,
}

/// A secondary index on destination columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
}

/// Incremental extraction state for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSpec {
    /// Monotonic source column used for `WHERE column > last_sync`.
    pub column: String,

    /// Last successful synchronization time. Unset means full scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl CursorSpec {
    /// The effective lower bound for extraction, if any.
    ///
    /// Unset values and anything at or before `0001-01-01T00:00:00Z` (the zero
    /// timestamp older config files carry) mean "full scan".
    pub fn lower_bound(&self) -> Option<DateTime<Utc>> {
        let zero = Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).single()?;
        self.last_sync.filter(|ts| *ts > zero)
    }
}

impl TableSpec {
    /// Source column names in declared order.
    pub fn source_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.source.clone()).collect()
    }

    /// Destination column names in declared order.
    pub fn destination_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.destination.clone()).collect()
    }

    /// Destination names of the primary key columns, in declared order.
    pub fn primary_key(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.destination.clone())
            .collect()
    }

    /// Source names of the primary key columns, in declared order.
    pub fn primary_source_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary)
            .map(|c| c.source.as_str())
            .collect()
    }

    /// Pagination ordering over the whole primary key, `None` without one.
    pub fn pagination_order(&self) -> Option<String> {
        let keys = self.primary_source_columns();
        if keys.is_empty() {
            None
        } else {
            Some(keys.join(", "))
        }
    }

    /// The cursor, when one is configured with a non-empty column.
    pub fn active_cursor(&self) -> Option<&CursorSpec> {
        self.cursor.as_ref().filter(|c| !c.column.is_empty())
    }

    /// Position of the cursor column among the extracted columns.
    pub fn cursor_column_index(&self) -> Option<usize> {
        let cursor = self.active_cursor()?;
        self.columns.iter().position(|c| c.source == cursor.column)
    }

    /// Update the in-memory cursor after a successful table run.
    pub fn advance_cursor(&mut self, to: DateTime<Utc>) {
        if let Some(cursor) = self.cursor.as_mut() {
            if !cursor.column.is_empty() {
                cursor.last_sync = Some(to);
            }
        }
    }
}
