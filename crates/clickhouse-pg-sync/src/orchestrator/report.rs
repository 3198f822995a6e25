//! Per-table and per-run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::TableSpec;
use crate::error::{Result, SyncError};

/// Final state of one table in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Extraction finished and every worker drained; the cursor was advanced.
    Done,
    /// Schema or extraction failed, or the run was cancelled. Cursor untouched.
    Failed,
    /// Not run (filtered out, or the run was cancelled before reaching it).
    Skipped,
}

/// Outcome of one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub source: String,
    pub destination: String,
    pub status: TableStatus,
    pub rows_extracted: u64,
    pub rows_merged: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub schema_warnings: usize,
    pub duration_ms: u64,
    pub cursor_before: Option<DateTime<Utc>>,
    pub cursor_after: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TableReport {
    pub(crate) fn new(table: &TableSpec, status: TableStatus) -> Self {
        let cursor = table.active_cursor().and_then(|c| c.last_sync);
        Self {
            source: table.source.clone(),
            destination: table.destination.clone(),
            status,
            rows_extracted: 0,
            rows_merged: 0,
            batches: 0,
            failed_batches: 0,
            schema_warnings: 0,
            duration_ms: 0,
            cursor_before: cursor,
            cursor_after: cursor,
            error: None,
        }
    }

    pub(crate) fn failed(mut self, error: &SyncError) -> Self {
        self.status = TableStatus::Failed;
        self.error = Some(error.to_string());
        self
    }

    /// Average merge throughput over the table run.
    pub fn rows_per_second(&self) -> u64 {
        if self.duration_ms == 0 {
            return self.rows_merged;
        }
        self.rows_merged * 1000 / self.duration_ms
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub cancelled: bool,
    pub tables_done: usize,
    pub tables_failed: usize,
    pub tables_skipped: usize,
    pub rows_extracted: u64,
    pub rows_merged: u64,
    pub failed_batches: u64,
    pub tables: Vec<TableReport>,
}

impl RunReport {
    pub(crate) fn new(
        started_at: DateTime<Utc>,
        tables: Vec<TableReport>,
        cancelled: bool,
    ) -> Self {
        let completed_at = Utc::now();
        let count = |status| tables.iter().filter(|t| t.status == status).count();

        Self {
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
            cancelled,
            tables_done: count(TableStatus::Done),
            tables_failed: count(TableStatus::Failed),
            tables_skipped: count(TableStatus::Skipped),
            rows_extracted: tables.iter().map(|t| t.rows_extracted).sum(),
            rows_merged: tables.iter().map(|t| t.rows_merged).sum(),
            failed_batches: tables.iter().map(|t| t.failed_batches).sum(),
            tables,
        }
    }

    /// Names of tables that failed.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .map(|t| t.source.as_str())
            .collect()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connectivity of both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnSpec, CursorSpec};
    use chrono::TimeZone;

    fn table(name: &str) -> TableSpec {
        TableSpec {
            source: name.to_string(),
            destination: name.to_string(),
            indexes: vec![],
            columns: vec![ColumnSpec {
                source: "id".to_string(),
                destination: "id".to_string(),
                data_type: "bigint".to_string(),
                primary: true,
            }],
            cursor: Some(CursorSpec {
                column: "updated_at".to_string(),
                last_sync: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            }),
        }
    }

    #[test]
    fn test_run_report_totals() {
        let mut done = TableReport::new(&table("a"), TableStatus::Done);
        done.rows_extracted = 5;
        done.rows_merged = 4;
        done.failed_batches = 1;
        let failed = TableReport::new(&table("b"), TableStatus::Done)
            .failed(&SyncError::extract("b", "boom"));
        let skipped = TableReport::new(&table("c"), TableStatus::Skipped);

        let report = RunReport::new(Utc::now(), vec![done, failed, skipped], false);
        assert_eq!(report.tables_done, 1);
        assert_eq!(report.tables_failed, 1);
        assert_eq!(report.tables_skipped, 1);
        assert_eq!(report.rows_extracted, 5);
        assert_eq!(report.rows_merged, 4);
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.failed_tables(), vec!["b"]);
    }

    #[test]
    fn test_report_json_shape() {
        let report = TableReport::new(&table("a"), TableStatus::Skipped);
        assert_eq!(report.cursor_before, report.cursor_after);

        let json = RunReport::new(Utc::now(), vec![report], false)
            .to_json()
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["tables"][0]["status"], "skipped");
        assert_eq!(parsed["tables"][0]["cursor_before"], "2024-01-01T00:00:00Z");
        assert_eq!(parsed["tables_skipped"], 1);
    }

    #[test]
    fn test_rows_per_second() {
        let mut report = TableReport::new(&table("a"), TableStatus::Done);
        report.rows_merged = 3000;
        report.duration_ms = 1500;
        assert_eq!(report.rows_per_second(), 2000);
    }
}
