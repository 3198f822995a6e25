//! Batching extraction from the source store.
//!
//! Builds the `SELECT ... FINAL` query for a table (cursor-filtered when the
//! table has a lower bound), scans every row with the inferred targets, and
//! groups rows into fixed-size [`RowBatch`]es handed to a [`BatchSink`].
//!
//! Two strategies are supported:
//! - [`ExtractStrategy::Paginate`]: `COUNT(*)` once, then `ORDER BY <pk cols>
//!   LIMIT/OFFSET` pages until the counted rows are consumed
//! - [`ExtractStrategy::Stream`]: one long-lived query, batched as rows arrive
//!
//! Batches already delivered are never rolled back when a later query or scan
//! fails; the caller owns reconciliation.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::identifier::quote_literal;
use crate::core::schema::CURSOR_TIMESTAMP_FORMAT;
use crate::core::{BatchSink, Row, RowBatch, RowStream, SourceReader, TableSpec};
use crate::error::{Result, SyncError};

use super::infer::{infer_scan_targets, scan_row, ScanTarget};
use super::with_cancel;

/// How rows are read from the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractStrategy {
    /// Count once, then read `LIMIT/OFFSET` pages ordered by the primary key.
    #[default]
    Paginate,
    /// One query, batched while iterating the row cursor.
    Stream,
}

/// Outcome of one table extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Rows delivered to the sink.
    pub rows: u64,
    /// Batches delivered to the sink.
    pub batches: u64,
    /// Largest cursor-column value observed, when the cursor column is extracted.
    pub max_cursor: Option<DateTime<Utc>>,
}

/// Base extraction query:
/// `SELECT <cols> FROM <source> FINAL [WHERE <cursor> > toDateTime('<ts>', 'UTC')]`.
///
/// The bound is a UTC instant; pinning the zone keeps ClickHouse from reading
/// it in the server or column time zone.
pub fn build_query(table: &TableSpec) -> String {
    let mut sql = format!(
        "SELECT {} FROM {} FINAL",
        table.source_columns().join(", "),
        table.source
    );

    if let Some(cursor) = table.active_cursor() {
        if let Some(bound) = cursor.lower_bound() {
            let rendered = bound.format(CURSOR_TIMESTAMP_FORMAT).to_string();
            sql.push_str(&format!(
                " WHERE {} > toDateTime({}, 'UTC')",
                cursor.column,
                quote_literal(&rendered)
            ));
        }
    }

    sql
}

/// Row count query wrapping the base query.
pub fn count_query(base: &str) -> String {
    format!("SELECT COUNT(*) FROM ({}) AS subquery", base)
}

/// One page of the base query.
pub fn page_query(base: &str, order_by: &str, limit: usize, offset: u64) -> String {
    format!(
        "{} ORDER BY {} LIMIT {} OFFSET {}",
        base, order_by, limit, offset
    )
}

/// Reads one table from the source and emits batches.
pub struct Extractor {
    source: Arc<dyn SourceReader>,
    batch_size: usize,
    strategy: ExtractStrategy,
}

impl Extractor {
    pub fn new(source: Arc<dyn SourceReader>, batch_size: usize, strategy: ExtractStrategy) -> Self {
        Self {
            source,
            batch_size: batch_size.max(1),
            strategy,
        }
    }

    /// Extract `table`, delivering every row in exactly one batch.
    pub async fn extract(
        &self,
        table: &TableSpec,
        sink: &mut dyn BatchSink,
        cancel: &CancellationToken,
    ) -> Result<ExtractSummary> {
        let base = build_query(table);
        let start = Instant::now();

        let order_by = table.pagination_order();
        let strategy = match (self.strategy, order_by.as_deref()) {
            (ExtractStrategy::Paginate, None) => {
                warn!(
                    "{}: no primary key to paginate on, falling back to streaming",
                    table.source
                );
                ExtractStrategy::Stream
            }
            (s, _) => s,
        };

        info!(
            "{}: extracting (strategy: {:?}, batch size: {})",
            table.source, strategy, self.batch_size
        );
        debug!("{}: {}", table.source, base);

        let mut batcher = Batcher::new(sink, self.batch_size, table.cursor_column_index());

        match (strategy, order_by.as_deref()) {
            (ExtractStrategy::Paginate, Some(order_by)) => {
                self.paginate(table, &base, order_by, &mut batcher, cancel)
                    .await?
            }
            _ => self.stream(table, &base, &mut batcher, cancel).await?,
        }

        batcher.finish(cancel).await?;
        let summary = batcher.summary();

        info!(
            "{}: extracted {} rows in {} batches in {:?}",
            table.source,
            summary.rows,
            summary.batches,
            start.elapsed()
        );

        Ok(summary)
    }

    async fn stream(
        &self,
        table: &TableSpec,
        base: &str,
        batcher: &mut Batcher<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut stream = with_cancel(cancel, self.source.query(base)).await?;
        let mut targets = None;
        drain(table, stream.as_mut(), &mut targets, batcher, cancel).await?;
        Ok(())
    }

    async fn paginate(
        &self,
        table: &TableSpec,
        base: &str,
        order_by: &str,
        batcher: &mut Batcher<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = with_cancel(cancel, self.source.count(&count_query(base))).await?;
        info!("{}: {} rows to extract", table.source, total);

        let mut targets = None;
        let mut offset = 0u64;

        while offset < total {
            let sql = page_query(base, order_by, self.batch_size, offset);
            let mut stream = with_cancel(cancel, self.source.query(&sql)).await?;
            let read = drain(table, stream.as_mut(), &mut targets, batcher, cancel).await?;

            if read == 0 {
                warn!(
                    "{}: page at offset {} was empty before {} counted rows were read",
                    table.source, offset, total
                );
                break;
            }
            offset += read;
        }

        Ok(())
    }
}

/// Scan every row of `stream` into the batcher, returning the row count.
///
/// Scan targets are inferred from the first row seen and reused afterwards.
async fn drain(
    table: &TableSpec,
    stream: &mut dyn RowStream,
    targets: &mut Option<Vec<ScanTarget>>,
    batcher: &mut Batcher<'_>,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut read = 0u64;

    while let Some(raw) = with_cancel(cancel, stream.next_row()).await? {
        if targets.is_none() {
            *targets = Some(infer_for(table, stream)?);
        }
        let Some(targets) = targets.as_deref() else {
            break;
        };

        let row = scan_row(targets, &raw)?;
        batcher.push(row, cancel).await?;
        read += 1;
    }

    Ok(read)
}

fn infer_for(table: &TableSpec, stream: &dyn RowStream) -> Result<Vec<ScanTarget>> {
    let columns = stream.columns();
    if columns.len() != table.columns.len() {
        return Err(SyncError::extract(
            &table.source,
            format!(
                "result set has {} columns, {} are mapped",
                columns.len(),
                table.columns.len()
            ),
        ));
    }
    Ok(infer_scan_targets(columns))
}

/// Groups scanned rows into fixed-size batches.
struct Batcher<'s> {
    sink: &'s mut dyn BatchSink,
    batch_size: usize,
    current: Vec<Row>,
    sequence: u64,
    rows: u64,
    cursor_index: Option<usize>,
    max_cursor: Option<DateTime<Utc>>,
}

impl<'s> Batcher<'s> {
    fn new(sink: &'s mut dyn BatchSink, batch_size: usize, cursor_index: Option<usize>) -> Self {
        Self {
            sink,
            batch_size,
            current: Vec::with_capacity(batch_size),
            sequence: 0,
            rows: 0,
            cursor_index,
            max_cursor: None,
        }
    }

    async fn push(&mut self, row: Row, cancel: &CancellationToken) -> Result<()> {
        if let Some(ts) = self
            .cursor_index
            .and_then(|idx| row.get(idx))
            .and_then(|v| v.as_timestamp())
        {
            if self.max_cursor.map_or(true, |max| ts > max) {
                self.max_cursor = Some(ts);
            }
        }

        self.current.push(row);
        self.rows += 1;

        if self.current.len() >= self.batch_size {
            self.flush(cancel).await?;
        }
        Ok(())
    }

    async fn flush(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.current.is_empty() {
            return Ok(());
        }

        let rows = std::mem::replace(&mut self.current, Vec::with_capacity(self.batch_size));
        let batch = RowBatch::new(self.sequence, rows);
        debug!("emitting batch {} ({} rows)", batch.sequence, batch.len());

        with_cancel(cancel, self.sink.send(batch)).await?;
        self.sequence += 1;
        Ok(())
    }

    async fn finish(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.flush(cancel).await
    }

    fn summary(&self) -> ExtractSummary {
        ExtractSummary {
            rows: self.rows,
            batches: self.sequence,
            max_cursor: self.max_cursor,
        }
    }
}
