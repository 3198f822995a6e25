//! Replication orchestrator - runs each table through schema, extraction,
//! load/merge workers and cursor advancement.
//!
//! Tables run one after another. Within a table one extraction task feeds a
//! bounded channel and `workers` tasks each take one batch at a time through
//! staging and merge on their own pooled connection.

mod report;

pub use report::{HealthCheckResult, RunReport, TableReport, TableStatus};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, CursorAdvance};
use crate::core::{RowBatch, SourceReader, TableSpec, TargetPool};
use crate::drivers::{ClickHouseReader, PgTargetPool};
use crate::error::{Result, SyncError};
use crate::pipeline::ddl::ensure_schema;
use crate::pipeline::merge::MergeEngine;
use crate::pipeline::stage::StagingLoader;
use crate::pipeline::{with_cancel, Extractor};

/// Replication orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetPool>,
}

impl Orchestrator {
    /// Connect to both stores.
    pub async fn new(config: Config) -> Result<Self> {
        let source = ClickHouseReader::new(&config.source).await?;

        let max_conns = config.pipeline.max_pg_connections();
        let target = PgTargetPool::new(&config.target, max_conns).await?;

        Ok(Self::with_stores(config, Arc::new(source), Arc::new(target)))
    }

    /// Build an orchestrator over already-connected stores.
    pub fn with_stores(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetPool>,
    ) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ping both stores.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let result = HealthCheckResult {
            healthy: source.is_ok() && target.is_ok(),
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
        };

        info!(
            "Health check: source {} ({}ms), target {} ({}ms)",
            if result.source_connected { "ok" } else { "failed" },
            result.source_latency_ms,
            if result.target_connected { "ok" } else { "failed" },
            result.target_latency_ms
        );
        Ok(result)
    }

    /// Replicate `tables` in order, advancing each successful table's cursor
    /// in place.
    ///
    /// `only` restricts the run to the table whose source or destination name
    /// matches. Table failures are reported, never returned; the caller
    /// persists the cursors once the run is over.
    pub async fn run(
        &self,
        tables: &mut [TableSpec],
        only: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        if let Some(name) = only {
            if !tables.iter().any(|t| selected(t, name)) {
                return Err(SyncError::Config(format!(
                    "No table named '{}' in configuration",
                    name
                )));
            }
        }

        let started_at = Utc::now();
        info!(
            "Starting replication: {} tables, {} workers, batch size {}",
            tables.len(),
            self.config.pipeline.workers(),
            self.config.batch_size()
        );

        let mut reports = Vec::with_capacity(tables.len());
        for table in tables.iter_mut() {
            if only.is_some_and(|name| !selected(table, name)) {
                debug!("{}: skipped (not selected)", table.source);
                reports.push(TableReport::new(table, TableStatus::Skipped));
                continue;
            }
            if cancel.is_cancelled() {
                info!("{}: skipped (run cancelled)", table.source);
                reports.push(TableReport::new(table, TableStatus::Skipped));
                continue;
            }
            reports.push(self.run_table(table, cancel).await);
        }

        let report = RunReport::new(started_at, reports, cancel.is_cancelled());
        info!(
            "Replication finished: {} done, {} failed, {} skipped, {} rows merged in {:.1}s",
            report.tables_done,
            report.tables_failed,
            report.tables_skipped,
            report.rows_merged,
            report.duration_ms as f64 / 1000.0
        );
        Ok(report)
    }

    async fn run_table(&self, table: &mut TableSpec, cancel: &CancellationToken) -> TableReport {
        let start = Instant::now();
        let started_at = Utc::now();
        let mut report = TableReport::new(table, TableStatus::Done);

        info!("{}: starting -> {}", table.source, table.destination);
        if let Some(cursor) = table.active_cursor() {
            match cursor.lower_bound() {
                Some(bound) => info!(
                    "{}: resuming from {} > {}",
                    table.source, cursor.column, bound
                ),
                None => info!("{}: no cursor value yet, full scan", table.source),
            }
        }
        let outcome = self.replicate(table, &mut report, cancel).await;
        report.duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(max_observed) => {
                let advance = self.config.pipeline.cursor_advance;
                if let Some(to) = next_cursor(advance, table, started_at, Utc::now(), max_observed)
                {
                    table.advance_cursor(to);
                    report.cursor_after = Some(to);
                    info!("{}: cursor updated to {}", table.source, to);
                }
                if report.failed_batches > 0 {
                    warn!(
                        "{}: {} of {} batches were dropped",
                        table.source, report.failed_batches, report.batches
                    );
                }
                info!(
                    "{}: complete ({} rows extracted, {} merged) in {:.1}s ({} rows/s)",
                    table.source,
                    report.rows_extracted,
                    report.rows_merged,
                    report.duration_ms as f64 / 1000.0,
                    report.rows_per_second()
                );
                report
            }
            Err(e) => {
                error!("{}: failed - {}", table.source, e);
                report.failed(&e)
            }
        }
    }

    /// Run one table. Returns the largest observed cursor value on success.
    async fn replicate(
        &self,
        table: &TableSpec,
        report: &mut TableReport,
        cancel: &CancellationToken,
    ) -> Result<Option<DateTime<Utc>>> {
        let schema = self.config.target.schema.clone();

        {
            let mut session = with_cancel(cancel, self.target.acquire()).await?;
            let outcome = ensure_schema(table, session.as_mut(), &schema, cancel).await?;
            report.schema_warnings = outcome.warnings;
        }

        let spec = Arc::new(table.clone());
        let (tx, rx) = async_channel::bounded::<RowBatch>(self.config.pipeline.channel_capacity());

        let extractor = Extractor::new(
            self.source.clone(),
            self.config.batch_size(),
            self.config.pipeline.strategy,
        );
        let extraction: JoinHandle<Result<_>> = {
            let spec = spec.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut tx = tx;
                extractor.extract(&spec, &mut tx, &cancel).await
            })
        };

        let workers = self.config.pipeline.workers().max(1);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = BatchWorker {
                id,
                table: spec.clone(),
                target: self.target.clone(),
                loader: StagingLoader::new(schema.clone()),
                merger: MergeEngine::new(schema.clone()),
            };
            handles.push(tokio::spawn(worker.run(rx.clone(), cancel.clone())));
        }
        drop(rx);

        // Join barrier: the extraction task closes the channel when it ends,
        // and every worker drains what is left before returning.
        let extracted = match extraction.await {
            Ok(res) => res,
            Err(e) => Err(SyncError::extract(&table.source, format!("task panicked - {}", e))),
        };

        let mut worker_failure = None;
        for handle in handles {
            match handle.await {
                Ok(stats) => {
                    report.batches += stats.batches;
                    report.rows_extracted += stats.rows;
                    report.rows_merged += stats.rows_merged;
                    report.failed_batches += stats.failed;
                }
                Err(e) => {
                    error!("{}: worker panicked - {}", table.source, e);
                    worker_failure.get_or_insert_with(|| {
                        SyncError::extract(&table.source, format!("worker panicked - {}", e))
                    });
                }
            }
        }

        let summary = extracted?;
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if let Some(e) = worker_failure {
            return Err(e);
        }
        Ok(summary.max_cursor)
    }
}

fn selected(table: &TableSpec, name: &str) -> bool {
    table.source == name || table.destination == name
}

/// The new cursor value for a table that completed, per the advancement rule.
///
/// Returns `None` when the table has no active cursor, or when `MaxObserved`
/// saw no rows (the cursor then stays where it was).
fn next_cursor(
    advance: CursorAdvance,
    table: &TableSpec,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    max_observed: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let cursor = table.active_cursor()?;
    match advance {
        CursorAdvance::CompletedAt => Some(completed_at),
        CursorAdvance::StartedAt => Some(started_at),
        CursorAdvance::MaxObserved if table.cursor_column_index().is_none() => {
            warn!(
                "{}: cursor column {} is not extracted, advancing to completion time",
                table.source, cursor.column
            );
            Some(completed_at)
        }
        CursorAdvance::MaxObserved => max_observed,
    }
}

#[derive(Debug, Default)]
struct WorkerStats {
    batches: u64,
    rows: u64,
    rows_merged: u64,
    failed: u64,
}

/// One load/merge worker of a table run.
struct BatchWorker {
    id: usize,
    table: Arc<TableSpec>,
    target: Arc<dyn TargetPool>,
    loader: StagingLoader,
    merger: MergeEngine,
}

impl BatchWorker {
    async fn run(
        self,
        rx: async_channel::Receiver<RowBatch>,
        cancel: CancellationToken,
    ) -> WorkerStats {
        let mut stats = WorkerStats::default();

        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                batch = rx.recv() => match batch {
                    Ok(batch) => batch,
                    Err(_) => break,
                },
            };

            stats.batches += 1;
            stats.rows += batch.len() as u64;

            match self.process(&batch, &cancel).await {
                Ok(merged) => stats.rows_merged += merged,
                Err(SyncError::Cancelled) => break,
                Err(e) => {
                    stats.failed += 1;
                    error!("{}", e);
                }
            }
        }

        debug!(
            "{}: worker {} finished ({} batches, {} failed)",
            self.table.destination, self.id, stats.batches, stats.failed
        );
        stats
    }

    async fn process(&self, batch: &RowBatch, cancel: &CancellationToken) -> Result<u64> {
        let result = async {
            let mut session = with_cancel(cancel, self.target.acquire()).await?;
            let staging = self
                .loader
                .load(&self.table, session.as_mut(), batch, cancel)
                .await?;
            self.merger
                .merge(&self.table, session.as_mut(), &staging, cancel)
                .await
        }
        .await;

        result.map_err(|e| match e {
            SyncError::Cancelled => SyncError::Cancelled,
            e => SyncError::batch(&self.table.destination, batch.sequence, e.to_string()),
        })
    }
}
