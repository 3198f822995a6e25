//! # clickhouse-pg-sync
//!
//! Batched ClickHouse to PostgreSQL table replication.
//!
//! Each configured table is read from ClickHouse in fixed-size batches and
//! upserted into PostgreSQL:
//!
//! - **Typed extraction** with column types inferred from the result header
//! - **Incremental runs** filtered on a per-table timestamp cursor
//! - **Parallel loading** through per-batch temporary staging tables
//! - **Idempotent merges** using `INSERT ... ON CONFLICT DO UPDATE`
//!
//! ## Example
//!
//! ```rust,no_run
//! use clickhouse_pg_sync::{Config, Orchestrator, Result};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config.clone().with_auto_tuning()).await?;
//!     let report = orchestrator
//!         .run(&mut config.tables, None, &CancellationToken::new())
//!         .await?;
//!     config.save("config.yaml")?;
//!     println!("Merged {} rows", report.rows_merged);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-exports for convenient access
pub use config::{Config, CursorAdvance, PipelineConfig, SourceConfig, TargetConfig};
pub use core::{ColumnSpec, CursorSpec, IndexSpec, RowBatch, TableSpec, Value};
pub use drivers::{ClickHouseReader, PgTargetPool, SslMode};
pub use error::{Result, SyncError};
pub use orchestrator::{HealthCheckResult, Orchestrator, RunReport, TableReport, TableStatus};
pub use pipeline::ExtractStrategy;
