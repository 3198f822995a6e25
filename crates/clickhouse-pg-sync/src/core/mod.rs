//! Core types shared by the drivers and the replication pipeline.
//!
//! - [`schema`]: table, column, index and cursor specs
//! - [`value`]: dynamically-typed row values and batches
//! - [`identifier`]: PostgreSQL identifier validation and quoting
//! - [`traits`]: source/target store seams and the batch sink

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnSpec, CursorSpec, IndexSpec, TableSpec};
pub use traits::{BatchSink, ColumnMeta, RowStream, SourceReader, TargetPool, TargetSession};
pub use value::{Row, RowBatch, Value};
