//! Store seams used by the replication pipeline.
//!
//! - [`SourceReader`] / [`RowStream`]: run queries against the column store and
//!   stream raw rows with their column metadata
//! - [`TargetPool`] / [`TargetSession`]: pooled destination connections that can
//!   execute statements and accept COPY payloads
//! - [`BatchSink`]: where the extractor delivers completed batches
//!
//! The pipeline modules build all SQL themselves and only talk to the stores
//! through these traits, so drivers stay thin and the pipeline can be driven
//! by in-memory doubles in tests.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, SyncError};

use super::value::RowBatch;

/// Column metadata reported by the source for a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name as reported by the server.
    pub name: String,
    /// Store-reported type, e.g. `Nullable(Int32)` or `Array(String)`.
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Read rows from the source (column) store.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Run a query returning a single unsigned count.
    async fn count(&self, sql: &str) -> Result<u64>;

    /// Open a row cursor for a query.
    async fn query(&self, sql: &str) -> Result<Box<dyn RowStream>>;

    /// Check connectivity.
    async fn ping(&self) -> Result<()>;
}

/// A server-side cursor over one result set.
///
/// Cells are delivered in their raw JSON form; the row type inferer turns
/// them into typed [`crate::core::Value`]s.
#[async_trait]
pub trait RowStream: Send {
    /// Column metadata for the result set (empty when the result has no header).
    fn columns(&self) -> &[ColumnMeta];

    /// Fetch the next raw row, or `None` at end of stream.
    async fn next_row(&mut self) -> Result<Option<Vec<serde_json::Value>>>;
}

/// Pool of destination (relational store) connections.
#[async_trait]
pub trait TargetPool: Send + Sync {
    /// Acquire a connection. Session-scoped state (temporary tables) lives on
    /// the returned session and is invisible to every other session.
    async fn acquire(&self) -> Result<Box<dyn TargetSession>>;

    /// Check connectivity.
    async fn ping(&self) -> Result<()>;
}

/// One pooled destination connection.
#[async_trait]
pub trait TargetSession: Send {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run a `COPY ... FROM STDIN` statement with the given payload,
    /// returning the number of copied rows.
    async fn copy_in(&mut self, sql: &str, data: Bytes) -> Result<u64>;
}

/// Consumer of completed batches.
#[async_trait]
pub trait BatchSink: Send {
    async fn send(&mut self, batch: RowBatch) -> Result<()>;
}

#[async_trait]
impl BatchSink for async_channel::Sender<RowBatch> {
    async fn send(&mut self, batch: RowBatch) -> Result<()> {
        let sequence = batch.sequence;
        async_channel::Sender::send(self, batch)
            .await
            .map_err(|_| SyncError::Channel(format!("no worker accepted batch {}", sequence)))
    }
}

#[async_trait]
impl BatchSink for Vec<RowBatch> {
    async fn send(&mut self, batch: RowBatch) -> Result<()> {
        self.push(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (tx, rx) = async_channel::bounded::<RowBatch>(2);
        let mut sink = tx;
        BatchSink::send(&mut sink, RowBatch::new(0, vec![vec![Value::Int(1)]]))
            .await
            .unwrap();
        BatchSink::send(&mut sink, RowBatch::new(1, vec![vec![Value::Int(2)]]))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn test_channel_sink_errors_when_closed() {
        let (tx, rx) = async_channel::bounded::<RowBatch>(1);
        drop(rx);
        let mut sink = tx;
        let err = BatchSink::send(&mut sink, RowBatch::new(7, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Channel(_)));
    }
}
