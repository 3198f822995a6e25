//! In-memory store doubles for pipeline and orchestrator tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value as Json;

use crate::core::{ColumnMeta, RowStream, SourceReader, TargetPool, TargetSession};
use crate::error::{Result, SyncError};

/// Source double serving a fixed result set.
///
/// `LIMIT n OFFSET o` suffixes are honoured so pagination can be exercised;
/// every statement is recorded.
pub struct MockSource {
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Json>>,
    count_override: Option<u64>,
    fail_on: Vec<String>,
    hang_on: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Json>>) -> Self {
        Self {
            columns,
            rows,
            count_override: None,
            fail_on: Vec::new(),
            hang_on: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Report `count` from COUNT queries regardless of the rows held.
    pub fn with_count_override(mut self, count: u64) -> Self {
        self.count_override = Some(count);
        self
    }

    /// Fail statements containing `pattern`.
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.fail_on.push(pattern.to_string());
        self
    }

    /// Never answer statements containing `pattern`.
    pub fn hang_on(mut self, pattern: &str) -> Self {
        self.hang_on.push(pattern.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    async fn record(&self, sql: &str) -> Result<()> {
        self.queries.lock().unwrap().push(sql.to_string());
        if self.hang_on.iter().any(|p| sql.contains(p.as_str())) {
            futures::future::pending::<()>().await;
        }
        if self.fail_on.iter().any(|p| sql.contains(p.as_str())) {
            return Err(SyncError::extract("mock", format!("injected failure: {}", sql)));
        }
        Ok(())
    }
}

fn parse_page(sql: &str) -> Option<(usize, usize)> {
    let (_, tail) = sql.rsplit_once(" LIMIT ")?;
    let (limit, offset) = tail.split_once(" OFFSET ")?;
    Some((limit.trim().parse().ok()?, offset.trim().parse().ok()?))
}

#[async_trait]
impl SourceReader for MockSource {
    async fn count(&self, sql: &str) -> Result<u64> {
        self.record(sql).await?;
        Ok(self.count_override.unwrap_or(self.rows.len() as u64))
    }

    async fn query(&self, sql: &str) -> Result<Box<dyn RowStream>> {
        self.record(sql).await?;
        let rows: VecDeque<Vec<Json>> = match parse_page(sql) {
            Some((limit, offset)) => self.rows.iter().skip(offset).take(limit).cloned().collect(),
            None => self.rows.iter().cloned().collect(),
        };
        Ok(Box::new(MockStream {
            columns: self.columns.clone(),
            rows,
        }))
    }

    async fn ping(&self) -> Result<()> {
        self.record("SELECT 1").await
    }
}

struct MockStream {
    columns: Vec<ColumnMeta>,
    rows: VecDeque<Vec<Json>>,
}

#[async_trait]
impl RowStream for MockStream {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<Json>>> {
        Ok(self.rows.pop_front())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    statements: Vec<String>,
    payloads: Vec<String>,
    sessions: usize,
}

/// Destination double recording every statement and COPY payload.
#[derive(Clone, Default)]
pub struct RecordingTarget {
    recorded: Arc<Mutex<Recorded>>,
    fail_on: Arc<Vec<String>>,
    fail_copy_containing: Arc<Vec<String>>,
    fail_acquire: bool,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail statements whose SQL contains `pattern`.
    pub fn fail_on(mut self, pattern: &str) -> Self {
        Arc::make_mut(&mut self.fail_on).push(pattern.to_string());
        self
    }

    /// Fail COPY statements whose payload contains `pattern`.
    pub fn fail_copy_containing(mut self, pattern: &str) -> Self {
        Arc::make_mut(&mut self.fail_copy_containing).push(pattern.to_string());
        self
    }

    /// Refuse to hand out sessions.
    pub fn fail_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.recorded.lock().unwrap().statements.clone()
    }

    pub fn copied_payloads(&self) -> Vec<String> {
        self.recorded.lock().unwrap().payloads.clone()
    }

    pub fn sessions(&self) -> usize {
        self.recorded.lock().unwrap().sessions
    }

    fn should_fail(&self, sql: &str) -> bool {
        self.fail_on.iter().any(|p| sql.contains(p.as_str()))
    }
}

#[async_trait]
impl TargetPool for RecordingTarget {
    async fn acquire(&self) -> Result<Box<dyn TargetSession>> {
        if self.fail_acquire {
            return Err(SyncError::pool("injected failure", "acquiring session"));
        }
        self.recorded.lock().unwrap().sessions += 1;
        Ok(Box::new(RecordingSession {
            target: self.clone(),
            last_copied: 0,
        }))
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_acquire {
            return Err(SyncError::pool("injected failure", "ping"));
        }
        Ok(())
    }
}

struct RecordingSession {
    target: RecordingTarget,
    last_copied: u64,
}

#[async_trait]
impl TargetSession for RecordingSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.target
            .recorded
            .lock()
            .unwrap()
            .statements
            .push(sql.to_string());

        if self.target.should_fail(sql) {
            return Err(SyncError::pool("injected failure", sql));
        }
        if sql.starts_with("INSERT INTO") {
            return Ok(self.last_copied);
        }
        Ok(0)
    }

    async fn copy_in(&mut self, sql: &str, data: Bytes) -> Result<u64> {
        let payload = String::from_utf8_lossy(&data).to_string();
        {
            let mut recorded = self.target.recorded.lock().unwrap();
            recorded.statements.push(sql.to_string());
            recorded.payloads.push(payload.clone());
        }

        let bad_payload = self
            .target
            .fail_copy_containing
            .iter()
            .any(|p| payload.contains(p.as_str()));
        if self.target.should_fail(sql) || bad_payload {
            return Err(SyncError::pool("injected failure", sql));
        }

        self.last_copied = payload.lines().count() as u64;
        Ok(self.last_copied)
    }
}
