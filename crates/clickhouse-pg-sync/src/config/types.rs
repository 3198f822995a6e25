//! Configuration type definitions with auto-tuning based on system resources.

use std::fmt;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

use crate::core::TableSpec;
use crate::drivers::common::SslMode;
use crate::pipeline::ExtractStrategy;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        Self {
            total_memory_gb: sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0),
            cpu_cores: sys.cpus().len(),
        }
    }

    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source store (ClickHouse).
    pub source: SourceConfig,

    /// Destination store (PostgreSQL).
    pub target: TargetConfig,

    /// Rows per batch. Auto-tuned based on RAM if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Worker pool and extraction behavior.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Replicated tables, in run order.
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.with_resources(&resources)
    }

    /// Auto-tune against explicit resources.
    pub fn with_resources(mut self, resources: &SystemResources) -> Self {
        // Batch size: 10K rows per 4GB of RAM, within 10K..=100K.
        if self.batch_size.is_none() {
            let batch = ((resources.total_memory_gb / 4.0) as usize * 10_000).clamp(10_000, 100_000);
            self.batch_size = Some(batch);
        }
        self.pipeline = self.pipeline.with_auto_tuning(resources);

        info!(
            "Auto-tuned config: batch_size={}, workers={}, channel_capacity={}, pg_conns={}",
            self.batch_size(),
            self.pipeline.workers(),
            self.pipeline.channel_capacity(),
            self.pipeline.max_pg_connections(),
        );
        self
    }

    /// Effective batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(10_000)
    }
}

/// Source store (ClickHouse HTTP interface) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// HTTP endpoint, e.g. `http://localhost:8123`.
    pub url: String,

    /// Username (default: "default").
    #[serde(default = "default_clickhouse_user")]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database (default: "default").
    #[serde(default = "default_clickhouse_database")]
    pub database: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

/// Destination store (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Destination schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: disable).
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// How a table's cursor moves after a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorAdvance {
    /// Wall-clock time when the table run completed.
    #[default]
    CompletedAt,
    /// Wall-clock time when the table run started.
    StartedAt,
    /// Largest cursor-column value actually extracted.
    MaxObserved,
}

/// Worker pool and extraction behavior.
/// Performance fields use Option<T> to distinguish "not set" (auto-tuned)
/// from "explicitly set".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent load/merge workers. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Bounded batch channel capacity (default: workers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,

    /// Extraction strategy (default: paginate).
    #[serde(default)]
    pub strategy: ExtractStrategy,

    /// Cursor advancement rule (default: completed_at).
    #[serde(default)]
    pub cursor_advance: CursorAdvance,

    /// Maximum PostgreSQL connections. Auto-tuned based on workers if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pg_connections: Option<usize>,
}

impl PipelineConfig {
    /// Fill unset values from system resources.
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Workers: cores - 2, within 2..=16
        if self.workers.is_none() {
            self.workers = Some(resources.cpu_cores.saturating_sub(2).clamp(2, 16));
        }
        let workers = self.workers();

        // One pooled connection per worker plus headroom for DDL.
        if self.max_pg_connections.is_none() {
            self.max_pg_connections = Some(workers + 2);
        }
        self
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(4)
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or_else(|| self.workers())
    }

    pub fn max_pg_connections(&self) -> usize {
        self.max_pg_connections.unwrap_or_else(|| self.workers() + 2)
    }
}

// Default value functions for serde
fn default_clickhouse_user() -> String {
    "default".to_string()
}

fn default_clickhouse_database() -> String {
    "default".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}
