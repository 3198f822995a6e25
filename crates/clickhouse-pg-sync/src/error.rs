//! Error types for the replication library.

use thiserror::Error;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for source (ClickHouse) errors.
pub const EXIT_SOURCE_ERROR: u8 = 2;
/// Exit code for target (PostgreSQL) errors.
pub const EXIT_TARGET_ERROR: u8 = 3;
/// Exit code for extraction or batch failures.
pub const EXIT_TRANSFER_ERROR: u8 = 4;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for a cancelled run (128 + SIGINT).
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for replication operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] clickhouse::error::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A raw cell did not match the prototype inferred for its column
    #[error("Cannot scan column {column}: {message}")]
    Scan { column: String, message: String },

    /// Extraction failed for a table
    #[error("Extraction failed for table {table}: {message}")]
    Extract { table: String, message: String },

    /// A single batch failed to stage or merge
    #[error("Batch {batch} of table {table} failed: {message}")]
    Batch {
        table: String,
        batch: u64,
        message: String,
    },

    /// The batch channel closed while extraction was still sending
    #[error("Batch channel closed: {0}")]
    Channel(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Replication cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Scan error
    pub fn scan(column: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Scan {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an Extract error
    pub fn extract(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Extract {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Batch error
    pub fn batch(table: impl Into<String>, batch: u64, message: impl Into<String>) -> Self {
        SyncError::Batch {
            table: table.into(),
            batch,
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) | SyncError::Json(_) => EXIT_CONFIG_ERROR,
            SyncError::Source(_) | SyncError::Scan { .. } => EXIT_SOURCE_ERROR,
            SyncError::Target(_) | SyncError::Pool { .. } => EXIT_TARGET_ERROR,
            SyncError::Extract { .. } | SyncError::Batch { .. } | SyncError::Channel(_) => {
                EXIT_TRANSFER_ERROR
            }
            SyncError::Io(_) => EXIT_IO_ERROR,
            SyncError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(SyncError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            SyncError::pool("timeout", "acquiring").exit_code(),
            EXIT_TARGET_ERROR
        );
        assert_eq!(
            SyncError::extract("events", "boom").exit_code(),
            EXIT_TRANSFER_ERROR
        );
        assert_eq!(SyncError::Cancelled.exit_code(), EXIT_CANCELLED);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(SyncError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.yaml");
        let err = SyncError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: config.yaml"));
    }

    #[test]
    fn test_batch_error_message() {
        let err = SyncError::batch("events", 3, "COPY failed");
        assert_eq!(err.to_string(), "Batch 3 of table events failed: COPY failed");
    }
}
