//! Configuration validation.

use std::collections::HashSet;

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::core::TableSpec;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.url.is_empty() {
        return Err(SyncError::Config("source.url is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(SyncError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(SyncError::Config("source.user is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(SyncError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(SyncError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(SyncError::Config("target.user is required".into()));
    }
    validate_identifier(&config.target.schema)
        .map_err(|e| SyncError::Config(format!("target.schema: {}", e)))?;

    // Pipeline config validation - only check if explicitly set
    if let Some(0) = config.batch_size {
        return Err(SyncError::Config("batch_size must be at least 1".into()));
    }
    if let Some(0) = config.pipeline.workers {
        return Err(SyncError::Config(
            "pipeline.workers must be at least 1".into(),
        ));
    }
    if let Some(0) = config.pipeline.channel_capacity {
        return Err(SyncError::Config(
            "pipeline.channel_capacity must be at least 1".into(),
        ));
    }
    if let Some(0) = config.pipeline.max_pg_connections {
        return Err(SyncError::Config(
            "pipeline.max_pg_connections must be at least 1".into(),
        ));
    }

    let mut destinations = HashSet::new();
    for (i, table) in config.tables.iter().enumerate() {
        validate_table(table).map_err(|e| match e {
            SyncError::Config(msg) => SyncError::Config(format!("tables[{}]: {}", i, msg)),
            other => other,
        })?;

        if !destinations.insert(table.destination.as_str()) {
            return Err(SyncError::Config(format!(
                "tables[{}]: destination '{}' is used by more than one table",
                i, table.destination
            )));
        }
    }

    Ok(())
}

fn validate_table(table: &TableSpec) -> Result<()> {
    if table.source.is_empty() {
        return Err(SyncError::Config("source is required".into()));
    }
    if table.destination.is_empty() {
        return Err(SyncError::Config("destination is required".into()));
    }
    validate_identifier(&table.destination)?;

    if table.columns.is_empty() {
        return Err(SyncError::Config(format!(
            "table '{}' has no columns",
            table.source
        )));
    }

    let mut seen = HashSet::new();
    for column in &table.columns {
        if column.source.is_empty() {
            return Err(SyncError::Config(format!(
                "column '{}' has no source",
                column.destination
            )));
        }
        if column.data_type.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "column '{}' has no type",
                column.destination
            )));
        }
        validate_identifier(&column.destination)?;
        if !seen.insert(column.destination.as_str()) {
            return Err(SyncError::Config(format!(
                "duplicate destination column '{}'",
                column.destination
            )));
        }
    }

    for index in &table.indexes {
        validate_identifier(&index.name)?;
        if index.columns.is_empty() {
            return Err(SyncError::Config(format!(
                "index '{}' has no columns",
                index.name
            )));
        }
        if let Some(missing) = index.columns.iter().find(|c| !seen.contains(c.as_str())) {
            return Err(SyncError::Config(format!(
                "index '{}' references unknown column '{}'",
                index.name, missing
            )));
        }
    }

    Ok(())
}
