//! Destination "ensure schema".
//!
//! `CREATE TABLE IF NOT EXISTS` must succeed. The primary key constraint and
//! secondary indexes are best-effort: they are commonly already present on
//! re-runs, so failures are logged as warnings.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::identifier::{index_name, qualify_pg, quote_pg, quote_pg_list};
use crate::core::{IndexSpec, TableSpec, TargetSession};
use crate::error::{Result, SyncError};

use super::with_cancel;

/// Outcome of [`ensure_schema`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaOutcome {
    /// Advisory statements (primary key, indexes) that failed.
    pub warnings: usize,
}

pub fn create_table_sql(table: &TableSpec, schema: &str) -> Result<String> {
    let columns = table
        .columns
        .iter()
        .map(|c| Ok(format!("{} {}", quote_pg(&c.destination)?, c.data_type)))
        .collect::<Result<Vec<String>>>()?;

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualify_pg(schema, &table.destination)?,
        columns.join(", ")
    ))
}

/// `ALTER TABLE ... ADD PRIMARY KEY`, or `None` when no key is declared.
pub fn add_primary_key_sql(table: &TableSpec, schema: &str) -> Result<Option<String>> {
    let pk = table.primary_key();
    if pk.is_empty() {
        return Ok(None);
    }

    Ok(Some(format!(
        "ALTER TABLE {} ADD PRIMARY KEY ({})",
        qualify_pg(schema, &table.destination)?,
        quote_pg_list(&pk)?
    )))
}

pub fn create_index_sql(table: &TableSpec, index: &IndexSpec, schema: &str) -> Result<String> {
    Ok(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_pg(&index_name(&table.destination, &index.name))?,
        qualify_pg(schema, &table.destination)?,
        quote_pg_list(&index.columns)?
    ))
}

/// Ensure the destination table, its primary key, and its indexes exist.
pub async fn ensure_schema(
    table: &TableSpec,
    session: &mut dyn TargetSession,
    schema: &str,
    cancel: &CancellationToken,
) -> Result<SchemaOutcome> {
    let mut outcome = SchemaOutcome::default();

    let create = create_table_sql(table, schema)?;
    with_cancel(cancel, session.execute(&create)).await?;

    if let Some(sql) = add_primary_key_sql(table, schema)? {
        match with_cancel(cancel, session.execute(&sql)).await {
            Ok(_) => {}
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                warn!("{}: could not add primary key: {}", table.destination, e);
                outcome.warnings += 1;
            }
        }
    }

    for index in &table.indexes {
        let sql = create_index_sql(table, index, schema)?;
        match with_cancel(cancel, session.execute(&sql)).await {
            Ok(_) => {}
            Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
            Err(e) => {
                warn!(
                    "{}: could not create index {}: {}",
                    table.destination, index.name, e
                );
                outcome.warnings += 1;
            }
        }
    }

    info!(
        "{}: schema ensured ({} advisory warnings)",
        table.destination, outcome.warnings
    );
    Ok(outcome)
}
